//! Two-phase def-use map over statement indices.
//!
//! The refinement engine learns how many uses each definition has while it scans
//! the body for other reasons, and only materialises the use lists once it knows
//! they are needed. [`TwoPhaseDefUseMap`] supports exactly that: a counting phase,
//! a single allocation sized from the counts, then a filling phase.
//!
//! # Usage
//!
//! ```rust
//! use ssaopt::analysis::TwoPhaseDefUseMap;
//!
//! # fn main() -> ssaopt::Result<()> {
//! let mut map = TwoPhaseDefUseMap::new(3);
//! // %2 uses %0 twice
//! map.count(0);
//! map.count(0);
//! map.complete();
//! map.add_use(0, 2)?;
//! map.add_use(0, 2)?;
//! assert_eq!(map.uses(0), &[2, 2]);
//! assert!(map.uses(1).is_empty());
//! # Ok(())
//! # }
//! ```

use crate::Result;

/// Def-use map built by counting uses first and recording them second.
#[derive(Debug, Clone)]
pub struct TwoPhaseDefUseMap {
    /// Use counts before [`complete`](Self::complete), start offsets afterwards
    offsets: Vec<usize>,
    /// Number of uses recorded per definition during the filling phase
    filled: Vec<usize>,
    data: Vec<usize>,
    complete: bool,
}

impl TwoPhaseDefUseMap {
    /// Creates a map for definitions `0..size`.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self {
            offsets: vec![0; size + 1],
            filled: vec![0; size],
            data: Vec::new(),
            complete: false,
        }
    }

    /// Returns `true` once the counting phase has ended.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Counts one use of `def`. Ignored after [`complete`](Self::complete) and for
    /// out of range definitions.
    pub fn count(&mut self, def: usize) {
        if !self.complete && def < self.filled.len() {
            self.offsets[def] += 1;
        }
    }

    /// Ends the counting phase and allocates storage for every counted use.
    pub fn complete(&mut self) {
        if self.complete {
            return;
        }
        let mut total = 0;
        for entry in &mut self.offsets {
            let count = *entry;
            *entry = total;
            total += count;
        }
        self.data = vec![0; total];
        self.complete = true;
    }

    /// Records that statement `user` uses `def`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidIr`] if the map is still counting or `def`
    /// receives more uses than were counted.
    pub fn add_use(&mut self, def: usize, user: usize) -> Result<()> {
        if !self.complete {
            return Err(invalid_ir!("def-use map filled before counting completed"));
        }
        let Some(filled) = self.filled.get_mut(def) else {
            return Err(invalid_ir!("use of out of range definition %{}", def));
        };
        let start = self.offsets[def];
        let capacity = self.offsets[def + 1] - start;
        if *filled >= capacity {
            return Err(invalid_ir!(
                "%{} has more than the {} counted uses",
                def,
                capacity
            ));
        }
        self.data[start + *filled] = user;
        *filled += 1;
        Ok(())
    }

    /// Returns the recorded uses of `def`; empty while still counting.
    #[must_use]
    pub fn uses(&self, def: usize) -> &[usize] {
        if !self.complete || def >= self.filled.len() {
            return &[];
        }
        let start = self.offsets[def];
        &self.data[start..start + self.filled[def]]
    }
}

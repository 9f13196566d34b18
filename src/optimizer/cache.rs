//! Shared cache of compiled bodies.
//!
//! Every body that leaves the pipeline is published here under its [`CalleeKey`], so
//! that callers optimized later can consult its inlining cost, effects and parameter
//! escape summary. The cache is safe to read while other workers insert: lookups go
//! through sharded maps and never wait on a global lock.

use std::sync::Arc;

use dashmap::DashMap;

use crate::{
    analysis::{ArgEscapeSummary, EscapeCache},
    cost::{is_inlineable, InlineCost},
    effects::Effects,
    ir::{CalleeKey, IrCode, IrType},
};

/// What the cache knows about one compiled body.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCode {
    /// Inlining cost of the optimized body
    pub cost: InlineCost,
    /// Refined effects
    pub effects: Effects,
    /// Inferred return type
    pub rettype: IrType,
    /// Parameter escape summary, if escape analysis ran on the body
    pub arg_escapes: Option<ArgEscapeSummary>,
    /// The optimized body, kept only when it is inlineable
    pub body: Option<Arc<IrCode>>,
}

impl CachedCode {
    /// Returns `true` if callers may inline this body.
    #[must_use]
    pub fn is_inlineable(&self) -> bool {
        is_inlineable(self.cost)
    }
}

/// Concurrent map from callee keys to compiled bodies.
#[derive(Debug, Default)]
pub struct CodeCache {
    entries: DashMap<CalleeKey, Arc<CachedCode>>,
}

impl CodeCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `key`, if the callee has been compiled.
    #[must_use]
    pub fn get(&self, key: &CalleeKey) -> Option<Arc<CachedCode>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Publishes `code` under `key`, replacing an older entry.
    pub fn insert(&self, key: CalleeKey, code: CachedCode) {
        self.entries.insert(key, Arc::new(code));
    }

    /// Returns the cached inlining cost of `key`.
    #[must_use]
    pub fn cost(&self, key: &CalleeKey) -> Option<InlineCost> {
        self.entries.get(key).map(|entry| entry.cost)
    }

    /// Returns `true` if `key` has been compiled.
    #[must_use]
    pub fn contains(&self, key: &CalleeKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of cached bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl EscapeCache for CodeCache {
    fn arg_escapes(&self, key: &CalleeKey) -> Option<ArgEscapeSummary> {
        self.entries
            .get(key)
            .and_then(|entry| entry.arg_escapes.clone())
    }
}

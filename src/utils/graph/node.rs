//! Node identifier for directed graphs.
//!
//! This module provides the [`NodeId`] type, a strongly-typed identifier for nodes
//! within a directed graph. In the optimizer every node is a basic block, so a
//! `NodeId` is simply a block index wrapped so that block numbers cannot be mixed up
//! with statement numbers.

use std::fmt;

/// A strongly-typed identifier for nodes within a directed graph.
///
/// `NodeId` wraps a `usize` index. Node IDs are dense and start from 0, so they
/// can index per-node vectors directly.
///
/// # Examples
///
/// ```rust
/// use ssaopt::utils::graph::NodeId;
///
/// let node = NodeId::new(5);
/// assert_eq!(node.index(), 5);
/// assert_eq!(node.to_string(), "n5");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw index value.
    ///
    /// # Arguments
    ///
    /// * `index` - The raw node index (0-based)
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw index value of this node identifier.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    fn from(node: NodeId) -> Self {
        node.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_node_id_conversions() {
        let node = NodeId::from(7);
        assert_eq!(node.index(), 7);
        let raw: usize = node.into();
        assert_eq!(raw, 7);
    }

    #[test]
    fn test_node_id_formatting() {
        let node = NodeId::new(42);
        assert_eq!(format!("{node:?}"), "NodeId(42)");
        assert_eq!(format!("{node}"), "n42");
    }

    #[test]
    fn test_node_id_ordering_and_hash() {
        assert!(NodeId::new(1) < NodeId::new(2));
        let set: HashSet<NodeId> = [NodeId::new(1), NodeId::new(1), NodeId::new(3)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }
}

//! Graph algorithms for control-flow analysis.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`postorder`] - Postorder traversal
//! - [`reverse_postorder`] - Reverse postorder traversal (useful for data flow)
//! - [`reachable`] - Set of nodes reachable from a root
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Dominator tree of a rooted graph
//! - [`compute_post_dominators`] - Post-dominator tree relative to a virtual exit
//! - [`augment_with_exit`] - Copy of a graph with a virtual exit node
//! - [`compute_dominance_frontiers`] - Dominance frontiers for phi placement
//! - [`iterated_dominance_frontier`] - Closure of a definition set under the frontier
//!   relation, optionally pruned by liveness
//! - [`DominatorTree`] - Result of dominator computation
//!
//! # Algorithm Selection
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | Postorder/RPO | O(V + E) | Dataflow iteration order |
//! | Dominators | O(V + E) per round | SSA construction, post-dominance queries |
//! | Frontiers | O(V + E + \|DF\|) | Phi placement |
//!
//! # Examples
//!
//! ```rust
//! use ssaopt::utils::graph::{DenseGraph, NodeId, algorithms};
//!
//! let graph = DenseGraph::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
//! let dom_tree = algorithms::compute_dominators(&graph, NodeId::new(0));
//! let frontiers = algorithms::compute_dominance_frontiers(&graph, &dom_tree);
//!
//! let phis = algorithms::iterated_dominance_frontier(&frontiers, [NodeId::new(1)], None);
//! assert_eq!(phis, vec![NodeId::new(3)]);
//! ```

mod dominators;
mod traversal;

pub use dominators::{
    augment_with_exit, compute_dominance_frontiers, compute_dominators, compute_post_dominators,
    iterated_dominance_frontier, DominatorIterator, DominatorTree,
};
pub use traversal::{postorder, reachable, reverse_postorder};

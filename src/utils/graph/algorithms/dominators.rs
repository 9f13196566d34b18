//! Dominator and post-dominator trees, dominance frontiers and their iteration.
//!
//! This module provides the dominance machinery used by SSA construction and by
//! the effect refinement engine:
//!
//! - [`compute_dominators`] builds the dominator tree of a rooted graph
//! - [`compute_post_dominators`] builds the post-dominator tree relative to a
//!   virtual exit node joining every exit block
//! - [`compute_dominance_frontiers`] computes per-node dominance frontiers
//! - [`iterated_dominance_frontier`] closes a set of definition nodes under the
//!   frontier relation, optionally pruned by liveness
//!
//! # Theory
//!
//! A node `d` **dominates** a node `n` if every path from the entry node to `n`
//! must pass through `d`. The **immediate dominator** of `n` (idom(n)) is the
//! unique node that strictly dominates `n` but does not strictly dominate any
//! other dominator of `n`. Post-dominance is the same relation on the reversed
//! graph, rooted at the exit.
//!
//! # Algorithm
//!
//! Dominators are computed with the iterative algorithm of Cooper, Harvey and
//! Kennedy: immediate dominators are refined in reverse postorder until a fixed
//! point is reached, walking the partially built tree with the "two finger"
//! intersection. On reducible control flow this converges in two passes, and it
//! needs no recursion.
//!
//! Nodes unreachable from the root have no immediate dominator, are dominated by
//! nothing and dominate nothing.

use std::collections::HashSet;

use crate::utils::{
    graph::{
        algorithms::traversal::reverse_postorder, DenseGraph, GraphBase, NodeId, Predecessors,
        Reversed, Successors,
    },
    BitSet,
};

const UNREACHABLE: usize = usize::MAX;

/// Result of dominator tree computation.
///
/// The dominator tree represents the dominance relationships in a control flow
/// graph. Each reachable node except the root has exactly one immediate dominator.
///
/// # Examples
///
/// ```rust
/// use ssaopt::utils::graph::{DenseGraph, NodeId, algorithms::compute_dominators};
///
/// // Diamond: 0 -> {1, 2} -> 3
/// let graph = DenseGraph::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
/// let dom_tree = compute_dominators(&graph, NodeId::new(0));
///
/// assert!(dom_tree.dominates(NodeId::new(0), NodeId::new(3)));
/// assert!(!dom_tree.dominates(NodeId::new(1), NodeId::new(3)));
/// assert_eq!(dom_tree.immediate_dominator(NodeId::new(3)), Some(NodeId::new(0)));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    /// The root of the tree
    entry: NodeId,
    /// Immediate dominator per node, `UNREACHABLE` for nodes not reachable from the root.
    /// The root maps to itself.
    idom: Vec<usize>,
    /// Depth of each reachable node (root has depth 0)
    depth: Vec<usize>,
    /// Dominator-tree children of each node, in increasing node order
    children: Vec<Vec<NodeId>>,
}

impl DominatorTree {
    /// Returns the entry (root) node of the dominator tree.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// Returns the number of nodes covered by this tree, reachable or not.
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.idom.len()
    }

    /// Returns `true` if `node` is reachable from the root.
    #[inline]
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.idom
            .get(node.index())
            .is_some_and(|&idom| idom != UNREACHABLE)
    }

    /// Returns the immediate dominator of a node.
    ///
    /// Returns `None` for the root and for unreachable nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        if node == self.entry || !self.is_reachable(node) {
            None
        } else {
            Some(NodeId::new(self.idom[node.index()]))
        }
    }

    /// Checks if node `a` dominates node `b`.
    ///
    /// A reachable node dominates itself.
    ///
    /// # Complexity
    ///
    /// O(depth(b) - depth(a)).
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let target_depth = self.depth[a.index()];
        let mut current = b;
        while self.depth[current.index()] > target_depth {
            current = NodeId::new(self.idom[current.index()]);
        }
        current == a
    }

    /// Checks if node `a` strictly dominates node `b`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Returns the depth of a node in the dominator tree, or `None` when unreachable.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> Option<usize> {
        self.is_reachable(node).then(|| self.depth[node.index()])
    }

    /// Returns the dominator-tree children of a node, in increasing node order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children
            .get(node.index())
            .map_or(&[], |children| children.as_slice())
    }

    /// Returns an iterator over all dominators of a node, from the node itself up to
    /// the root.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Returns the nodes of the tree in preorder (every node before its children).
    #[must_use]
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.node_count());
        if !self.is_reachable(self.entry) {
            return order;
        }
        let mut stack = vec![self.entry];
        while let Some(node) = stack.pop() {
            order.push(node);
            stack.extend(self.children(node).iter().rev().copied());
        }
        order
    }
}

/// Iterator over dominators of a node, from the node up to the root.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

/// Computes the dominator tree of `graph` rooted at `entry`.
///
/// # Arguments
///
/// * `graph` - The graph to analyze
/// * `entry` - The root node
///
/// # Returns
///
/// A `DominatorTree` covering every node of the graph. Nodes not reachable from
/// `entry` are marked unreachable.
///
/// # Complexity
///
/// O(V + E) per iteration; the number of iterations is bounded by the loop
/// nesting depth plus two.
pub fn compute_dominators<G>(graph: &G, entry: NodeId) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let node_count = graph.node_count();
    let mut idom = vec![UNREACHABLE; node_count];
    if entry.index() >= node_count {
        return build_tree(entry, idom);
    }

    let rpo = reverse_postorder(graph, entry);
    let mut order = vec![UNREACHABLE; node_count];
    for (position, node) in rpo.iter().enumerate() {
        order[node.index()] = position;
    }

    idom[entry.index()] = entry.index();
    let mut changed = true;
    while changed {
        changed = false;
        for &node in rpo.iter().skip(1) {
            let mut new_idom = UNREACHABLE;
            for pred in graph.predecessors(node) {
                let pred = pred.index();
                if idom[pred] == UNREACHABLE {
                    continue;
                }
                new_idom = if new_idom == UNREACHABLE {
                    pred
                } else {
                    intersect(&idom, &order, pred, new_idom)
                };
            }
            if new_idom != UNREACHABLE && idom[node.index()] != new_idom {
                idom[node.index()] = new_idom;
                changed = true;
            }
        }
    }

    build_tree(entry, idom)
}

fn intersect(idom: &[usize], order: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while order[a] > order[b] {
            a = idom[a];
        }
        while order[b] > order[a] {
            b = idom[b];
        }
    }
    a
}

fn build_tree(entry: NodeId, idom: Vec<usize>) -> DominatorTree {
    let node_count = idom.len();
    let mut children = vec![Vec::new(); node_count];
    for (node, &parent) in idom.iter().enumerate() {
        if parent != UNREACHABLE && node != entry.index() {
            children[parent].push(NodeId::new(node));
        }
    }

    // Parents always precede children in a preorder walk, so depths can be filled
    // top-down.
    let mut depth = vec![0; node_count];
    if entry.index() < node_count && idom[entry.index()] != UNREACHABLE {
        let mut stack = vec![entry.index()];
        while let Some(node) = stack.pop() {
            for child in &children[node] {
                depth[child.index()] = depth[node] + 1;
                stack.push(child.index());
            }
        }
    }

    DominatorTree {
        entry,
        idom,
        depth,
        children,
    }
}

/// Computes the post-dominator tree of `graph`.
///
/// A virtual exit node with id `graph.node_count()` is added, with an edge from every
/// node in `exits`. The returned tree is rooted at that node and covers
/// `graph.node_count() + 1` nodes. Nodes that cannot reach any exit are unreachable
/// in the tree and therefore post-dominate nothing.
///
/// # Arguments
///
/// * `graph` - The forward graph
/// * `exits` - Nodes that leave the function (returns)
pub fn compute_post_dominators<G>(graph: &G, exits: &[NodeId]) -> DominatorTree
where
    G: Successors + Predecessors,
{
    let augmented = augment_with_exit(graph, exits);
    let exit = NodeId::new(graph.node_count());
    compute_dominators(&Reversed::new(&augmented, exit), exit)
}

/// Copies `graph` into a [`DenseGraph`] with one additional node that every node in
/// `exits` flows into.
///
/// The additional node has id `graph.node_count()`.
pub fn augment_with_exit<G: Successors>(graph: &G, exits: &[NodeId]) -> DenseGraph {
    let node_count = graph.node_count();
    let mut augmented = DenseGraph::with_nodes(node_count);
    for idx in 0..node_count {
        let node = NodeId::new(idx);
        for succ in graph.successors(node) {
            augmented.add_edge(node, succ);
        }
    }
    let exit = augmented.add_node();
    for &node in exits {
        augmented.add_edge(node, exit);
    }
    augmented
}

/// Computes dominance frontiers for all nodes.
///
/// The dominance frontier of a node `n` is the set of all nodes `m` such that
/// `n` dominates a predecessor of `m` but does not strictly dominate `m`.
///
/// # Arguments
///
/// * `graph` - The control flow graph
/// * `dom_tree` - The precomputed dominator tree
///
/// # Returns
///
/// A vector where `result[i]` contains the dominance frontier of node `i`.
pub fn compute_dominance_frontiers<G>(graph: &G, dom_tree: &DominatorTree) -> Vec<HashSet<NodeId>>
where
    G: Predecessors,
{
    let n = graph.node_count();
    let mut frontiers: Vec<HashSet<NodeId>> = vec![HashSet::new(); n];

    for node_idx in 0..n {
        let node = NodeId::new(node_idx);
        if !dom_tree.is_reachable(node) {
            continue;
        }
        let preds: Vec<NodeId> = graph
            .predecessors(node)
            .filter(|&p| dom_tree.is_reachable(p))
            .collect();
        // The root has an implicit predecessor (function entry), so a single back
        // edge into it already makes it a join point.
        let joins = preds.len() + usize::from(node == dom_tree.entry());
        if joins < 2 {
            continue;
        }

        let idom_node = dom_tree.immediate_dominator(node);
        for pred in preds {
            let mut runner = pred;
            loop {
                if Some(runner) == idom_node {
                    break;
                }
                frontiers[runner.index()].insert(node);
                match dom_tree.immediate_dominator(runner) {
                    Some(idom) => runner = idom,
                    None => break,
                }
            }
        }
    }

    frontiers
}

/// Computes the iterated dominance frontier of a set of definition nodes.
///
/// This is the set of merge points at which a value defined in `defs` needs a phi.
/// When `live_in` is given the result is pruned: a frontier node is only included
/// (and only propagates further) when it is in `live_in`.
///
/// # Arguments
///
/// * `frontiers` - Per-node dominance frontiers from [`compute_dominance_frontiers`]
/// * `defs` - Nodes containing a definition
/// * `live_in` - Optional set of nodes where the value is live on entry
///
/// # Returns
///
/// The phi nodes, sorted by node id.
pub fn iterated_dominance_frontier(
    frontiers: &[HashSet<NodeId>],
    defs: impl IntoIterator<Item = NodeId>,
    live_in: Option<&BitSet>,
) -> Vec<NodeId> {
    let n = frontiers.len();
    let mut result = BitSet::new(n);
    let mut enqueued = BitSet::new(n);
    let mut worklist = Vec::new();
    for def in defs {
        if def.index() < n && enqueued.insert(def.index()) {
            worklist.push(def);
        }
    }

    while let Some(node) = worklist.pop() {
        for &frontier in &frontiers[node.index()] {
            if live_in.is_some_and(|live| !live.contains(frontier.index())) {
                continue;
            }
            if result.insert(frontier.index()) && enqueued.insert(frontier.index()) {
                worklist.push(frontier);
            }
        }
    }

    result.iter().map(NodeId::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DenseGraph;

    fn n(idx: usize) -> NodeId {
        NodeId::new(idx)
    }

    #[test]
    fn test_dominator_single_node() {
        let graph = DenseGraph::with_nodes(1);
        let dom_tree = compute_dominators(&graph, n(0));

        assert_eq!(dom_tree.entry(), n(0));
        assert_eq!(dom_tree.immediate_dominator(n(0)), None);
        assert!(dom_tree.dominates(n(0), n(0)));
        assert_eq!(dom_tree.depth(n(0)), Some(0));
    }

    #[test]
    fn test_dominator_linear_chain() {
        let graph = DenseGraph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let dom_tree = compute_dominators(&graph, n(0));

        assert_eq!(dom_tree.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom_tree.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(dom_tree.immediate_dominator(n(3)), Some(n(2)));
        assert!(dom_tree.dominates(n(1), n(3)));
        assert!(!dom_tree.dominates(n(3), n(1)));
        assert_eq!(dom_tree.depth(n(3)), Some(3));
        assert_eq!(
            dom_tree.dominators(n(2)).collect::<Vec<_>>(),
            vec![n(2), n(1), n(0)]
        );
    }

    #[test]
    fn test_dominator_diamond() {
        let graph = DenseGraph::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom_tree = compute_dominators(&graph, n(0));

        assert_eq!(dom_tree.immediate_dominator(n(3)), Some(n(0)));
        assert!(!dom_tree.strictly_dominates(n(1), n(3)));
        assert!(!dom_tree.strictly_dominates(n(2), n(3)));
        assert_eq!(dom_tree.children(n(0)), &[n(1), n(2), n(3)]);
        assert_eq!(dom_tree.preorder(), vec![n(0), n(1), n(2), n(3)]);
    }

    #[test]
    fn test_dominator_loop() {
        // 0 -> 1 -> 2 -> 1, 1 -> 3
        let graph = DenseGraph::from_edges(4, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let dom_tree = compute_dominators(&graph, n(0));

        assert_eq!(dom_tree.immediate_dominator(n(2)), Some(n(1)));
        assert_eq!(dom_tree.immediate_dominator(n(3)), Some(n(1)));
        assert!(dom_tree.dominates(n(1), n(2)));
    }

    #[test]
    fn test_dominator_irreducible() {
        // 0 -> 1, 0 -> 2, 1 <-> 2
        let graph = DenseGraph::from_edges(3, &[(0, 1), (0, 2), (1, 2), (2, 1)]);
        let dom_tree = compute_dominators(&graph, n(0));

        assert_eq!(dom_tree.immediate_dominator(n(1)), Some(n(0)));
        assert_eq!(dom_tree.immediate_dominator(n(2)), Some(n(0)));
    }

    #[test]
    fn test_dominator_unreachable_node() {
        let graph = DenseGraph::from_edges(3, &[(0, 1), (2, 1)]);
        let dom_tree = compute_dominators(&graph, n(0));

        assert!(!dom_tree.is_reachable(n(2)));
        assert_eq!(dom_tree.immediate_dominator(n(1)), Some(n(0)));
        assert!(!dom_tree.dominates(n(2), n(1)));
        assert!(!dom_tree.dominates(n(0), n(2)));
        assert_eq!(dom_tree.depth(n(2)), None);
    }

    #[test]
    fn test_post_dominators_diamond() {
        let graph = DenseGraph::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let pdom = compute_post_dominators(&graph, &[n(3)]);

        assert_eq!(pdom.entry(), n(4));
        assert!(pdom.dominates(n(3), n(0)));
        assert!(pdom.dominates(n(3), n(1)));
        assert!(!pdom.dominates(n(1), n(0)));
        assert_eq!(pdom.immediate_dominator(n(0)), Some(n(3)));
    }

    #[test]
    fn test_post_dominators_two_exits() {
        // 0 -> 1 (return), 0 -> 2 (return)
        let graph = DenseGraph::from_edges(3, &[(0, 1), (0, 2)]);
        let pdom = compute_post_dominators(&graph, &[n(1), n(2)]);

        assert!(!pdom.dominates(n(1), n(0)));
        assert!(!pdom.dominates(n(2), n(0)));
        assert_eq!(pdom.immediate_dominator(n(0)), Some(n(3)));
    }

    #[test]
    fn test_dominance_frontiers_diamond() {
        let graph = DenseGraph::from_edges(4, &[(0, 1), (0, 2), (1, 3), (2, 3)]);
        let dom_tree = compute_dominators(&graph, n(0));
        let frontiers = compute_dominance_frontiers(&graph, &dom_tree);

        assert!(frontiers[0].is_empty());
        assert!(frontiers[1].contains(&n(3)));
        assert!(frontiers[2].contains(&n(3)));
        assert!(frontiers[3].is_empty());
    }

    #[test]
    fn test_dominance_frontiers_loop() {
        let graph = DenseGraph::from_edges(4, &[(0, 1), (1, 2), (2, 1), (1, 3)]);
        let dom_tree = compute_dominators(&graph, n(0));
        let frontiers = compute_dominance_frontiers(&graph, &dom_tree);

        assert!(frontiers[2].contains(&n(1)));
        assert!(frontiers[1].contains(&n(1)));
    }

    #[test]
    fn test_iterated_dominance_frontier() {
        // 0 -> {1, 2} -> 3 -> {4, 5} -> 6
        let graph = DenseGraph::from_edges(
            7,
            &[(0, 1), (0, 2), (1, 3), (2, 3), (3, 4), (3, 5), (4, 6), (5, 6)],
        );
        let dom_tree = compute_dominators(&graph, n(0));
        let frontiers = compute_dominance_frontiers(&graph, &dom_tree);

        assert_eq!(iterated_dominance_frontier(&frontiers, [n(1)], None), vec![n(3)]);
        assert_eq!(
            iterated_dominance_frontier(&frontiers, [n(1), n(4)], None),
            vec![n(3), n(6)]
        );

        let live = BitSet::from_indices(7, [0, 1, 2]);
        assert!(iterated_dominance_frontier(&frontiers, [n(1)], Some(&live)).is_empty());
    }
}

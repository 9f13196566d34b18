//! Graph traversal orders.
//!
//! All traversals are iterative with an explicit stack so that deep control-flow
//! graphs cannot overflow the call stack.

use crate::utils::{
    graph::{NodeId, Successors},
    BitSet,
};

/// Computes a postorder traversal starting from `start`.
///
/// Only nodes reachable from `start` are included. Successors are visited in the
/// order the graph yields them.
///
/// # Arguments
///
/// * `graph` - The graph to traverse
/// * `start` - The node to start from
///
/// # Returns
///
/// Nodes in postorder, or an empty vector when `start` is not a node of the graph.
pub fn postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let node_count = graph.node_count();
    if start.index() >= node_count {
        return Vec::new();
    }

    #[derive(Clone, Copy)]
    enum State {
        Enter,
        Exit,
    }

    let mut visited = BitSet::new(node_count);
    let mut result = Vec::with_capacity(node_count);
    let mut stack = vec![(start, State::Enter)];

    while let Some((node, state)) = stack.pop() {
        match state {
            State::Enter => {
                if !visited.insert(node.index()) {
                    continue;
                }
                stack.push((node, State::Exit));
                let successors: Vec<NodeId> = graph.successors(node).collect();
                for &succ in successors.iter().rev() {
                    if !visited.contains(succ.index()) {
                        stack.push((succ, State::Enter));
                    }
                }
            }
            State::Exit => result.push(node),
        }
    }

    result
}

/// Computes a reverse postorder traversal starting from `start`.
///
/// In reverse postorder every node appears before its successors, except along
/// back edges. This is the iteration order of forward dataflow problems and of the
/// iterative dominator algorithm.
pub fn reverse_postorder<G: Successors>(graph: &G, start: NodeId) -> Vec<NodeId> {
    let mut result = postorder(graph, start);
    result.reverse();
    result
}

/// Returns the set of nodes reachable from `start`, including `start` itself.
pub fn reachable<G: Successors>(graph: &G, start: NodeId) -> BitSet {
    let node_count = graph.node_count();
    let mut seen = BitSet::new(node_count);
    if start.index() >= node_count {
        return seen;
    }
    let mut stack = vec![start];
    seen.insert(start.index());
    while let Some(node) = stack.pop() {
        for succ in graph.successors(node) {
            if seen.insert(succ.index()) {
                stack.push(succ);
            }
        }
    }
    seen
}

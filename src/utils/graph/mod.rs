//! Generic directed-graph infrastructure for control-flow analysis.
//!
//! The optimizer works on control-flow graphs whose nodes are basic blocks. The
//! algorithms in [`algorithms`] are written against the small set of traits defined
//! here rather than against the concrete [`crate::ir::Cfg`], so that they also run on
//! derived graphs such as the CFG augmented with a virtual exit node or the reversed
//! CFG used for post-dominance.
//!
//! # Traits
//!
//! - [`GraphBase`] - node count
//! - [`Successors`] - forward adjacency
//! - [`Predecessors`] - backward adjacency
//! - [`RootedGraph`] - a distinguished entry node
//!
//! # Types
//!
//! - [`NodeId`] - strongly typed node index
//! - [`DenseGraph`] - adjacency-list graph with both edge directions materialised
//! - [`Reversed`] - a borrowed view of a graph with every edge flipped

pub mod algorithms;
mod node;

pub use node::NodeId;

/// Base trait for graphs with a dense `0..node_count` node domain.
pub trait GraphBase {
    /// Returns the number of nodes in the graph.
    fn node_count(&self) -> usize;
}

/// Graphs that can enumerate the successors of a node.
pub trait Successors: GraphBase {
    /// Returns an iterator over the direct successors of `node`.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// Graphs that can enumerate the predecessors of a node.
pub trait Predecessors: GraphBase {
    /// Returns an iterator over the direct predecessors of `node`.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_;
}

/// Graphs with a distinguished entry node.
pub trait RootedGraph: Successors {
    /// Returns the entry node.
    fn entry(&self) -> NodeId;
}

/// A directed graph stored as paired successor and predecessor lists.
///
/// Edges are kept in insertion order and duplicates are ignored, which matches the
/// set semantics of basic-block edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenseGraph {
    succs: Vec<Vec<NodeId>>,
    preds: Vec<Vec<NodeId>>,
}

impl DenseGraph {
    /// Creates a graph with `nodes` nodes and no edges.
    #[must_use]
    pub fn with_nodes(nodes: usize) -> Self {
        Self {
            succs: vec![Vec::new(); nodes],
            preds: vec![Vec::new(); nodes],
        }
    }

    /// Creates a graph from an edge list.
    #[must_use]
    pub fn from_edges(nodes: usize, edges: &[(usize, usize)]) -> Self {
        let mut graph = Self::with_nodes(nodes);
        for &(from, to) in edges {
            graph.add_edge(NodeId::new(from), NodeId::new(to));
        }
        graph
    }

    /// Appends a new node and returns its id.
    pub fn add_node(&mut self) -> NodeId {
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        NodeId::new(self.succs.len() - 1)
    }

    /// Adds the edge `from -> to` unless it already exists.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is not a node of the graph.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        if !self.succs[from.index()].contains(&to) {
            self.succs[from.index()].push(to);
            self.preds[to.index()].push(from);
        }
    }
}

impl GraphBase for DenseGraph {
    fn node_count(&self) -> usize {
        self.succs.len()
    }
}

impl Successors for DenseGraph {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.succs[node.index()].iter().copied()
    }
}

impl Predecessors for DenseGraph {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.preds[node.index()].iter().copied()
    }
}

impl RootedGraph for DenseGraph {
    fn entry(&self) -> NodeId {
        NodeId::new(0)
    }
}

/// A view of a graph with every edge reversed, rooted at `root`.
///
/// This is how post-dominators are computed: dominators of the reversed graph rooted
/// at the (virtual) exit node.
pub struct Reversed<'g, G> {
    graph: &'g G,
    root: NodeId,
}

impl<'g, G> Reversed<'g, G> {
    /// Creates a reversed view of `graph` rooted at `root`.
    pub fn new(graph: &'g G, root: NodeId) -> Self {
        Self { graph, root }
    }
}

impl<G: GraphBase> GraphBase for Reversed<'_, G> {
    fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}

impl<G: Predecessors> Successors for Reversed<'_, G> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.predecessors(node)
    }
}

impl<G: Successors> Predecessors for Reversed<'_, G> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.successors(node)
    }
}

impl<G: GraphBase + Predecessors + Successors> RootedGraph for Reversed<'_, G> {
    fn entry(&self) -> NodeId {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_graph_edges_are_symmetric() {
        let graph = DenseGraph::from_edges(3, &[(0, 1), (0, 2), (1, 2), (1, 2)]);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(
            graph.successors(NodeId::new(1)).collect::<Vec<_>>(),
            vec![NodeId::new(2)]
        );
        assert_eq!(
            graph.predecessors(NodeId::new(2)).collect::<Vec<_>>(),
            vec![NodeId::new(0), NodeId::new(1)]
        );
    }

    #[test]
    fn test_reversed_view() {
        let graph = DenseGraph::from_edges(3, &[(0, 1), (1, 2)]);
        let rev = Reversed::new(&graph, NodeId::new(2));
        assert_eq!(rev.entry(), NodeId::new(2));
        assert_eq!(
            rev.successors(NodeId::new(2)).collect::<Vec<_>>(),
            vec![NodeId::new(1)]
        );
    }
}

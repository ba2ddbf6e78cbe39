use super::builder::unordered;
use super::{Axis, AxisGraph, PerAxis, RegistrationGraph};
use crate::error::{Result, StitchError};
use petgraph::algo::min_spanning_tree;
use petgraph::data::Element;
use petgraph::graph::{NodeIndex, UnGraph};
use std::collections::HashSet;
use tracing::{debug, info};

/// Edge kept by the minimum spanning tree, in tree orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeEdge {
    pub from: usize,
    pub to: usize,
    pub weight: f64,
}

/// Minimum-weight spanning tree of one axis graph
#[derive(Debug, Clone)]
pub struct SpanningTree {
    axis: Axis,
    edges: Vec<TreeEdge>,
    pairs: HashSet<(usize, usize)>,
    graph: UnGraph<(), f64>,
}

impl SpanningTree {
    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn edges(&self) -> &[TreeEdge] {
        &self.edges
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn total_weight(&self) -> f64 {
        self.edges.iter().map(|e| e.weight).sum()
    }

    /// Whether the tree kept the edge between `a` and `b`
    pub fn contains(&self, a: usize, b: usize) -> bool {
        self.pairs.contains(&unordered(a, b))
    }

    /// Undirected tree with one node per grid vertex
    pub fn graph(&self) -> &UnGraph<(), f64> {
        &self.graph
    }
}

/// Keeps the `n - 1` most reliable measurements of each axis
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanningTreeOptimizer;

impl SpanningTreeOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Minimum spanning tree of every axis graph.
    ///
    /// Fails when an axis graph does not connect all occupied cells.
    pub fn optimize(&self, graph: &RegistrationGraph) -> Result<PerAxis<SpanningTree>> {
        let required = graph.n_occupied().saturating_sub(1);
        PerAxis::try_from_fn(|axis| self.optimize_axis(graph.axis(axis), required))
    }

    pub fn optimize_axis(&self, axis_graph: &AxisGraph, required: usize) -> Result<SpanningTree> {
        let axis = axis_graph.axis();
        let n_vertex = axis_graph.n_vertex();

        let mut edges = Vec::with_capacity(required);
        for element in min_spanning_tree(axis_graph.graph()) {
            if let Element::Edge {
                source,
                target,
                weight,
            } = element
            {
                edges.push(TreeEdge {
                    from: source,
                    to: target,
                    weight,
                });
            }
        }

        if edges.len() < required {
            return Err(StitchError::DisconnectedGraph {
                axis,
                edges: edges.len(),
                required,
            });
        }

        let mut graph = UnGraph::with_capacity(n_vertex, edges.len());
        for _ in 0..n_vertex {
            graph.add_node(());
        }
        for edge in &edges {
            graph.add_edge(NodeIndex::new(edge.from), NodeIndex::new(edge.to), edge.weight);
        }

        let pairs = edges.iter().map(|e| unordered(e.from, e.to)).collect();
        let tree = SpanningTree {
            axis,
            edges,
            pairs,
            graph,
        };
        debug!(
            axis = %axis,
            measured = axis_graph.n_edges(),
            kept = tree.n_edges(),
            "Computed minimum spanning tree"
        );
        info!(
            axis = %axis,
            total_weight = tree.total_weight(),
            "Optimized axis graph"
        );
        Ok(tree)
    }
}

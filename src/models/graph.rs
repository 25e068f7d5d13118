use serde::{Deserialize, Serialize};

/// A file in the impact graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphVertex {
    pub path: String,
    /// Hops from the nearest seed (seeds are 0)
    pub depth: usize,
}

/// An undirected co-change edge; `a < b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub a: String,
    pub b: String,
    pub weight: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactGraph {
    /// In expansion order
    pub vertices: Vec<GraphVertex>,
    pub edges: Vec<GraphEdge>,
    /// True when a neighbor was dropped because `max_vertices` was reached
    pub truncated: bool,
}

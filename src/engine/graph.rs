use ahash::AHashSet;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};

use crate::config::GraphConfig;
use crate::models::graph::{GraphEdge, GraphVertex, ImpactGraph};
use crate::models::record::{FileImpactRecord, Neighbor};

#[derive(Debug, Clone, Copy)]
pub struct GraphLimits {
    /// Hops from the nearest seed
    pub max_depth: usize,
    pub max_vertices: usize,
}

impl From<&GraphConfig> for GraphLimits {
    fn from(config: &GraphConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_vertices: config.max_vertices,
        }
    }
}

fn sorted_neighbors(record: &FileImpactRecord) -> Vec<&Neighbor> {
    let mut neighbors: Vec<&Neighbor> = record.co_change.iter().collect();
    neighbors.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });
    neighbors
}

/// Breadth-first walk of the co-change graph from `seeds`.
///
/// Seeds are taken in the given order (duplicates dropped). Each vertex is
/// expanded strongest neighbor first; nothing is visited twice. The returned
/// edges are every co-change link between two returned vertices.
pub fn explore<'a, I>(
    seeds: I,
    records: &BTreeMap<String, FileImpactRecord>,
    limits: GraphLimits,
) -> ImpactGraph
where
    I: IntoIterator<Item = &'a str>,
{
    let mut graph = ImpactGraph::default();
    let mut visited: AHashSet<String> = AHashSet::new();
    let mut queue: VecDeque<(String, usize)> = VecDeque::new();

    for seed in seeds {
        if visited.contains(seed) {
            continue;
        }
        if graph.vertices.len() >= limits.max_vertices {
            graph.truncated = true;
            break;
        }
        visited.insert(seed.to_string());
        graph.vertices.push(GraphVertex {
            path: seed.to_string(),
            depth: 0,
        });
        queue.push_back((seed.to_string(), 0));
    }

    while let Some((path, depth)) = queue.pop_front() {
        if depth >= limits.max_depth {
            continue;
        }
        let Some(record) = records.get(&path) else {
            continue;
        };
        for neighbor in sorted_neighbors(record) {
            if visited.contains(&neighbor.path) {
                continue;
            }
            if graph.vertices.len() >= limits.max_vertices {
                graph.truncated = true;
                break;
            }
            visited.insert(neighbor.path.clone());
            graph.vertices.push(GraphVertex {
                path: neighbor.path.clone(),
                depth: depth + 1,
            });
            queue.push_back((neighbor.path.clone(), depth + 1));
        }
    }

    // keyed by (min, max) so each undirected edge appears once
    let mut edges: BTreeMap<(String, String), f64> = BTreeMap::new();
    for vertex in &graph.vertices {
        let Some(record) = records.get(&vertex.path) else {
            continue;
        };
        for neighbor in &record.co_change {
            if neighbor.path == vertex.path || !visited.contains(&neighbor.path) {
                continue;
            }
            let key = if vertex.path < neighbor.path {
                (vertex.path.clone(), neighbor.path.clone())
            } else {
                (neighbor.path.clone(), vertex.path.clone())
            };
            edges.entry(key).or_insert(neighbor.score);
        }
    }
    graph.edges = edges
        .into_iter()
        .map(|((a, b), weight)| GraphEdge { a, b, weight })
        .collect();

    graph
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str, neighbors: &[(&str, f64)]) -> FileImpactRecord {
        let mut r = FileImpactRecord::empty("acme", path);
        r.co_change = neighbors
            .iter()
            .map(|(p, s)| Neighbor {
                path: (*p).to_string(),
                score: *s,
            })
            .collect();
        r
    }

    /// a - b - c - d chain plus a - e, with symmetric scores.
    fn chain() -> BTreeMap<String, FileImpactRecord> {
        [
            record("a", &[("b", 0.9), ("e", 0.4)]),
            record("b", &[("a", 0.9), ("c", 0.7)]),
            record("c", &[("b", 0.7), ("d", 0.5)]),
            record("d", &[("c", 0.5)]),
            record("e", &[("a", 0.4)]),
        ]
        .into_iter()
        .map(|r| (r.file_path.clone(), r))
        .collect()
    }

    fn paths(graph: &ImpactGraph) -> Vec<&str> {
        graph.vertices.iter().map(|v| v.path.as_str()).collect()
    }

    #[test]
    fn expands_to_max_depth_strongest_first() {
        let records = chain();
        let graph = explore(
            ["a"],
            &records,
            GraphLimits {
                max_depth: 2,
                max_vertices: 50,
            },
        );

        assert_eq!(paths(&graph), vec!["a", "b", "e", "c"]);
        assert_eq!(graph.vertices[3].depth, 2);
        assert!(!graph.truncated);

        let edge_keys: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|e| (e.a.as_str(), e.b.as_str()))
            .collect();
        assert_eq!(edge_keys, vec![("a", "b"), ("a", "e"), ("b", "c")]);
    }

    #[test]
    fn never_exceeds_max_vertices() {
        let records = chain();
        let graph = explore(
            ["a"],
            &records,
            GraphLimits {
                max_depth: 10,
                max_vertices: 3,
            },
        );
        assert_eq!(graph.vertices.len(), 3);
        assert!(graph.truncated);
        for edge in &graph.edges {
            assert!(paths(&graph).contains(&edge.a.as_str()));
            assert!(paths(&graph).contains(&edge.b.as_str()));
        }
    }

    #[test]
    fn no_revisits_or_duplicate_edges() {
        // triangle with every link listed from both sides
        let records: BTreeMap<String, FileImpactRecord> = [
            record("x", &[("y", 0.5), ("z", 0.5)]),
            record("y", &[("x", 0.5), ("z", 0.5)]),
            record("z", &[("x", 0.5), ("y", 0.5)]),
        ]
        .into_iter()
        .map(|r| (r.file_path.clone(), r))
        .collect();

        let graph = explore(
            ["x", "y", "x"],
            &records,
            GraphLimits {
                max_depth: 5,
                max_vertices: 50,
            },
        );
        assert_eq!(paths(&graph), vec!["x", "y", "z"]);
        assert_eq!(graph.edges.len(), 3);
        let mut keys: Vec<_> = graph.edges.iter().map(|e| (&e.a, &e.b)).collect();
        keys.dedup();
        assert_eq!(keys.len(), 3);
        assert!(graph.edges.iter().all(|e| e.a < e.b));
    }

    #[test]
    fn depth_zero_returns_seeds_only() {
        let records = chain();
        let graph = explore(
            ["a", "c"],
            &records,
            GraphLimits {
                max_depth: 0,
                max_vertices: 50,
            },
        );
        assert_eq!(paths(&graph), vec!["a", "c"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn unknown_seed_is_a_lone_vertex() {
        let graph = explore(
            ["ghost.rs"],
            &chain(),
            GraphLimits {
                max_depth: 2,
                max_vertices: 50,
            },
        );
        assert_eq!(paths(&graph), vec!["ghost.rs"]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn exploration_is_deterministic() {
        let records = chain();
        let limits = GraphLimits {
            max_depth: 3,
            max_vertices: 4,
        };
        assert_eq!(
            explore(["b"], &records, limits),
            explore(["b"], &records, limits)
        );
    }

    /// Seed `s` linked to `z`, `m` and `a` at one shared score, listed out of
    /// path order.
    fn tied_star() -> BTreeMap<String, FileImpactRecord> {
        [
            record("s", &[("z", 0.5), ("m", 0.5), ("a", 0.5)]),
            record("z", &[("s", 0.5)]),
            record("m", &[("s", 0.5)]),
            record("a", &[("s", 0.5)]),
        ]
        .into_iter()
        .map(|r| (r.file_path.clone(), r))
        .collect()
    }

    #[test]
    fn equal_scores_expand_in_path_order() {
        let graph = explore(
            ["s"],
            &tied_star(),
            GraphLimits {
                max_depth: 1,
                max_vertices: 50,
            },
        );
        assert_eq!(paths(&graph), vec!["s", "a", "m", "z"]);
        assert!(!graph.truncated);
    }

    #[test]
    fn vertex_cap_inside_a_tie_keeps_lowest_paths() {
        let graph = explore(
            ["s"],
            &tied_star(),
            GraphLimits {
                max_depth: 1,
                max_vertices: 3,
            },
        );
        assert_eq!(paths(&graph), vec!["s", "a", "m"]);
        assert!(graph.truncated);
        let edge_keys: Vec<(&str, &str)> = graph
            .edges
            .iter()
            .map(|e| (e.a.as_str(), e.b.as_str()))
            .collect();
        assert_eq!(edge_keys, vec![("a", "s"), ("m", "s")]);
    }
}

//! Directed path search: unweighted shortest path and bounded simple-path
//! enumeration.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::Triple;
use super::index::{EntityGraph, EntityId};

/// A directed path between two entities, with the triples backing each hop.
///
/// `length` counts edges, so `length == path.len() - 1`, and there is at most
/// one supporting triple per hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathResult {
    pub path: Vec<String>,
    pub length: usize,
    pub supporting_triples: Vec<Triple>,
}

impl PathResult {
    fn from_ids(graph: &EntityGraph, ids: &[EntityId]) -> Self {
        Self {
            path: graph.names_of(ids),
            length: ids.len().saturating_sub(1),
            supporting_triples: graph.path_triples(ids),
        }
    }

    /// `"A → B → C"`.
    pub fn render(&self) -> String {
        self.path.join(" → ")
    }
}

/// Shortest directed path from `source` to `target`, all edges weight 1.
///
/// Returns `None` when either endpoint is absent or `target` is unreachable.
/// A path from an entity to itself is the zero-length path `[source]`.
pub fn shortest_path(graph: &EntityGraph, source: &str, target: &str) -> Option<PathResult> {
    let from = graph.entity_id(source)?;
    let to = graph.entity_id(target)?;
    if from == to {
        return Some(PathResult::from_ids(graph, &[from]));
    }

    let mut parent: HashMap<EntityId, EntityId> = HashMap::new();
    let mut seen: HashSet<EntityId> = HashSet::from([from]);
    let mut queue = VecDeque::from([from]);

    while let Some(node) = queue.pop_front() {
        for next in graph.successors(node) {
            if !seen.insert(next) {
                continue;
            }
            parent.insert(next, node);
            if next == to {
                let mut ids = vec![to];
                let mut cursor = to;
                while let Some(&prev) = parent.get(&cursor) {
                    ids.push(prev);
                    cursor = prev;
                }
                ids.reverse();
                return Some(PathResult::from_ids(graph, &ids));
            }
            queue.push_back(next);
        }
    }

    None
}

struct Frame {
    successors: Vec<EntityId>,
    cursor: usize,
}

/// Every simple directed path from `source` to `target` with at most
/// `max_length` edges, sorted ascending by length.
///
/// `max_length` is a hard bound: enumeration is exponential on dense graphs.
/// Unknown endpoints, `source == target`, or `max_length == 0` give no paths.
pub fn all_paths(
    graph: &EntityGraph,
    source: &str,
    target: &str,
    max_length: usize,
) -> Vec<PathResult> {
    let (Some(from), Some(to)) = (graph.entity_id(source), graph.entity_id(target)) else {
        return Vec::new();
    };
    if from == to || max_length == 0 {
        return Vec::new();
    }

    let mut found: Vec<PathResult> = Vec::new();
    let mut path: Vec<EntityId> = vec![from];
    let mut on_path: HashSet<EntityId> = HashSet::from([from]);
    let mut frames = vec![Frame {
        successors: graph.successors(from),
        cursor: 0,
    }];

    while let Some(frame) = frames.last_mut() {
        let Some(&next) = frame.successors.get(frame.cursor) else {
            frames.pop();
            if let Some(done) = path.pop() {
                on_path.remove(&done);
            }
            continue;
        };
        frame.cursor += 1;
        if on_path.contains(&next) {
            continue;
        }

        // `path.len()` edges once `next` is appended.
        let edges = path.len();
        if next == to {
            path.push(next);
            found.push(PathResult::from_ids(graph, &path));
            path.pop();
        } else if edges < max_length {
            path.push(next);
            on_path.insert(next);
            frames.push(Frame {
                successors: graph.successors(next),
                cursor: 0,
            });
        }
    }

    found.sort_by_key(|p| p.length);
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntityGraph {
        EntityGraph::build(&[
            Triple::new("A", "rel", "B").with_confidence(0.9),
            Triple::new("B", "rel", "C").with_confidence(0.8),
        ])
    }

    fn diamond() -> EntityGraph {
        EntityGraph::build(&[
            Triple::new("A", "r", "B"),
            Triple::new("B", "r", "D"),
            Triple::new("A", "r", "C"),
            Triple::new("C", "r", "E"),
            Triple::new("E", "r", "D"),
            Triple::new("D", "r", "A"),
        ])
    }

    #[test]
    fn shortest_path_through_chain() {
        let result = shortest_path(&sample(), "A", "C").unwrap();
        assert_eq!(result.path, vec!["A", "B", "C"]);
        assert_eq!(result.length, 2);
        assert_eq!(result.supporting_triples.len(), 2);
        assert_eq!(result.render(), "A → B → C");
    }

    #[test]
    fn shortest_path_is_directed() {
        assert!(shortest_path(&sample(), "C", "A").is_none());
        assert!(shortest_path(&sample(), "A", "Nowhere").is_none());
    }

    #[test]
    fn shortest_path_to_self_is_trivial() {
        let result = shortest_path(&sample(), "B", "B").unwrap();
        assert_eq!(result.path, vec!["B"]);
        assert_eq!(result.length, 0);
        assert!(result.supporting_triples.is_empty());
    }

    #[test]
    fn all_paths_sorted_and_bounded() {
        let graph = diamond();
        let paths = all_paths(&graph, "A", "D", 5);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].path, vec!["A", "B", "D"]);
        assert_eq!(paths[1].path, vec!["A", "C", "E", "D"]);

        let short = all_paths(&graph, "A", "D", 2);
        assert_eq!(short.len(), 1);
        assert!(short.iter().all(|p| p.length <= 2));
    }

    #[test]
    fn all_paths_never_repeat_nodes() {
        let graph = diamond();
        for p in all_paths(&graph, "A", "D", 10) {
            let unique: HashSet<&String> = p.path.iter().collect();
            assert_eq!(unique.len(), p.path.len());
            assert_eq!(p.length, p.path.len() - 1);
            assert!(p.supporting_triples.len() <= p.length);
        }
    }

    #[test]
    fn shortest_never_longer_than_enumerated() {
        let graph = diamond();
        let shortest = shortest_path(&graph, "A", "D").unwrap();
        for p in all_paths(&graph, "A", "D", 5) {
            assert!(shortest.length <= p.length);
        }
    }

    #[test]
    fn degenerate_all_paths_inputs() {
        let graph = diamond();
        assert!(all_paths(&graph, "A", "A", 5).is_empty());
        assert!(all_paths(&graph, "A", "D", 0).is_empty());
        assert!(all_paths(&graph, "A", "Z", 5).is_empty());
    }
}

//! Bounded-depth traversal over an [`EntityGraph`].
//!
//! Reachability ignores edge direction: a question may name an entity in
//! either triple position, so both successors and predecessors are followed.
//! Both traversals keep an explicit visited set and tolerate cycles.

use std::collections::{HashSet, VecDeque};

use super::Triple;
use super::index::{EntityGraph, EntityId, NeighborDirection};

/// Breadth-first traversal from `start`, up to `max_depth` hops (inclusive).
///
/// Returns entity names in visitation order, each at most once. An unknown
/// `start` yields an empty result; `max_depth == 0` yields only `start`.
pub fn bfs(graph: &EntityGraph, start: &str, max_depth: usize) -> Vec<String> {
    let Some(start_id) = graph.entity_id(start) else {
        return Vec::new();
    };

    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut queue: VecDeque<(EntityId, usize)> = VecDeque::new();
    let mut order = Vec::new();
    queue.push_back((start_id, 0));

    while let Some((node, depth)) = queue.pop_front() {
        if depth > max_depth || !visited.insert(node) {
            continue;
        }
        order.push(graph.entity_name(node).to_string());
        if depth == max_depth {
            continue;
        }
        for next in graph.neighbors(node, NeighborDirection::Both) {
            if !visited.contains(&next) {
                queue.push_back((next, depth + 1));
            }
        }
    }

    order
}

/// Depth-first traversal from `start`, up to `max_depth` hops (inclusive).
///
/// Iterative: neighbours are pushed in reverse so they pop in the same order
/// a recursive walk would visit them (successors before predecessors).
pub fn dfs(graph: &EntityGraph, start: &str, max_depth: usize) -> Vec<String> {
    let Some(start_id) = graph.entity_id(start) else {
        return Vec::new();
    };

    let mut visited: HashSet<EntityId> = HashSet::new();
    let mut stack: Vec<(EntityId, usize)> = vec![(start_id, 0)];
    let mut order = Vec::new();

    while let Some((node, depth)) = stack.pop() {
        if depth > max_depth || !visited.insert(node) {
            continue;
        }
        order.push(graph.entity_name(node).to_string());
        if depth == max_depth {
            continue;
        }
        let neighbors = graph.neighbors(node, NeighborDirection::Both);
        for &next in neighbors.iter().rev() {
            if !visited.contains(&next) {
                stack.push((next, depth + 1));
            }
        }
    }

    order
}

/// Distinct neighbours of `entity` in the given direction.
///
/// Unknown entities have no neighbours.
pub fn neighbors(graph: &EntityGraph, entity: &str, direction: NeighborDirection) -> Vec<String> {
    match graph.entity_id(entity) {
        Some(id) => graph.names_of(&graph.neighbors(id, direction)),
        None => Vec::new(),
    }
}

/// Every triple with `entity` as subject or object, in snapshot order.
pub fn entity_relations(graph: &EntityGraph, entity: &str) -> Vec<Triple> {
    if !graph.contains(entity) {
        return Vec::new();
    }
    graph
        .triples()
        .iter()
        .filter(|t| t.subject == entity || t.object == entity)
        .cloned()
        .collect()
}

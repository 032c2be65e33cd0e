//! Entity-indexed directed multigraph.
//!
//! Uses `petgraph` for the graph structure and a bidirectional name ↔ id index.
//! An [`EntityGraph`] is immutable once built: a new triple set means a new
//! graph, produced by [`EntityGraph::build`] and published through a
//! [`GraphHandle`] by swapping an `Arc`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use super::{EdgeData, Triple};

/// Dense integer identity of an entity within one build.
///
/// Ids are issued in first-seen order starting at zero and double as petgraph
/// node indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn node(self) -> NodeIndex {
        NodeIndex::new(self.index())
    }

    fn from_node(node: NodeIndex) -> Self {
        EntityId(node.index() as u32)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ent:{}", self.0)
    }
}

/// Edge-following direction for neighbourhood queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborDirection {
    Outgoing,
    Incoming,
    Both,
}

/// Accumulates entities and edges for a single build.
///
/// `entity_id` creates-or-fetches, so ids are stable for the builder's lifetime.
#[derive(Debug, Default)]
pub struct EntityGraphBuilder {
    graph: DiGraph<EntityId, EdgeData>,
    names: Vec<String>,
    ids: HashMap<String, EntityId>,
}

impl EntityGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `name`, issuing the next dense id if it is new.
    pub fn entity_id(&mut self, name: &str) -> EntityId {
        if let Some(&id) = self.ids.get(name) {
            return id;
        }
        let id = EntityId(self.names.len() as u32);
        let node = self.graph.add_node(id);
        debug_assert_eq!(node.index(), id.index(), "entity ids must track node indices");
        self.names.push(name.to_string());
        self.ids.insert(name.to_string(), id);
        id
    }

    /// Add one edge for the triple at `triple_index`. Duplicates are kept.
    pub fn add_triple(&mut self, triple_index: usize, triple: &Triple) {
        let subject = self.entity_id(&triple.subject);
        let object = self.entity_id(&triple.object);
        self.graph.add_edge(
            subject.node(),
            object.node(),
            EdgeData {
                predicate: triple.predicate.clone(),
                triple_index,
            },
        );
    }

    /// Seal the builder into a graph that owns `triples` as its snapshot.
    pub fn finish(self, triples: Arc<[Triple]>) -> EntityGraph {
        EntityGraph {
            graph: self.graph,
            names: self.names,
            ids: self.ids,
            triples,
        }
    }
}

/// Directed multigraph over entity strings, built from one triple snapshot.
///
/// Nodes are unique entity names, edges are one per triple. Every edge carries
/// the index of its source triple in [`EntityGraph::triples`].
pub struct EntityGraph {
    graph: DiGraph<EntityId, EdgeData>,
    names: Vec<String>,
    ids: HashMap<String, EntityId>,
    triples: Arc<[Triple]>,
}

impl EntityGraph {
    /// Create an empty graph.
    pub fn empty() -> Self {
        EntityGraphBuilder::new().finish(Arc::from(Vec::new()))
    }

    /// Build a fresh graph from `triples`.
    ///
    /// The triples are copied into an immutable snapshot; the result reflects
    /// exactly the triples passed in.
    pub fn build(triples: &[Triple]) -> Self {
        let snapshot: Arc<[Triple]> = Arc::from(triples.to_vec());
        let mut builder = EntityGraphBuilder::new();
        for (index, triple) in snapshot.iter().enumerate() {
            builder.add_triple(index, triple);
        }
        builder.finish(snapshot)
    }

    /// Look up the id of an entity name.
    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.ids.get(name).copied()
    }

    /// Name of an entity this graph issued.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph; that is a caller bug.
    pub fn entity_name(&self, id: EntityId) -> &str {
        &self.names[id.index()]
    }

    /// Name of the entity with dense index `index`.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ids.contains_key(name)
    }

    /// All entity names in id order.
    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// All entity ids in order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.names.len() as u32).map(EntityId)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// The triple snapshot this graph was built from.
    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn triple(&self, index: usize) -> Option<&Triple> {
        self.triples.get(index)
    }

    pub(crate) fn petgraph(&self) -> &DiGraph<EntityId, EdgeData> {
        &self.graph
    }

    /// Edges leaving (or entering) `id` as `(other end, triple index)`, in
    /// triple order.
    pub fn edges(&self, id: EntityId, direction: Direction) -> Vec<(EntityId, usize)> {
        let mut edges: Vec<(EntityId, usize)> = self
            .graph
            .edges_directed(id.node(), direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (EntityId::from_node(other), e.weight().triple_index)
            })
            .collect();
        // petgraph yields the most recent edge first.
        edges.sort_by_key(|&(_, triple_index)| triple_index);
        edges
    }

    /// Distinct successors of `id`, in the order their first edge was added.
    pub fn successors(&self, id: EntityId) -> Vec<EntityId> {
        dedup_ids(self.edges(id, Direction::Outgoing).into_iter().map(|(n, _)| n))
    }

    /// Distinct predecessors of `id`, in the order their first edge was added.
    pub fn predecessors(&self, id: EntityId) -> Vec<EntityId> {
        dedup_ids(self.edges(id, Direction::Incoming).into_iter().map(|(n, _)| n))
    }

    /// Distinct neighbours in the requested direction; for `Both`, successors
    /// come first, then predecessors not already listed.
    pub fn neighbors(&self, id: EntityId, direction: NeighborDirection) -> Vec<EntityId> {
        match direction {
            NeighborDirection::Outgoing => self.successors(id),
            NeighborDirection::Incoming => self.predecessors(id),
            NeighborDirection::Both => dedup_ids(
                self.successors(id)
                    .into_iter()
                    .chain(self.predecessors(id)),
            ),
        }
    }

    /// The first triple (lowest snapshot index) stating `from → to`.
    pub fn first_triple_between(&self, from: EntityId, to: EntityId) -> Option<&Triple> {
        self.graph
            .edges_connecting(from.node(), to.node())
            .map(|e| e.weight().triple_index)
            .min()
            .and_then(|index| self.triples.get(index))
    }

    /// Total in + out edge count for `id`, counting parallel edges.
    pub fn degree(&self, id: EntityId) -> usize {
        self.in_degree(id) + self.out_degree(id)
    }

    pub fn in_degree(&self, id: EntityId) -> usize {
        self.graph.edges_directed(id.node(), Direction::Incoming).count()
    }

    pub fn out_degree(&self, id: EntityId) -> usize {
        self.graph.edges_directed(id.node(), Direction::Outgoing).count()
    }

    /// Resolve a sequence of ids to names.
    pub fn names_of(&self, ids: &[EntityId]) -> Vec<String> {
        ids.iter().map(|&id| self.entity_name(id).to_string()).collect()
    }

    /// The per-hop supporting triples of a directed path: the first triple for
    /// each consecutive pair that has one.
    pub fn path_triples(&self, path: &[EntityId]) -> Vec<Triple> {
        path.windows(2)
            .filter_map(|pair| self.first_triple_between(pair[0], pair[1]))
            .cloned()
            .collect()
    }
}

impl Default for EntityGraph {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for EntityGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityGraph")
            .field("entities", &self.node_count())
            .field("edges", &self.edge_count())
            .finish()
    }
}

fn dedup_ids(ids: impl Iterator<Item = EntityId>) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.filter(|id| seen.insert(*id)).collect()
}

/// Shared, swappable reference to the current [`EntityGraph`].
///
/// Readers take an `Arc` snapshot and keep using it for the whole query;
/// rebuilds construct a fresh graph outside the lock and swap it in, so no
/// reader can observe a half-built graph.
#[derive(Debug, Default)]
pub struct GraphHandle {
    current: RwLock<Arc<EntityGraph>>,
}

impl GraphHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The graph as of now.
    pub fn snapshot(&self) -> Arc<EntityGraph> {
        // The guarded value is a whole Arc, so a poisoned lock still holds a
        // complete graph.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Rebuild from `triples` unconditionally and publish the result.
    pub fn rebuild(&self, triples: &[Triple]) -> Arc<EntityGraph> {
        let fresh = Arc::new(EntityGraph::build(triples));
        tracing::info!(
            entities = fresh.node_count(),
            edges = fresh.edge_count(),
            "entity graph rebuilt"
        );
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&fresh);
        fresh
    }

    /// Return the current graph if it was built from exactly `triples`,
    /// otherwise rebuild.
    pub fn refresh(&self, triples: &[Triple]) -> Arc<EntityGraph> {
        let current = self.snapshot();
        if current.triples() == triples {
            tracing::debug!(triples = triples.len(), "entity graph up to date");
            return current;
        }
        self.rebuild(triples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<Triple> {
        vec![
            Triple::new("A", "rel", "B").with_confidence(0.9),
            Triple::new("B", "rel", "C").with_confidence(0.8),
        ]
    }

    #[test]
    fn ids_are_dense_and_round_trip() {
        let graph = EntityGraph::build(&chain());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        for name in ["A", "B", "C"] {
            let id = graph.entity_id(name).unwrap();
            assert_eq!(graph.entity_name(id), name);
        }
        assert_eq!(graph.entity_id("A").unwrap().index(), 0);
        assert_eq!(graph.entity_id("C").unwrap().index(), 2);
        assert!(graph.entity_id("Z").is_none());
    }

    #[test]
    fn builder_entity_id_is_idempotent() {
        let mut builder = EntityGraphBuilder::new();
        let first = builder.entity_id("Sun");
        let other = builder.entity_id("Moon");
        assert_eq!(builder.entity_id("Sun"), first);
        assert_ne!(first, other);
    }

    #[test]
    fn duplicate_triples_become_parallel_edges() {
        let triples = vec![
            Triple::new("A", "rel", "B"),
            Triple::new("A", "rel", "B"),
        ];
        let graph = EntityGraph::build(&triples);
        assert_eq!(graph.edge_count(), 2);
        let a = graph.entity_id("A").unwrap();
        let b = graph.entity_id("B").unwrap();
        assert_eq!(graph.successors(a), vec![b]);
        assert_eq!(graph.out_degree(a), 2);
        let indices: Vec<usize> = graph
            .edges(a, Direction::Outgoing)
            .into_iter()
            .map(|(_, i)| i)
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn first_triple_between_prefers_lowest_index() {
        let triples = vec![
            Triple::new("A", "first", "B"),
            Triple::new("A", "second", "B"),
        ];
        let graph = EntityGraph::build(&triples);
        let a = graph.entity_id("A").unwrap();
        let b = graph.entity_id("B").unwrap();
        assert_eq!(graph.first_triple_between(a, b).unwrap().predicate, "first");
        assert!(graph.first_triple_between(b, a).is_none());
    }

    #[test]
    fn rebuild_is_deterministic() {
        let triples = vec![
            Triple::new("X", "r", "Y"),
            Triple::new("Y", "r", "Z"),
            Triple::new("Z", "r", "X"),
            Triple::new("X", "s", "Z"),
        ];
        let g1 = EntityGraph::build(&triples);
        let g2 = EntityGraph::build(&triples);
        assert_eq!(g1.entities().collect::<Vec<_>>(), g2.entities().collect::<Vec<_>>());
        for id in g1.entity_ids() {
            assert_eq!(
                g1.edges(id, Direction::Outgoing),
                g2.edges(id, Direction::Outgoing)
            );
        }
    }

    #[test]
    fn neighbors_both_lists_successors_first() {
        let triples = vec![
            Triple::new("A", "r", "B"),
            Triple::new("C", "r", "B"),
            Triple::new("B", "r", "D"),
        ];
        let graph = EntityGraph::build(&triples);
        let b = graph.entity_id("B").unwrap();
        let names = graph.names_of(&graph.neighbors(b, NeighborDirection::Both));
        assert_eq!(names, vec!["D", "A", "C"]);
    }

    #[test]
    fn handle_refresh_reuses_identical_snapshot() {
        let handle = GraphHandle::new();
        assert!(handle.snapshot().is_empty());

        let first = handle.refresh(&chain());
        let second = handle.refresh(&chain());
        assert!(Arc::ptr_eq(&first, &second));

        let mut changed = chain();
        changed.push(Triple::new("C", "rel", "D"));
        let third = handle.refresh(&changed);
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(third.node_count(), 4);
        // Readers holding the old snapshot are unaffected.
        assert_eq!(first.node_count(), 3);
    }
}

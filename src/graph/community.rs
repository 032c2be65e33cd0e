//! Community detection over the undirected view of an [`EntityGraph`].
//!
//! Modularity optimisation (Louvain local moving + aggregation), with nodes
//! visited in id order so the partition is reproducible. When modularity
//! optimisation cannot run, connected components are reported instead.
//!
//! ## Modularity gain
//!
//! Moving node `i` into community `c` changes modularity in proportion to
//!
//! ```text
//! k_i,in(c) - tot(c) * k_i / 2m
//! ```
//!
//! where `k_i,in(c)` is the edge weight from `i` into `c`, `tot(c)` the total
//! degree of `c`, `k_i` the degree of `i` and `m` the total edge weight.

use std::collections::{BTreeMap, HashMap};

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;

use super::index::{EntityGraph, NeighborDirection};

/// Local-moving passes per level before giving up on further improvement.
const MAX_PASSES: usize = 100;
const GAIN_EPSILON: f64 = 1e-12;

/// How a partition was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunityMethod {
    Modularity,
    ConnectedComponents,
}

/// One community: sorted member names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    /// 1-based, in output order.
    pub id: usize,
    pub members: Vec<String>,
}

/// A partition of every entity into communities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityPartition {
    pub method: CommunityMethod,
    /// Largest first; equal sizes ordered by first member.
    pub communities: Vec<Community>,
}

impl CommunityPartition {
    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }

    /// The community containing `entity`, if any.
    pub fn community_of(&self, entity: &str) -> Option<&Community> {
        self.communities
            .iter()
            .find(|c| c.members.binary_search_by(|m| m.as_str().cmp(entity)).is_ok())
    }
}

/// Partition the graph, falling back to connected components when modularity
/// optimisation fails.
pub fn detect(graph: &EntityGraph) -> CommunityPartition {
    if graph.is_empty() {
        return CommunityPartition {
            method: CommunityMethod::Modularity,
            communities: Vec::new(),
        };
    }
    match modularity_communities(graph) {
        Ok(groups) => build_partition(graph, CommunityMethod::Modularity, groups),
        Err(err) => {
            tracing::warn!(error = %err, "modularity communities unavailable, using connected components");
            build_partition(
                graph,
                CommunityMethod::ConnectedComponents,
                connected_components(graph),
            )
        }
    }
}

fn build_partition(
    graph: &EntityGraph,
    method: CommunityMethod,
    groups: Vec<Vec<usize>>,
) -> CommunityPartition {
    let mut named: Vec<Vec<String>> = groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| {
            let mut members: Vec<String> = g
                .into_iter()
                .filter_map(|i| graph.name_at(i).map(str::to_string))
                .collect();
            members.sort();
            members
        })
        .collect();
    named.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

    CommunityPartition {
        method,
        communities: named
            .into_iter()
            .enumerate()
            .map(|(i, members)| Community { id: i + 1, members })
            .collect(),
    }
}

/// Connected components of the undirected view, as entity indices.
pub fn connected_components(graph: &EntityGraph) -> Vec<Vec<usize>> {
    let n = graph.node_count();
    let mut sets = UnionFind::<usize>::new(n);
    for id in graph.entity_ids() {
        for next in graph.successors(id) {
            sets.union(id.index(), next.index());
        }
    }
    let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..n {
        by_root.entry(sets.find(i)).or_default().push(i);
    }
    by_root.into_values().collect()
}

// ---------------------------------------------------------------------------
// Louvain
// ---------------------------------------------------------------------------

/// Weighted undirected graph at one aggregation level.
struct Level {
    /// Neighbour lists without self loops; each undirected edge appears in
    /// both endpoints' lists.
    adj: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
}

impl Level {
    fn from_graph(graph: &EntityGraph) -> Self {
        let adj = graph
            .entity_ids()
            .map(|id| {
                graph
                    .neighbors(id, NeighborDirection::Both)
                    .into_iter()
                    .filter(|&other| other != id)
                    .map(|other| (other.index(), 1.0))
                    .collect()
            })
            .collect();
        Self {
            adj,
            self_loops: vec![0.0; graph.node_count()],
        }
    }

    fn len(&self) -> usize {
        self.adj.len()
    }

    fn degree(&self, i: usize) -> f64 {
        self.adj[i].iter().map(|&(_, w)| w).sum::<f64>() + 2.0 * self.self_loops[i]
    }

    /// Collapse each community into one node.
    fn aggregate(&self, labels: &[usize], count: usize) -> Self {
        let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut self_loops = vec![0.0; count];
        for (i, neighbors) in self.adj.iter().enumerate() {
            let ci = labels[i];
            self_loops[ci] += self.self_loops[i];
            for &(j, w) in neighbors {
                let cj = labels[j];
                if ci == cj {
                    // Seen once from each endpoint.
                    self_loops[ci] += w / 2.0;
                } else {
                    *links[ci].entry(cj).or_insert(0.0) += w;
                }
            }
        }
        Self {
            adj: links.into_iter().map(|m| m.into_iter().collect()).collect(),
            self_loops,
        }
    }
}

/// Louvain communities as groups of entity indices.
pub fn modularity_communities(graph: &EntityGraph) -> Result<Vec<Vec<usize>>, GraphError> {
    let mut level = Level::from_graph(graph);
    let n = level.len();
    let two_m: f64 = (0..n).map(|i| level.degree(i)).sum();
    if two_m <= 0.0 {
        return Err(GraphError::CommunityDetection {
            message: "graph has no edges between distinct entities".into(),
        });
    }

    // Original entity index -> node at the current level.
    let mut membership: Vec<usize> = (0..n).collect();

    loop {
        let (assignment, moved) = local_moving(&level, two_m);
        if !moved {
            break;
        }
        let (labels, count) = relabel(&assignment);
        for m in membership.iter_mut() {
            *m = labels[*m];
        }
        if count == level.len() {
            break;
        }
        level = level.aggregate(&labels, count);
    }

    let groups_count = membership.iter().copied().max().map_or(0, |m| m + 1);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); groups_count];
    for (entity, &group) in membership.iter().enumerate() {
        groups[group].push(entity);
    }
    Ok(groups)
}

/// Greedy node moves until a full pass changes nothing.
fn local_moving(level: &Level, two_m: f64) -> (Vec<usize>, bool) {
    let n = level.len();
    let degrees: Vec<f64> = (0..n).map(|i| level.degree(i)).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut totals = degrees.clone();
    let mut moved_any = false;

    for _ in 0..MAX_PASSES {
        let mut moved = false;
        for i in 0..n {
            let current = community[i];
            let k_i = degrees[i];

            // Edge weight from `i` into each neighbouring community, in
            // first-seen order.
            let mut order: Vec<usize> = Vec::new();
            let mut weight: HashMap<usize, f64> = HashMap::new();
            for &(j, w) in &level.adj[i] {
                let c = community[j];
                let entry = weight.entry(c).or_insert_with(|| {
                    order.push(c);
                    0.0
                });
                *entry += w;
            }

            totals[current] -= k_i;
            let gain = |c: usize| weight.get(&c).copied().unwrap_or(0.0) - totals[c] * k_i / two_m;

            let mut best = current;
            let mut best_gain = gain(current);
            for &c in &order {
                let g = gain(c);
                if g > best_gain + GAIN_EPSILON {
                    best = c;
                    best_gain = g;
                }
            }

            totals[best] += k_i;
            if best != current {
                community[i] = best;
                moved = true;
                moved_any = true;
            }
        }
        if !moved {
            break;
        }
    }

    (community, moved_any)
}

/// Renumber community labels densely in first-seen order.
fn relabel(assignment: &[usize]) -> (Vec<usize>, usize) {
    let mut map: HashMap<usize, usize> = HashMap::new();
    let labels = assignment
        .iter()
        .map(|&c| {
            let next = map.len();
            *map.entry(c).or_insert(next)
        })
        .collect();
    (labels, map.len())
}

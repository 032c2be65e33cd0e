//! Graph analytics: centrality rankings and whole-graph structure reports.
//!
//! Scores are always computed over the full current graph. Path-based
//! metrics (betweenness, closeness, PageRank) use the simple view of the
//! multigraph, where parallel edges count once; degree metrics count every
//! edge.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

use petgraph::algo::{connected_components, tarjan_scc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::CentralityConfig;
use crate::error::GraphError;

use super::community::{self, CommunityPartition};
use super::index::{EntityGraph, EntityId, NeighborDirection};

/// Sources handled per rayon task. Fixed so partial sums combine in the same
/// order on every run.
const SOURCES_PER_TASK: usize = 32;

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// A supported centrality metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CentralityMetric {
    Degree,
    InDegree,
    OutDegree,
    Betweenness,
    Closeness,
    #[serde(rename = "pagerank")]
    PageRank,
}

impl CentralityMetric {
    pub const ALL: [CentralityMetric; 6] = [
        CentralityMetric::Degree,
        CentralityMetric::InDegree,
        CentralityMetric::OutDegree,
        CentralityMetric::Betweenness,
        CentralityMetric::Closeness,
        CentralityMetric::PageRank,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CentralityMetric::Degree => "degree",
            CentralityMetric::InDegree => "in_degree",
            CentralityMetric::OutDegree => "out_degree",
            CentralityMetric::Betweenness => "betweenness",
            CentralityMetric::Closeness => "closeness",
            CentralityMetric::PageRank => "pagerank",
        }
    }
}

impl fmt::Display for CentralityMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CentralityMetric {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CentralityMetric::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| GraphError::UnsupportedMetric {
                metric: s.to_string(),
            })
    }
}

/// One entity's position in a centrality ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityScore {
    pub entity: String,
    /// Rounded to four decimal places.
    pub score: f64,
    /// 1-based; ties keep entity order.
    pub rank: usize,
    pub metric: CentralityMetric,
}

/// A full ranking plus which metric actually produced it.
///
/// `used` differs from `requested` only when PageRank failed and degree
/// centrality was reported instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralityReport {
    pub requested: CentralityMetric,
    pub used: CentralityMetric,
    pub scores: Vec<CentralityScore>,
}

impl CentralityReport {
    pub fn fell_back(&self) -> bool {
        self.requested != self.used
    }

    pub fn top(&self, n: usize) -> &[CentralityScore] {
        &self.scores[..n.min(self.scores.len())]
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Centrality, community, and structure analysis over one graph snapshot.
pub struct CentralityAnalyzer<'g> {
    graph: &'g EntityGraph,
    config: CentralityConfig,
}

impl<'g> CentralityAnalyzer<'g> {
    pub fn new(graph: &'g EntityGraph, config: CentralityConfig) -> Self {
        Self { graph, config }
    }

    /// Rank every entity by `metric`.
    ///
    /// PageRank that fails to converge falls back to degree centrality; the
    /// report's `used` field records this.
    pub fn centrality(&self, metric: CentralityMetric) -> CentralityReport {
        let (used, raw) = match metric {
            CentralityMetric::Degree => (metric, degree_scores(self.graph, NeighborDirection::Both)),
            CentralityMetric::InDegree => {
                (metric, degree_scores(self.graph, NeighborDirection::Incoming))
            }
            CentralityMetric::OutDegree => {
                (metric, degree_scores(self.graph, NeighborDirection::Outgoing))
            }
            CentralityMetric::Betweenness => (metric, betweenness_scores(self.graph)),
            CentralityMetric::Closeness => (metric, closeness_scores(self.graph)),
            CentralityMetric::PageRank => match pagerank_scores(self.graph, &self.config) {
                Ok(scores) => (metric, scores),
                Err(err) => {
                    tracing::warn!(error = %err, "pagerank unavailable, using degree centrality");
                    (
                        CentralityMetric::Degree,
                        degree_scores(self.graph, NeighborDirection::Both),
                    )
                }
            },
        };

        CentralityReport {
            requested: metric,
            used,
            scores: rank(self.graph, used, &raw),
        }
    }

    /// Rank by a metric name such as `"pagerank"`.
    pub fn centrality_by_name(&self, metric: &str) -> Result<CentralityReport, GraphError> {
        Ok(self.centrality(metric.parse()?))
    }

    /// Community partition of the undirected view.
    pub fn communities(&self) -> CommunityPartition {
        community::detect(self.graph)
    }

    /// Whole-graph structure report; an empty graph yields [`GraphAnalysis::Empty`].
    pub fn analyze_structure(&self) -> GraphAnalysis {
        let graph = self.graph;
        let n = graph.node_count();
        if n == 0 {
            return GraphAnalysis::Empty;
        }
        let edges = graph.edge_count();

        let density = if n > 1 {
            edges as f64 / (n * (n - 1)) as f64
        } else {
            0.0
        };
        let strong_components = tarjan_scc(graph.petgraph()).len();
        let weak_components = connected_components(graph.petgraph());
        let weakly_connected = weak_components == 1;

        let top_n = self.config.top_n;
        let top = |metric| self.centrality(metric).top(top_n).to_vec();

        GraphAnalysis::Analyzed(StructureReport {
            node_count: n,
            edge_count: edges,
            density: round4(density),
            strongly_connected: strong_components == 1,
            weakly_connected,
            strong_component_count: strong_components,
            weak_component_count: weak_components,
            average_path_length: if weakly_connected {
                average_path_length(graph).map(round4)
            } else {
                None
            },
            average_clustering: round4(average_clustering(graph)),
            top_degree: top(CentralityMetric::Degree),
            top_betweenness: top(CentralityMetric::Betweenness),
            top_pagerank: top(CentralityMetric::PageRank),
        })
    }
}

/// Outcome of a structure analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GraphAnalysis {
    /// The graph has no entities; there is nothing to measure.
    Empty,
    Analyzed(StructureReport),
}

impl GraphAnalysis {
    pub fn report(&self) -> Option<&StructureReport> {
        match self {
            GraphAnalysis::Empty => None,
            GraphAnalysis::Analyzed(report) => Some(report),
        }
    }
}

/// Basic statistics, connectivity, path features and centrality leaders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    pub node_count: usize,
    pub edge_count: usize,
    /// `edges / (n * (n - 1))`.
    pub density: f64,
    pub strongly_connected: bool,
    pub weakly_connected: bool,
    pub strong_component_count: usize,
    pub weak_component_count: usize,
    /// Mean undirected shortest-path length; only for weakly connected graphs.
    pub average_path_length: Option<f64>,
    pub average_clustering: f64,
    pub top_degree: Vec<CentralityScore>,
    pub top_betweenness: Vec<CentralityScore>,
    pub top_pagerank: Vec<CentralityScore>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

fn rank(graph: &EntityGraph, metric: CentralityMetric, raw: &[f64]) -> Vec<CentralityScore> {
    let mut scores: Vec<CentralityScore> = graph
        .entity_ids()
        .map(|id| CentralityScore {
            entity: graph.entity_name(id).to_string(),
            score: round4(raw[id.index()]),
            rank: 0,
            metric,
        })
        .collect();
    // Stable: equal scores keep entity order.
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    for (i, score) in scores.iter_mut().enumerate() {
        score.rank = i + 1;
    }
    scores
}

/// Raw edge counts per entity, parallel edges included.
pub fn degree_scores(graph: &EntityGraph, direction: NeighborDirection) -> Vec<f64> {
    graph
        .entity_ids()
        .map(|id| {
            let degree = match direction {
                NeighborDirection::Outgoing => graph.out_degree(id),
                NeighborDirection::Incoming => graph.in_degree(id),
                NeighborDirection::Both => graph.degree(id),
            };
            degree as f64
        })
        .collect()
}

/// Simple-graph adjacency lists, indexed by entity id.
fn adjacency(graph: &EntityGraph, direction: NeighborDirection) -> Vec<Vec<usize>> {
    graph
        .entity_ids()
        .map(|id| {
            graph
                .neighbors(id, direction)
                .into_iter()
                .map(EntityId::index)
                .filter(|&other| other != id.index())
                .collect()
        })
        .collect()
}

/// Unweighted BFS distances from `source`; `usize::MAX` marks unreachable.
fn bfs_distances(adj: &[Vec<usize>], source: usize) -> Vec<usize> {
    let mut dist = vec![usize::MAX; adj.len()];
    dist[source] = 0;
    let mut queue = VecDeque::from([source]);
    while let Some(v) = queue.pop_front() {
        for &w in &adj[v] {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
        }
    }
    dist
}

/// Brandes betweenness on the directed simple view, normalized by
/// `(n - 1)(n - 2)`.
pub fn betweenness_scores(graph: &EntityGraph) -> Vec<f64> {
    let n = graph.node_count();
    if n < 3 {
        return vec![0.0; n];
    }
    let adj = adjacency(graph, NeighborDirection::Outgoing);
    let sources: Vec<usize> = (0..n).collect();

    let partials: Vec<Vec<f64>> = sources
        .par_chunks(SOURCES_PER_TASK)
        .map(|chunk| {
            let mut acc = vec![0.0_f64; n];
            for &s in chunk {
                accumulate_dependencies(&adj, s, &mut acc);
            }
            acc
        })
        .collect();

    let mut betweenness = vec![0.0_f64; n];
    for partial in partials {
        for (b, p) in betweenness.iter_mut().zip(partial) {
            *b += p;
        }
    }

    let norm = ((n - 1) * (n - 2)) as f64;
    for b in &mut betweenness {
        *b /= norm;
    }
    betweenness
}

/// One Brandes source pass: BFS counting shortest paths, then dependency
/// accumulation in reverse BFS order.
fn accumulate_dependencies(adj: &[Vec<usize>], s: usize, acc: &mut [f64]) {
    let n = adj.len();
    let mut sigma = vec![0.0_f64; n];
    let mut dist = vec![usize::MAX; n];
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut order = Vec::with_capacity(n);

    sigma[s] = 1.0;
    dist[s] = 0;
    let mut queue = VecDeque::from([s]);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &w in &adj[v] {
            if dist[w] == usize::MAX {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0_f64; n];
    for &w in order.iter().rev() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != s {
            acc[w] += delta[w];
        }
    }
}

/// Closeness over incoming distances, scaled by the reachable fraction
/// (Wasserman–Faust), so entities reached by few others score low.
pub fn closeness_scores(graph: &EntityGraph) -> Vec<f64> {
    let n = graph.node_count();
    if n < 2 {
        return vec![0.0; n];
    }
    let reverse = adjacency(graph, NeighborDirection::Incoming);
    (0..n)
        .into_par_iter()
        .map(|v| {
            let dist = bfs_distances(&reverse, v);
            let (reached, total) = dist
                .iter()
                .filter(|&&d| d != usize::MAX)
                .fold((0usize, 0usize), |(r, t), &d| (r + 1, t + d));
            if total == 0 {
                return 0.0;
            }
            let others = (reached - 1) as f64;
            (others / total as f64) * (others / (n - 1) as f64)
        })
        .collect()
}

/// PageRank by power iteration with uniform teleport and uniform
/// redistribution of dangling mass.
///
/// Converges when the L1 change drops below `n * tolerance`; otherwise
/// returns [`GraphError::PageRankDivergence`].
pub fn pagerank_scores(
    graph: &EntityGraph,
    config: &CentralityConfig,
) -> Result<Vec<f64>, GraphError> {
    let n = graph.node_count();
    if n == 0 {
        return Ok(Vec::new());
    }
    let adj = adjacency(graph, NeighborDirection::Outgoing);
    let n_f64 = n as f64;
    let d = config.damping;
    let teleport = (1.0 - d) / n_f64;

    let mut scores = vec![1.0 / n_f64; n];
    let mut next = vec![0.0_f64; n];
    let mut residual = f64::INFINITY;

    for _ in 0..config.max_iterations {
        let dangling: f64 = adj
            .iter()
            .zip(&scores)
            .filter(|(out, _)| out.is_empty())
            .map(|(_, s)| s)
            .sum();
        next.fill(teleport + d * dangling / n_f64);

        for (u, out) in adj.iter().enumerate() {
            if out.is_empty() {
                continue;
            }
            let share = d * scores[u] / out.len() as f64;
            for &v in out {
                next[v] += share;
            }
        }

        residual = scores
            .iter()
            .zip(&next)
            .map(|(old, new)| (old - new).abs())
            .sum();
        std::mem::swap(&mut scores, &mut next);

        if residual.is_nan() {
            break;
        }
        if residual < n_f64 * config.tolerance {
            return Ok(scores);
        }
    }

    Err(GraphError::PageRankDivergence {
        iterations: config.max_iterations,
        residual,
    })
}

/// Mean shortest-path length over all ordered pairs of the undirected view.
fn average_path_length(graph: &EntityGraph) -> Option<f64> {
    let n = graph.node_count();
    if n < 2 {
        return None;
    }
    let adj = adjacency(graph, NeighborDirection::Both);
    let total: usize = (0..n)
        .into_par_iter()
        .map(|s| {
            bfs_distances(&adj, s)
                .into_iter()
                .filter(|&d| d != usize::MAX)
                .sum::<usize>()
        })
        .sum();
    Some(total as f64 / (n * (n - 1)) as f64)
}

/// Mean local clustering coefficient of the undirected simple view.
fn average_clustering(graph: &EntityGraph) -> f64 {
    let n = graph.node_count();
    if n == 0 {
        return 0.0;
    }
    let adj = adjacency(graph, NeighborDirection::Both);
    let sets: Vec<HashSet<usize>> =
        adj.iter().map(|a| a.iter().copied().collect()).collect();

    let total: f64 = adj
        .iter()
        .map(|neighbors| {
            let k = neighbors.len();
            if k < 2 {
                return 0.0;
            }
            let mut links = 0usize;
            for (i, &a) in neighbors.iter().enumerate() {
                for &b in &neighbors[i + 1..] {
                    if sets[a].contains(&b) {
                        links += 1;
                    }
                }
            }
            2.0 * links as f64 / (k * (k - 1)) as f64
        })
        .sum();
    total / n as f64
}

//! Multi-step reasoning chains (`A → B → C`) and the graph-only query.
//!
//! A chain is a simple path rooted at a start entity, enumerated with an
//! explicit stack and a per-path visited set. Each chain is rendered into an
//! explanation, the triples backing its hops, and a heuristic confidence.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{CentralityConfig, ReasoningConfig};
use crate::graph::Triple;
use crate::graph::analytics::{CentralityAnalyzer, CentralityMetric};
use crate::graph::index::{EntityGraph, EntityId, NeighborDirection};

use super::intent::mentioned_entities;
use super::{ReasoningMethod, ReasoningResult, round3};

/// Which edges a chain may follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainDirection {
    /// Only along declared edge direction.
    #[default]
    Forward,
    /// Along or against edges; a reversed hop's predicate is shown as `^p`.
    Both,
}

/// An ordered sequence of at least two connected entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReasoningChain {
    entities: Vec<EntityId>,
}

impl ReasoningChain {
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of hops.
    pub fn depth(&self) -> usize {
        self.entities.len().saturating_sub(1)
    }
}

/// Heuristic confidence of a chain with `length` entities and `supporting`
/// distinct backing triples: `1 / length + 0.1 * supporting`, clamped to
/// [0, 1] and rounded to three places.
///
/// Not a probability. Shorter, better-backed chains simply score higher.
pub fn chain_confidence(length: usize, supporting: usize) -> f64 {
    if length < 2 {
        return 0.0;
    }
    let base = 1.0 / length as f64 + 0.1 * supporting as f64;
    round3(base.clamp(0.0, 1.0))
}

struct Frame {
    next: Vec<EntityId>,
    cursor: usize,
}

/// Derives and scores reasoning chains over one graph snapshot.
pub struct ChainReasoner<'g> {
    graph: &'g EntityGraph,
    config: &'g ReasoningConfig,
    centrality: CentralityConfig,
}

impl<'g> ChainReasoner<'g> {
    pub fn new(graph: &'g EntityGraph, config: &'g ReasoningConfig) -> Self {
        Self {
            graph,
            config,
            centrality: CentralityConfig::default(),
        }
    }

    /// Use `centrality` for the notable-entity padding.
    pub fn with_centrality(mut self, centrality: CentralityConfig) -> Self {
        self.centrality = centrality;
        self
    }

    fn step(&self, id: EntityId) -> Vec<EntityId> {
        match self.config.chain_direction {
            ChainDirection::Forward => self.graph.successors(id),
            ChainDirection::Both => self.graph.neighbors(id, NeighborDirection::Both),
        }
    }

    /// All chains of 2..=`max_depth + 1` entities rooted at `start`, in
    /// depth-first discovery order, deduplicated by entity sequence.
    pub fn chains_from(&self, start: &str, max_depth: usize) -> Vec<ReasoningChain> {
        let Some(root) = self.graph.entity_id(start) else {
            return Vec::new();
        };
        if max_depth == 0 {
            return Vec::new();
        }
        let cap = self.config.max_chains_per_entity.unwrap_or(usize::MAX);

        let mut chains = Vec::new();
        let mut seen: HashSet<Vec<EntityId>> = HashSet::new();
        let mut path = vec![root];
        let mut on_path: HashSet<EntityId> = HashSet::from([root]);
        let mut frames = vec![Frame {
            next: self.step(root),
            cursor: 0,
        }];

        while let Some(frame) = frames.last_mut() {
            if chains.len() >= cap {
                tracing::debug!(start, cap, "chain enumeration capped");
                break;
            }
            let Some(&next) = frame.next.get(frame.cursor) else {
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

            path.push(next);
            on_path.insert(next);
            if seen.insert(path.clone()) {
                chains.push(ReasoningChain {
                    entities: path.clone(),
                });
            }
            if path.len() < max_depth + 1 {
                frames.push(Frame {
                    next: self.step(next),
                    cursor: 0,
                });
            } else {
                path.pop();
                on_path.remove(&next);
            }
        }

        chains
    }

    /// The predicate label and triple backing the hop `from → to`, if any.
    ///
    /// A forward triple wins; in [`ChainDirection::Both`] mode a reversed
    /// triple is used next, with its predicate marked `^`.
    fn hop(&self, from: EntityId, to: EntityId) -> Option<(String, &'g Triple)> {
        let graph: &'g EntityGraph = self.graph;
        if let Some(t) = graph.first_triple_between(from, to) {
            return Some((t.predicate.clone(), t));
        }
        match self.config.chain_direction {
            ChainDirection::Both => graph
                .first_triple_between(to, from)
                .map(|t| (format!("^{}", t.predicate), t)),
            ChainDirection::Forward => None,
        }
    }

    /// The distinct triples backing the chain's hops, in hop order.
    pub fn supporting_triples(&self, chain: &ReasoningChain) -> Vec<Triple> {
        let mut out: Vec<Triple> = Vec::new();
        for pair in chain.entities.windows(2) {
            if let Some((_, triple)) = self.hop(pair[0], pair[1]) {
                if !out.iter().any(|t| t.same_fact(triple)) {
                    out.push(triple.clone());
                }
            }
        }
        out
    }

    /// `"Reasoning chain: A → B → C (relations: r1 → r2)"`.
    pub fn explain(&self, chain: &ReasoningChain) -> String {
        let names = self.graph.names_of(&chain.entities);
        let mut text = format!("Reasoning chain: {}", names.join(" → "));
        let relations: Vec<String> = chain
            .entities
            .windows(2)
            .filter_map(|pair| self.hop(pair[0], pair[1]).map(|(p, _)| p))
            .collect();
        if !relations.is_empty() {
            text.push_str(&format!(" (relations: {})", relations.join(" → ")));
        }
        text
    }

    fn to_result(&self, chain: &ReasoningChain) -> ReasoningResult {
        let supporting = self.supporting_triples(chain);
        ReasoningResult {
            answer: self.explain(chain),
            confidence: chain_confidence(chain.len(), supporting.len()),
            reasoning_path: self.graph.names_of(&chain.entities),
            supporting_triples: supporting,
            method: ReasoningMethod::MultiStepReasoning,
            depth: chain.depth(),
        }
    }

    /// Scored chains from one entity, best first.
    pub fn reason_from(&self, start: &str, max_depth: usize) -> Vec<ReasoningResult> {
        let mut results: Vec<ReasoningResult> = self
            .chains_from(start, max_depth)
            .iter()
            .map(|chain| self.to_result(chain))
            .collect();
        sort_results(&mut results);
        results
    }

    /// Graph entities named in `question` (case-insensitive substring match),
    /// in entity order.
    pub fn extract_entities(&self, question: &str) -> Vec<String> {
        mentioned_entities(self.graph, question)
    }

    /// Chains from every entity named in `question`, best first.
    pub fn multi_step(&self, question: &str, max_depth: usize) -> Vec<ReasoningResult> {
        let mut results: Vec<ReasoningResult> = self
            .extract_entities(question)
            .iter()
            .flat_map(|entity| {
                self.chains_from(entity, max_depth)
                    .into_iter()
                    .map(|chain| self.to_result(&chain))
                    .collect::<Vec<_>>()
            })
            .collect();
        sort_results(&mut results);
        results
    }

    /// The graph-only answer set for `question`.
    ///
    /// Chains come first. When there are fewer than `max_results`, the top
    /// PageRank entities are appended as "notable entity" answers so a
    /// question naming nothing in the graph still gets an explainable reply.
    pub fn query(&self, question: &str, max_results: usize) -> Vec<ReasoningResult> {
        let mut results = self.multi_step(question, self.config.max_depth);
        tracing::debug!(question, chains = results.len(), "chain reasoning done");

        if results.len() < max_results {
            results.extend(self.notable_entities());
        }
        results.truncate(max_results);
        results
    }

    fn notable_entities(&self) -> Vec<ReasoningResult> {
        let report = CentralityAnalyzer::new(self.graph, self.centrality)
            .centrality(CentralityMetric::PageRank);
        report
            .top(self.config.notable_entities)
            .iter()
            .map(|score| ReasoningResult {
                answer: format!(
                    "Notable entity: {} ({}: {})",
                    score.entity,
                    metric_label(report.used),
                    score.score
                ),
                confidence: score.score.clamp(0.0, 1.0),
                reasoning_path: vec![score.entity.clone()],
                supporting_triples: Vec::new(),
                method: ReasoningMethod::CentralityAnalysis {
                    metric: report.used,
                },
                depth: 0,
            })
            .collect()
    }
}

fn metric_label(metric: CentralityMetric) -> &'static str {
    match metric {
        CentralityMetric::PageRank => "PageRank",
        other => other.as_str(),
    }
}

/// Confidence descending, then depth descending. Stable.
pub fn sort_results(results: &mut [ReasoningResult]) {
    results.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| b.depth.cmp(&a.depth))
    });
}

//! Evidence gathering: the triples and paths a strategy shows the answer
//! service, with a scalar confidence and coverage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::{OrchestrationConfig, ReasoningConfig};
use crate::graph::index::{EntityGraph, NeighborDirection};
use crate::graph::{Triple, paths, traverse};

use super::ReasoningResult;
use super::chain::ChainReasoner;
use super::intent::SearchPlan;

/// Triples and paths gathered for one question. Built per query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Deduplicated by fact, highest confidence first.
    pub triples: Vec<Triple>,
    /// Entity-name paths (shortest paths and reasoning chains).
    pub paths: Vec<Vec<String>>,
    /// In [0, 1].
    pub confidence: f64,
    /// Fraction of the full triple set referenced, in [0, 1].
    pub coverage: f64,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.triples.is_empty() && self.paths.is_empty()
    }

    /// Evidence behind a set of graph-only results: their supporting triples
    /// and reasoning paths, with the confidence of the first (returned) result.
    ///
    /// Results arrive best first with centrality padding appended, so the
    /// first result is the one a graph-only query answers with.
    pub fn from_results(results: &[ReasoningResult], total_triples: usize) -> Self {
        let triples = dedup_facts(results.iter().flat_map(|r| r.supporting_triples.iter().cloned()));
        let paths = results
            .iter()
            .filter(|r| r.reasoning_path.len() > 1)
            .map(|r| r.reasoning_path.clone())
            .collect();
        let confidence = results.first().map_or(0.0, |r| r.confidence);
        Self {
            coverage: coverage(triples.len(), total_triples),
            triples,
            paths,
            confidence,
        }
    }
}

fn coverage(unique: usize, total: usize) -> f64 {
    (unique as f64 / total.max(1) as f64).min(1.0)
}

/// Keep the first triple of each (subject, predicate, object) fact.
fn dedup_facts(triples: impl IntoIterator<Item = Triple>) -> Vec<Triple> {
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    triples
        .into_iter()
        .filter(|t| seen.insert((t.subject.clone(), t.predicate.clone(), t.object.clone())))
        .collect()
}

/// Collect evidence for `plan`.
///
/// Sources, in order: keyword matches on any triple field, the relations of
/// each target entity and of its neighbours, predicate matches for each
/// target relation, shortest paths between target entities, and reasoning
/// chains from each target entity. Triples are deduplicated by fact and
/// stable-sorted by confidence; the evidence confidence is the mean of the
/// top `evidence_top_k`, which are also the triples kept.
pub fn gather(
    graph: &EntityGraph,
    plan: &SearchPlan,
    reasoning: &ReasoningConfig,
    orchestration: &OrchestrationConfig,
) -> Evidence {
    let all = graph.triples();
    let mut found: Vec<Triple> = Vec::new();
    let mut found_paths: Vec<Vec<String>> = Vec::new();

    for keyword in &plan.keywords {
        let keyword = keyword.to_lowercase();
        found.extend(
            all.iter()
                .filter(|t| {
                    t.subject.to_lowercase().contains(&keyword)
                        || t.object.to_lowercase().contains(&keyword)
                        || t.predicate.to_lowercase().contains(&keyword)
                })
                .cloned(),
        );
    }

    for entity in &plan.entities {
        found.extend(traverse::entity_relations(graph, entity));
        for neighbor in traverse::neighbors(graph, entity, NeighborDirection::Both) {
            found.extend(traverse::entity_relations(graph, &neighbor));
        }
    }

    for relation in &plan.relations {
        let relation = relation.to_lowercase();
        found.extend(
            all.iter()
                .filter(|t| t.predicate.to_lowercase().contains(&relation))
                .cloned(),
        );
    }

    for (i, source) in plan.entities.iter().enumerate() {
        for target in &plan.entities[i + 1..] {
            if let Some(path) = paths::shortest_path(graph, source, target) {
                if path.length > 0 {
                    found_paths.push(path.path);
                }
            }
        }
    }

    let chains = ChainReasoner::new(graph, reasoning);
    for entity in &plan.entities {
        for chain in chains.chains_from(entity, plan.depth) {
            found_paths.push(graph.names_of(chain.entities()));
        }
    }

    let mut unique = dedup_facts(found);
    unique.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let top_k = orchestration.evidence_top_k.max(1);
    let coverage = coverage(unique.len(), all.len());
    unique.truncate(top_k);
    let confidence = if unique.is_empty() {
        0.0
    } else {
        unique.iter().map(|t| t.confidence).sum::<f64>() / unique.len() as f64
    };
    found_paths.truncate(orchestration.max_evidence_paths);

    tracing::debug!(
        triples = unique.len(),
        paths = found_paths.len(),
        confidence,
        coverage,
        "evidence gathered"
    );

    Evidence {
        triples: unique,
        paths: found_paths,
        confidence,
        coverage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reason::intent::QueryAnalysis;

    fn graph() -> EntityGraph {
        EntityGraph::build(&[
            Triple::new("Paris", "capital_of", "France").with_confidence(0.9),
            Triple::new("France", "part_of", "Europe").with_confidence(0.8),
            Triple::new("Paris", "capital_of", "France").with_confidence(0.5),
            Triple::new("Berlin", "capital_of", "Germany").with_confidence(0.4),
        ])
    }

    fn plan_for(graph: &EntityGraph, question: &str) -> SearchPlan {
        let analysis = QueryAnalysis::analyze(question, graph);
        SearchPlan::build(question, &analysis, graph, 3)
    }

    #[test]
    fn gathers_deduplicated_sorted_triples() {
        let g = graph();
        let plan = plan_for(&g, "How does Paris relate to Europe?");
        let evidence = gather(&g, &plan, &ReasoningConfig::default(), &OrchestrationConfig::default());

        assert_eq!(evidence.triples.len(), 2);
        assert_eq!(evidence.triples[0].confidence, 0.9);
        assert!((evidence.confidence - 0.85).abs() < 1e-12);
        assert!((evidence.coverage - 0.5).abs() < 1e-12);
        assert!(evidence.paths.contains(&vec![
            "Paris".to_string(),
            "France".to_string(),
            "Europe".to_string()
        ]));
    }

    #[test]
    fn top_k_bounds_confidence_and_triples() {
        let g = graph();
        let plan = plan_for(&g, "capital");
        let orchestration = OrchestrationConfig {
            evidence_top_k: 1,
            ..OrchestrationConfig::default()
        };
        let evidence = gather(&g, &plan, &ReasoningConfig::default(), &orchestration);
        assert_eq!(evidence.triples.len(), 1);
        assert_eq!(evidence.confidence, 0.9);
        // Two distinct capital_of facts out of four triples.
        assert!((evidence.coverage - 0.5).abs() < 1e-12);
    }

    #[test]
    fn nothing_matches_gives_empty_evidence() {
        let g = graph();
        let plan = plan_for(&g, "zz");
        let evidence = gather(&g, &plan, &ReasoningConfig::default(), &OrchestrationConfig::default());
        assert!(evidence.is_empty());
        assert_eq!(evidence.confidence, 0.0);
        assert_eq!(evidence.coverage, 0.0);
    }

    #[test]
    fn evidence_from_results_uses_returned_result_confidence() {
        let results = vec![
            ReasoningResult {
                answer: "x".into(),
                confidence: 0.4,
                reasoning_path: vec!["A".into(), "B".into()],
                supporting_triples: vec![Triple::new("A", "r", "B")],
                method: crate::reason::ReasoningMethod::MultiStepReasoning,
                depth: 1,
            },
            // Padding may outscore the chain; it must not lend its score.
            ReasoningResult {
                answer: "Notable entity: B".into(),
                confidence: 0.9,
                reasoning_path: vec!["B".into()],
                supporting_triples: Vec::new(),
                method: crate::reason::ReasoningMethod::CentralityAnalysis {
                    metric: crate::graph::analytics::CentralityMetric::PageRank,
                },
                depth: 0,
            },
            ReasoningResult::no_evidence(),
        ];
        let evidence = Evidence::from_results(&results, 4);
        assert_eq!(evidence.confidence, 0.4);
        assert_eq!(evidence.triples.len(), 1);
        assert_eq!(evidence.paths.len(), 1);
        assert_eq!(evidence.coverage, 0.25);
    }
}

//! Strategy orchestration: turns a question into one complete
//! [`ReasoningResult`].
//!
//! Three strategies, chosen by the caller:
//!
//! - [`Strategy::GraphOnly`]: chain reasoning padded with notable entities.
//!   Never calls the answer service and is deterministic for a fixed graph.
//! - [`Strategy::Hybrid`]: graph results first; the service is consulted
//!   when the question is open-ended or complex, or the graph has no chain
//!   for it. Confidences are blended with per-intent weights.
//! - [`Strategy::LanguageModel`]: analyze, plan, gather evidence, then ask
//!   the service once with the evidence bundle.
//!
//! Service failures never escape: the answer degrades to the best graph
//! result with the evidence confidence, and `method` records the fallback.

use std::collections::HashSet;
use std::sync::Arc;

use crate::answer::{AnswerRequest, AnswerService, ServiceAnswer, call_with_policy};
use crate::config::{BlendWeights, EngineConfig};
use crate::graph::index::{EntityGraph, GraphHandle};
use crate::graph::{KnowledgeGraph, Triple, paths};
use crate::reason::chain::ChainReasoner;
use crate::reason::evidence::{self, Evidence};
use crate::reason::intent::{QueryAnalysis, QueryIntent, SearchPlan};
use crate::reason::{FallbackReason, ReasoningMethod, ReasoningResult, Strategy, round3};

/// Graph answers passed to the service as context in hybrid mode.
const CONTEXT_ANSWERS: usize = 3;

/// Entities after each one that hybrid path enhancement pairs it with.
const PATH_PAIR_WINDOW: usize = 2;

/// Answers questions against knowledge graphs.
///
/// Holds the configuration, an optional answer service and the current
/// entity graph. Queries run against the graph snapshot taken when they
/// start; concurrent queries share it read-only.
pub struct ReasoningOrchestrator {
    config: EngineConfig,
    service: Option<Arc<dyn AnswerService>>,
    graph: GraphHandle,
}

impl ReasoningOrchestrator {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            service: None,
            graph: GraphHandle::new(),
        }
    }

    pub fn with_service(mut self, service: Arc<dyn AnswerService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn has_service(&self) -> bool {
        self.service.is_some()
    }

    /// Publish the entity graph for `kg`, rebuilding only when the triples
    /// changed, and return it.
    pub fn load(&self, kg: &KnowledgeGraph) -> Arc<EntityGraph> {
        self.graph.refresh(kg.triples())
    }

    /// The most recently loaded graph.
    pub fn snapshot(&self) -> Arc<EntityGraph> {
        self.graph.snapshot()
    }

    /// Answer `question` over `kg` with `strategy`.
    pub async fn answer(
        &self,
        kg: &KnowledgeGraph,
        question: &str,
        strategy: Strategy,
    ) -> ReasoningResult {
        let graph = self.load(kg);
        self.answer_on(&graph, question, strategy).await
    }

    /// Answer `question` over an already-built graph snapshot.
    pub async fn answer_on(
        &self,
        graph: &EntityGraph,
        question: &str,
        strategy: Strategy,
    ) -> ReasoningResult {
        tracing::info!(%strategy, question, entities = graph.node_count(), "answering question");
        let result = match strategy {
            Strategy::GraphOnly => self.graph_only(graph, question),
            Strategy::Hybrid => self.hybrid(graph, question).await,
            Strategy::LanguageModel => self.language_model(graph, question).await,
        };
        tracing::info!(
            %strategy,
            method = %result.method,
            confidence = result.confidence,
            "question answered"
        );
        result
    }

    /// Every graph-only result for `question`, best first.
    pub fn graph_results(&self, graph: &EntityGraph, question: &str) -> Vec<ReasoningResult> {
        ChainReasoner::new(graph, &self.config.reasoning)
            .with_centrality(self.config.centrality)
            .query(question, self.config.reasoning.max_results)
    }

    fn graph_only(&self, graph: &EntityGraph, question: &str) -> ReasoningResult {
        self.graph_results(graph, question)
            .into_iter()
            .next()
            .unwrap_or_else(ReasoningResult::no_evidence)
    }

    // -----------------------------------------------------------------------
    // Hybrid
    // -----------------------------------------------------------------------

    async fn hybrid(&self, graph: &EntityGraph, question: &str) -> ReasoningResult {
        let results = self.graph_results(graph, question);
        let analysis = QueryAnalysis::analyze(question, graph);
        let evidence = Evidence::from_results(&results, graph.triples().len());

        // Only centrality padding means the graph has no chain for the question.
        let sparse = !results
            .iter()
            .any(|r| r.method == ReasoningMethod::MultiStepReasoning);
        if !analysis.requires_service && !sparse {
            if let Some(best) = results.into_iter().next() {
                return best;
            }
            return ReasoningResult::no_evidence();
        }

        let graph_answers = results
            .iter()
            .take(CONTEXT_ANSWERS)
            .map(|r| r.answer.clone())
            .collect();
        let request = AnswerRequest::new(question, analysis.intent, evidence.clone())
            .with_graph_answers(graph_answers);

        let reply = match self.consult(request).await {
            Ok(reply) => reply,
            Err(reason) => {
                let best = results.into_iter().next();
                return fallback(best, Strategy::Hybrid, reason, evidence.confidence);
            }
        };

        let Some(best) = results.into_iter().next() else {
            return ReasoningResult {
                answer: reply.answer,
                confidence: round3(reply.confidence),
                reasoning_path: reply.rationale,
                supporting_triples: Vec::new(),
                method: ReasoningMethod::LanguageModel,
                depth: 0,
            };
        };

        let weights = self.weights_for(analysis.intent);
        let orchestration = &self.config.orchestration;

        let mut reasoning_path = best.reasoning_path.clone();
        let mut supporting = best.supporting_triples.clone();
        for path in enhancement_paths(graph, &analysis.entities, orchestration.path_hop_limit) {
            reasoning_path.push(format!("Path: {}", path.render()));
            supporting.extend(path.supporting_triples);
        }
        reasoning_path.extend(reply.rationale.iter().cloned());
        let mut supporting = dedup_facts(supporting);
        supporting.truncate(orchestration.supporting_triple_cap);

        ReasoningResult {
            answer: self.merge_answers(&best.answer, &reply),
            confidence: round3(weights.blend(evidence.confidence, reply.confidence)),
            reasoning_path,
            supporting_triples: supporting,
            method: ReasoningMethod::Hybrid,
            depth: best.depth,
        }
    }

    fn weights_for(&self, intent: QueryIntent) -> BlendWeights {
        let hybrid = &self.config.orchestration.hybrid;
        match intent {
            QueryIntent::Factual => hybrid.factual,
            intent if intent.is_open_ended() => hybrid.open_ended,
            _ => hybrid.default,
        }
    }

    /// Keep both answers when they differ; the service part is marked, and
    /// flagged as low confidence at or below the enhancement threshold.
    fn merge_answers(&self, graph_answer: &str, reply: &ServiceAnswer) -> String {
        let service_answer = reply.answer.trim();
        if service_answer.is_empty() || service_answer == graph_answer.trim() {
            return graph_answer.to_string();
        }
        if graph_answer.trim().is_empty() {
            return service_answer.to_string();
        }
        if reply.confidence > self.config.orchestration.enhancement_threshold {
            format!("{graph_answer}\n\nDeeper analysis: {service_answer}")
        } else {
            format!("{graph_answer}\n\nDeeper analysis (low confidence): {service_answer}")
        }
    }

    // -----------------------------------------------------------------------
    // Language-model driven
    // -----------------------------------------------------------------------

    async fn language_model(&self, graph: &EntityGraph, question: &str) -> ReasoningResult {
        let analysis = QueryAnalysis::analyze(question, graph);
        let plan = SearchPlan::build(
            question,
            &analysis,
            graph,
            self.config.orchestration.max_search_depth,
        );
        let evidence = evidence::gather(
            graph,
            &plan,
            &self.config.reasoning,
            &self.config.orchestration,
        );
        tracing::debug!(
            intent = %analysis.intent,
            entities = plan.entities.len(),
            depth = plan.depth,
            "search plan built"
        );

        let request = AnswerRequest::new(question, analysis.intent, evidence.clone())
            .with_plan(plan.clone());

        match self.consult(request).await {
            Ok(reply) => {
                let orchestration = &self.config.orchestration;
                let confidence = orchestration.service_weight * reply.confidence
                    + orchestration.evidence_weight * evidence.confidence;
                ReasoningResult {
                    answer: reply.answer,
                    confidence: round3(confidence.clamp(0.0, 1.0)),
                    reasoning_path: if reply.rationale.is_empty() {
                        plan.reasoning_steps
                    } else {
                        reply.rationale
                    },
                    supporting_triples: evidence.triples,
                    method: ReasoningMethod::LlmDriven,
                    depth: plan.depth,
                }
            }
            Err(reason) => {
                let best = self.graph_results(graph, question).into_iter().next();
                fallback(best, Strategy::LanguageModel, reason, evidence.confidence)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Service access
    // -----------------------------------------------------------------------

    async fn consult(&self, request: AnswerRequest) -> Result<ServiceAnswer, FallbackReason> {
        let Some(service) = &self.service else {
            tracing::warn!("no answer service configured, using graph evidence only");
            return Err(FallbackReason::NoService);
        };
        call_with_policy(Arc::clone(service), Arc::new(request), self.config.service)
            .await
            .map_err(|err| {
                tracing::warn!(
                    service = service.name(),
                    error = %err,
                    "answer service failed, using graph evidence only"
                );
                FallbackReason::from(&err)
            })
    }
}

impl std::fmt::Debug for ReasoningOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReasoningOrchestrator")
            .field("config", &self.config)
            .field("service", &self.service.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// The degraded result: the best graph answer (or the no-evidence answer)
/// carrying the raw evidence confidence.
fn fallback(
    best: Option<ReasoningResult>,
    strategy: Strategy,
    reason: FallbackReason,
    evidence_confidence: f64,
) -> ReasoningResult {
    let mut result = best.unwrap_or_else(ReasoningResult::no_evidence);
    result.method = ReasoningMethod::GraphFallback { strategy, reason };
    result.confidence = evidence_confidence.clamp(0.0, 1.0);
    result
}

/// Shortest paths between each named entity and the next few, up to
/// `hop_limit` edges.
fn enhancement_paths(
    graph: &EntityGraph,
    entities: &[String],
    hop_limit: usize,
) -> Vec<paths::PathResult> {
    let mut found = Vec::new();
    for (i, source) in entities.iter().enumerate() {
        for target in entities.iter().skip(i + 1).take(PATH_PAIR_WINDOW) {
            if let Some(path) = paths::shortest_path(graph, source, target) {
                if path.length > 0 && path.length <= hop_limit {
                    found.push(path);
                }
            }
        }
    }
    found
}

fn dedup_facts(triples: Vec<Triple>) -> Vec<Triple> {
    let mut kept: Vec<Triple> = Vec::with_capacity(triples.len());
    let mut seen: HashSet<(String, String, String)> = HashSet::new();
    for triple in triples {
        if seen.insert((triple.subject.clone(), triple.predicate.clone(), triple.object.clone())) {
            kept.push(triple);
        }
    }
    kept
}

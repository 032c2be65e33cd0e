//! Orchestration tests against scripted answer services.
//!
//! Each double plays one behaviour of a real language model: a good reply, a
//! reply too slow for the timeout, a reply that is not JSON, and a broken
//! connection. Whatever the service does, the orchestrator must return a
//! complete result and say in `method` whether it degraded.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use kquest::answer::{AnswerError, AnswerRequest, AnswerService, ServiceAnswer, decode};
use kquest::config::{EngineConfig, ServiceConfig};
use kquest::graph::{KnowledgeGraph, Triple};
use kquest::orchestrator::ReasoningOrchestrator;
use kquest::reason::{FallbackReason, ReasoningMethod, Strategy};

enum Script {
    Reply(&'static str),
    Hang,
    Transport,
}

struct Scripted {
    script: Script,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl AnswerService for Scripted {
    async fn generate(&self, _request: &AnswerRequest) -> Result<ServiceAnswer, AnswerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            Script::Reply(raw) => decode::decode(raw),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                decode::decode(r#"{"answer": "too late"}"#)
            }
            Script::Transport => Err(AnswerError::Transport {
                message: "connection reset".into(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn kg() -> KnowledgeGraph {
    KnowledgeGraph::from_triples(vec![
        Triple::new("A", "rel", "B").with_confidence(0.9),
        Triple::new("B", "rel", "C").with_confidence(0.8),
    ])
}

fn geography() -> KnowledgeGraph {
    KnowledgeGraph::from_triples(vec![
        Triple::new("Paris", "capital_of", "France").with_confidence(0.9),
        Triple::new("France", "part_of", "Europe").with_confidence(0.8),
        Triple::new("Berlin", "capital_of", "Germany").with_confidence(0.9),
        Triple::new("Germany", "part_of", "Europe").with_confidence(0.8),
    ])
}

fn fast_config(max_retries: u32) -> EngineConfig {
    EngineConfig {
        service: ServiceConfig {
            timeout_ms: 50,
            max_retries,
            retry_delay_ms: 1,
        },
        ..EngineConfig::default()
    }
}

fn orchestrator(script: Script, max_retries: u32) -> (ReasoningOrchestrator, Arc<Scripted>) {
    let service = Scripted::new(script);
    let orchestrator =
        ReasoningOrchestrator::new(fast_config(max_retries)).with_service(service.clone());
    (orchestrator, service)
}

const OPEN_QUESTION: &str = "Why does A lead to C?";

// ---------------------------------------------------------------------------
// Graph-only
// ---------------------------------------------------------------------------

#[tokio::test]
async fn graph_only_pads_with_notable_entities() {
    let (orchestrator, service) = orchestrator(Script::Reply(r#"{"answer": "x"}"#), 0);
    let result = orchestrator
        .answer(&kg(), "nothing known here", Strategy::GraphOnly)
        .await;

    assert!(matches!(result.method, ReasoningMethod::CentralityAnalysis { .. }));
    assert!(result.answer.starts_with("Notable entity: "));
    assert!(result.confidence > 0.0);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn graph_only_is_deterministic() {
    let orchestrator = ReasoningOrchestrator::new(EngineConfig::default());
    let first = orchestrator.answer(&geography(), "Tell me of Paris", Strategy::GraphOnly).await;
    let second = orchestrator.answer(&geography(), "Tell me of Paris", Strategy::GraphOnly).await;
    assert_eq!(first, second);
    assert_eq!(first.method, ReasoningMethod::MultiStepReasoning);
}

#[tokio::test]
async fn empty_graph_has_no_evidence() {
    let orchestrator = ReasoningOrchestrator::new(EngineConfig::default());
    let result = orchestrator
        .answer(&KnowledgeGraph::new(), "What is Paris?", Strategy::GraphOnly)
        .await;
    assert_eq!(result.method, ReasoningMethod::NoEvidence);
    assert_eq!(result.confidence, 0.0);
}

// ---------------------------------------------------------------------------
// Hybrid
// ---------------------------------------------------------------------------

#[tokio::test]
async fn hybrid_blends_graph_and_service() {
    let (orchestrator, service) = orchestrator(
        Script::Reply(r#"{"answer": "A reaches C through B", "confidence": 0.8, "rationale": ["A rel B", "B rel C"]}"#),
        0,
    );
    let result = orchestrator.answer(&kg(), OPEN_QUESTION, Strategy::Hybrid).await;

    assert_eq!(result.method, ReasoningMethod::Hybrid);
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    // Causal: 0.4 * graph 0.6 + 0.6 * service 0.8.
    assert!((result.confidence - 0.72).abs() < 1e-9);
    assert!(result.answer.contains("\n\nDeeper analysis: A reaches C through B"));
    assert!(result.reasoning_path.iter().any(|s| s == "B rel C"));
}

#[tokio::test]
async fn hybrid_skips_service_for_simple_factual_questions() {
    let (orchestrator, service) = orchestrator(Script::Reply(r#"{"answer": "x"}"#), 0);
    let graph_only = orchestrator.answer(&kg(), "What is A?", Strategy::GraphOnly).await;
    let hybrid = orchestrator.answer(&kg(), "What is A?", Strategy::Hybrid).await;

    assert_eq!(hybrid, graph_only);
    assert_eq!(service.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hybrid_timeout_falls_back_to_graph_confidence() {
    let (orchestrator, _service) = orchestrator(Script::Hang, 0);
    let graph_only = orchestrator.answer(&kg(), OPEN_QUESTION, Strategy::GraphOnly).await;
    let result = orchestrator.answer(&kg(), OPEN_QUESTION, Strategy::Hybrid).await;

    assert_eq!(
        result.method,
        ReasoningMethod::GraphFallback {
            strategy: Strategy::Hybrid,
            reason: FallbackReason::Timeout,
        }
    );
    assert!(result.method.is_fallback());
    assert_eq!(result.confidence, graph_only.confidence);
    assert_eq!(result.answer, graph_only.answer);
}

#[tokio::test]
async fn hybrid_fallback_keeps_the_returned_chain_confidence() {
    // In a two-node graph the object's PageRank outscores the only chain.
    let kg = KnowledgeGraph::from_triples(vec![Triple::new("Alpha", "rel", "Beta").with_confidence(0.9)]);
    let question = "Why is Alpha so?";
    let (orchestrator, _service) = orchestrator(Script::Hang, 0);

    let snapshot = orchestrator.load(&kg);
    let results = orchestrator.graph_results(&snapshot, question);
    assert_eq!(results[0].method, ReasoningMethod::MultiStepReasoning);
    assert!(results.iter().skip(1).any(|r| r.confidence > results[0].confidence));

    let graph_only = orchestrator.answer(&kg, question, Strategy::GraphOnly).await;
    let result = orchestrator.answer(&kg, question, Strategy::Hybrid).await;

    assert_eq!(
        result.method,
        ReasoningMethod::GraphFallback {
            strategy: Strategy::Hybrid,
            reason: FallbackReason::Timeout,
        }
    );
    assert_eq!(result.answer, graph_only.answer);
    assert_eq!(result.confidence, graph_only.confidence);
    assert_eq!(result.confidence, 0.6);
}

#[tokio::test]
async fn hybrid_consults_service_when_graph_has_no_chain() {
    let (orchestrator, service) = orchestrator(
        Script::Reply(r#"{"answer": "Rome is the capital of Italy", "confidence": 0.8}"#),
        0,
    );
    // Simple and factual, but it names nothing in the graph.
    let result = orchestrator.answer(&geography(), "What is Rome?", Strategy::Hybrid).await;

    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.method, ReasoningMethod::Hybrid);
    assert!(result.answer.starts_with("Notable entity: "));
    assert!(result.answer.contains("Rome is the capital of Italy"));
}

#[tokio::test]
async fn hybrid_malformed_reply_falls_back() {
    let (orchestrator, service) = orchestrator(Script::Reply("I would rather not use JSON."), 3);
    let result = orchestrator.answer(&kg(), OPEN_QUESTION, Strategy::Hybrid).await;

    assert_eq!(
        result.method,
        ReasoningMethod::GraphFallback {
            strategy: Strategy::Hybrid,
            reason: FallbackReason::Malformed,
        }
    );
    // Malformed replies are not retried.
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn hybrid_transport_failure_exhausts_retries() {
    let (orchestrator, service) = orchestrator(Script::Transport, 2);
    let result = orchestrator.answer(&kg(), OPEN_QUESTION, Strategy::Hybrid).await;

    assert_eq!(
        result.method,
        ReasoningMethod::GraphFallback {
            strategy: Strategy::Hybrid,
            reason: FallbackReason::Exhausted,
        }
    );
    assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    assert!(!result.answer.is_empty());
}

// ---------------------------------------------------------------------------
// Language-model driven
// ---------------------------------------------------------------------------

#[tokio::test]
async fn llm_strategy_weights_service_and_evidence() {
    let (orchestrator, service) = orchestrator(
        Script::Reply(
            "```json\n{\"answer\": \"Paris is in Europe\", \"confidence\": 0.9, \"reasoning_process\": [\"Paris capital_of France\", \"France part_of Europe\"]}\n```",
        ),
        0,
    );
    let result = orchestrator
        .answer(&geography(), "Is Paris part of Europe?", Strategy::LanguageModel)
        .await;

    assert_eq!(result.method, ReasoningMethod::LlmDriven);
    assert_eq!(result.answer, "Paris is in Europe");
    assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.reasoning_path.len(), 2);
    // The evidence triples become the supporting triples.
    assert_eq!(result.supporting_triples.len(), 4);
    assert!(result.supporting_triples.len() <= 10);
    let evidence_confidence: f64 = result.supporting_triples.iter().map(|t| t.confidence).sum::<f64>()
        / result.supporting_triples.len() as f64;
    let expected = 0.7 * 0.9 + 0.3 * evidence_confidence;
    assert!((result.confidence - expected).abs() < 1e-3);
}

#[tokio::test]
async fn llm_strategy_without_service_falls_back() {
    let orchestrator = ReasoningOrchestrator::new(EngineConfig::default());
    let result = orchestrator
        .answer(&geography(), "Is Paris part of Europe?", Strategy::LanguageModel)
        .await;

    assert_eq!(
        result.method,
        ReasoningMethod::GraphFallback {
            strategy: Strategy::LanguageModel,
            reason: FallbackReason::NoService,
        }
    );
    assert!((0.0..=1.0).contains(&result.confidence));
    assert!(result.confidence > 0.0);
}

#[tokio::test]
async fn concurrent_queries_share_one_snapshot() {
    let (orchestrator, _service) = orchestrator(
        Script::Reply(r#"{"answer": "A reaches C", "confidence": 0.7}"#),
        0,
    );
    let orchestrator = Arc::new(orchestrator);
    let kg = Arc::new(kg());

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            let kg = Arc::clone(&kg);
            let strategy = Strategy::ALL[i % Strategy::ALL.len()];
            tokio::spawn(async move { orchestrator.answer(&kg, OPEN_QUESTION, strategy).await })
        })
        .collect();

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(!result.answer.is_empty());
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(!result.method.is_fallback());
    }
    assert_eq!(orchestrator.snapshot().node_count(), 3);
}

//! The external answer service: a language model that turns an evidence
//! bundle into an answer, a rationale and a self-reported confidence.
//!
//! The engine only sees the [`AnswerService`] trait. Calls go through
//! [`call_with_policy`], which applies the configured timeout and retry budget
//! and never blocks other queries. Every failure is an [`AnswerError`] that the
//! orchestrator recovers into a graph-only fallback.

pub mod decode;
pub mod ollama;

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ServiceConfig;
use crate::reason::evidence::Evidence;
use crate::reason::intent::{QueryIntent, SearchPlan};

/// Triples shown in a rendered prompt.
const PROMPT_TRIPLES: usize = 5;
/// Paths shown in a rendered prompt.
const PROMPT_PATHS: usize = 3;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the answer service.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum AnswerError {
    #[error("answer service is unavailable: {message}")]
    #[diagnostic(
        code(kquest::answer::unavailable),
        help("Start Ollama with `ollama serve`, or use the `graph` strategy, which never calls the service.")
    )]
    Unavailable { message: String },

    #[error("answer service did not reply within {timeout_ms} ms")]
    #[diagnostic(
        code(kquest::answer::timeout),
        help("Raise `service.timeout_ms` or use a smaller model.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("answer service request failed: {message}")]
    #[diagnostic(
        code(kquest::answer::transport),
        help("Check that the service is running and the model is pulled.")
    )]
    Transport { message: String },

    #[error("answer service reply could not be decoded: {message}")]
    #[diagnostic(
        code(kquest::answer::malformed),
        help("The model must reply with a JSON object containing at least an `answer` field.")
    )]
    Malformed { message: String },

    #[error("answer service failed after {attempts} attempts: {message}")]
    #[diagnostic(
        code(kquest::answer::exhausted),
        help("Raise `service.max_retries` or `service.retry_delay_ms`, or check the service logs.")
    )]
    Exhausted { attempts: u32, message: String },
}

impl AnswerError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnswerError::Timeout { .. } | AnswerError::Transport { .. })
    }
}

// ---------------------------------------------------------------------------
// Request / reply
// ---------------------------------------------------------------------------

/// What the service is asked: the question plus the graph's evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub intent: QueryIntent,
    pub evidence: Evidence,
    /// Answers the graph already produced, best first.
    pub graph_answers: Vec<String>,
    /// The search plan, when the evidence came from one.
    pub plan: Option<SearchPlan>,
}

impl AnswerRequest {
    pub fn new(question: impl Into<String>, intent: QueryIntent, evidence: Evidence) -> Self {
        Self {
            question: question.into(),
            intent,
            evidence,
            graph_answers: Vec::new(),
            plan: None,
        }
    }

    pub fn with_graph_answers(mut self, answers: Vec<String>) -> Self {
        self.graph_answers = answers;
        self
    }

    pub fn with_plan(mut self, plan: SearchPlan) -> Self {
        self.plan = Some(plan);
        self
    }

    /// Plain-text prompt for text-completion services.
    ///
    /// Lists the question, the plan's steps, the strongest triples and paths,
    /// and the evidence quality, then asks for a JSON object reply.
    pub fn render_prompt(&self) -> String {
        let mut prompt = format!("Question ({} intent): {}\n", self.intent, self.question);

        if let Some(plan) = &self.plan {
            prompt.push_str("\nSearch plan:\n");
            for (i, step) in plan.reasoning_steps.iter().enumerate() {
                prompt.push_str(&format!("{}. {step}\n", i + 1));
            }
        }

        prompt.push_str("\nKnowledge graph facts:\n");
        if self.evidence.triples.is_empty() {
            prompt.push_str("- (none)\n");
        }
        for triple in self.evidence.triples.iter().take(PROMPT_TRIPLES) {
            prompt.push_str(&format!(
                "- {} {} {} (confidence {:.2})\n",
                triple.subject, triple.predicate, triple.object, triple.confidence
            ));
        }

        if !self.evidence.paths.is_empty() {
            prompt.push_str("\nReasoning paths:\n");
            for path in self.evidence.paths.iter().take(PROMPT_PATHS) {
                prompt.push_str(&format!("- {}\n", path.join(" → ")));
            }
        }

        if !self.graph_answers.is_empty() {
            prompt.push_str("\nGraph answers:\n");
            for answer in &self.graph_answers {
                prompt.push_str(&format!("- {answer}\n"));
            }
        }

        prompt.push_str(&format!(
            "\nEvidence quality: confidence {:.2}, coverage {:.2}\n",
            self.evidence.confidence, self.evidence.coverage
        ));
        prompt.push_str(
            "\nReply with one JSON object: \
             {\"answer\": string, \"rationale\": [string], \"confidence\": number between 0 and 1, \
             \"sources\": [string]}",
        );
        prompt
    }
}

/// A decoded service reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAnswer {
    pub answer: String,
    /// Self-reported, in [0, 1].
    pub confidence: f64,
    /// Step-by-step reasoning, in order.
    pub rationale: Vec<String>,
    pub sources: Vec<String>,
}

/// An external language model that answers from graph evidence.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn generate(&self, request: &AnswerRequest) -> Result<ServiceAnswer, AnswerError>;

    /// Name used in logs.
    fn name(&self) -> &str {
        "answer-service"
    }
}

// ---------------------------------------------------------------------------
// Call policy
// ---------------------------------------------------------------------------

/// Call `service` under the timeout and retry budget in `policy`.
///
/// Each attempt runs as its own task. A timed-out attempt is left running and
/// its eventual reply is dropped. Only timeouts and transport failures are
/// retried; once retries run out the last failure is reported as
/// [`AnswerError::Exhausted`].
pub async fn call_with_policy(
    service: Arc<dyn AnswerService>,
    request: Arc<AnswerRequest>,
    policy: ServiceConfig,
) -> Result<ServiceAnswer, AnswerError> {
    let attempts = policy.max_retries.saturating_add(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let task = {
            let service = Arc::clone(&service);
            let request = Arc::clone(&request);
            tokio::spawn(async move { service.generate(&request).await })
        };

        let error = match tokio::time::timeout(policy.timeout(), task).await {
            Ok(Ok(Ok(answer))) => return Ok(answer),
            Ok(Ok(Err(err))) => err,
            Ok(Err(join_err)) => AnswerError::Transport {
                message: format!("service task failed: {join_err}"),
            },
            Err(_) => AnswerError::Timeout {
                timeout_ms: policy.timeout_ms,
            },
        };

        if !error.is_retryable() {
            return Err(error);
        }
        if attempt < attempts {
            tracing::warn!(
                service = service.name(),
                attempt,
                max_attempts = attempts,
                error = %error,
                "answer service call failed, retrying"
            );
            tokio::time::sleep(policy.retry_delay()).await;
        }
        last_error = Some(error);
    }

    match last_error {
        Some(err) if attempts == 1 => Err(err),
        Some(err) => Err(AnswerError::Exhausted {
            attempts,
            message: err.to_string(),
        }),
        None => Err(AnswerError::Exhausted {
            attempts,
            message: "no attempt was made".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::graph::Triple;

    struct Flaky {
        calls: AtomicUsize,
        failures: usize,
        error: AnswerError,
    }

    #[async_trait]
    impl AnswerService for Flaky {
        async fn generate(&self, _request: &AnswerRequest) -> Result<ServiceAnswer, AnswerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(ServiceAnswer {
                answer: "ok".into(),
                confidence: 0.8,
                rationale: Vec::new(),
                sources: Vec::new(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl AnswerService for Slow {
        async fn generate(&self, _request: &AnswerRequest) -> Result<ServiceAnswer, AnswerError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Err(AnswerError::Unavailable {
                message: "too late".into(),
            })
        }
    }

    fn request() -> Arc<AnswerRequest> {
        Arc::new(AnswerRequest::new(
            "What is Paris?",
            QueryIntent::Factual,
            Evidence::default(),
        ))
    }

    fn policy(max_retries: u32) -> ServiceConfig {
        ServiceConfig {
            timeout_ms: 50,
            max_retries,
            retry_delay_ms: 1,
        }
    }

    fn flaky(failures: usize, error: AnswerError) -> Arc<Flaky> {
        Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            failures,
            error,
        })
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let service = flaky(2, AnswerError::Transport { message: "reset".into() });
        let answer = call_with_policy(service.clone(), request(), policy(3)).await.unwrap();
        assert_eq!(answer.answer, "ok");
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_reply_is_not_retried() {
        let service = flaky(1, AnswerError::Malformed { message: "prose".into() });
        let err = call_with_policy(service.clone(), request(), policy(3)).await.unwrap_err();
        assert!(matches!(err, AnswerError::Malformed { .. }));
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_run_out() {
        let service = flaky(10, AnswerError::Transport { message: "reset".into() });
        let err = call_with_policy(service.clone(), request(), policy(2)).await.unwrap_err();
        assert!(matches!(err, AnswerError::Exhausted { attempts: 3, .. }));
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let err = call_with_policy(Arc::new(Slow), request(), policy(0)).await.unwrap_err();
        assert!(matches!(err, AnswerError::Timeout { timeout_ms: 50 }));
    }

    #[test]
    fn prompt_lists_top_evidence() {
        let evidence = Evidence {
            triples: (0..8)
                .map(|i| Triple::new(format!("s{i}"), "r", "o").with_confidence(0.9))
                .collect(),
            paths: vec![vec!["A".into(), "B".into(), "C".into()]],
            confidence: 0.9,
            coverage: 0.25,
        };
        let prompt = AnswerRequest::new("Why?", QueryIntent::Causal, evidence)
            .with_graph_answers(vec!["Reasoning chain: A → B".into()])
            .render_prompt();
        assert!(prompt.contains("Question (causal intent): Why?"));
        assert!(prompt.contains("- s4 r o (confidence 0.90)"));
        assert!(!prompt.contains("s5"));
        assert!(prompt.contains("- A → B → C"));
        assert!(prompt.contains("Evidence quality: confidence 0.90, coverage 0.25"));
    }

    #[test]
    fn only_timeouts_and_transport_are_retryable() {
        assert!(AnswerError::Timeout { timeout_ms: 1 }.is_retryable());
        assert!(!AnswerError::Unavailable { message: String::new() }.is_retryable());
    }
}

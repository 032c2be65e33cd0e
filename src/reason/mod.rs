//! Reasoning over the entity graph.
//!
//! - [`chain`]: multi-step reasoning chains and the graph-only query
//! - [`intent`]: heuristic query analysis and search planning
//! - [`evidence`]: plan-driven evidence gathering
//!
//! Every strategy produces [`ReasoningResult`]s; the orchestrator picks and
//! blends them.

pub mod chain;
pub mod evidence;
pub mod intent;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::answer::AnswerError;
use crate::error::ReasonError;
use crate::graph::Triple;
use crate::graph::analytics::CentralityMetric;

/// Why a strategy degraded to graph-only evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// No answer service is configured.
    NoService,
    Unavailable,
    Timeout,
    Transport,
    /// The service replied, but nothing in the reply decoded.
    Malformed,
    /// Every retry failed.
    Exhausted,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::NoService => "no_service",
            FallbackReason::Unavailable => "unavailable",
            FallbackReason::Timeout => "timeout",
            FallbackReason::Transport => "transport",
            FallbackReason::Malformed => "malformed",
            FallbackReason::Exhausted => "exhausted",
        }
    }
}

impl From<&AnswerError> for FallbackReason {
    fn from(err: &AnswerError) -> Self {
        match err {
            AnswerError::Unavailable { .. } => FallbackReason::Unavailable,
            AnswerError::Timeout { .. } => FallbackReason::Timeout,
            AnswerError::Transport { .. } => FallbackReason::Transport,
            AnswerError::Malformed { .. } => FallbackReason::Malformed,
            AnswerError::Exhausted { .. } => FallbackReason::Exhausted,
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a result was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReasoningMethod {
    /// A reasoning chain through the graph.
    MultiStepReasoning,
    /// A "notable entity" ranked by centrality.
    CentralityAnalysis { metric: CentralityMetric },
    /// Graph evidence blended with an answer service reply.
    Hybrid,
    /// Hybrid query answered by the service alone (no graph results).
    LanguageModel,
    /// Service answer built on a plan-driven evidence bundle.
    LlmDriven,
    /// A strategy that needed the service ended on graph evidence only.
    GraphFallback {
        strategy: Strategy,
        reason: FallbackReason,
    },
    /// Nothing in the graph supports an answer.
    NoEvidence,
}

impl ReasoningMethod {
    /// Whether the result is a degraded answer.
    pub fn is_fallback(&self) -> bool {
        matches!(self, ReasoningMethod::GraphFallback { .. })
    }
}

impl fmt::Display for ReasoningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningMethod::MultiStepReasoning => f.write_str("multi_step_reasoning"),
            ReasoningMethod::CentralityAnalysis { metric } => {
                write!(f, "centrality_analysis({metric})")
            }
            ReasoningMethod::Hybrid => f.write_str("hybrid"),
            ReasoningMethod::LanguageModel => f.write_str("language_model"),
            ReasoningMethod::LlmDriven => f.write_str("llm_driven"),
            ReasoningMethod::GraphFallback { strategy, reason } => {
                write!(f, "graph_fallback({strategy}: {reason})")
            }
            ReasoningMethod::NoEvidence => f.write_str("no_evidence"),
        }
    }
}

/// The unit returned to callers. Always fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub answer: String,
    /// In [0, 1].
    pub confidence: f64,
    /// Human-readable steps explaining the answer.
    pub reasoning_path: Vec<String>,
    pub supporting_triples: Vec<Triple>,
    pub method: ReasoningMethod,
    /// Hops in the underlying chain, 0 when not chain-based.
    pub depth: usize,
}

impl ReasoningResult {
    /// The result for a question nothing in the graph can answer.
    pub fn no_evidence() -> Self {
        Self {
            answer: "No relevant information found in the knowledge graph.".into(),
            confidence: 0.0,
            reasoning_path: Vec::new(),
            supporting_triples: Vec::new(),
            method: ReasoningMethod::NoEvidence,
            depth: 0,
        }
    }
}

/// Orchestration strategy, chosen explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Chains and centrality only; never calls the answer service.
    #[serde(rename = "graph")]
    GraphOnly,
    /// Graph evidence first, the service when the question needs it.
    #[serde(rename = "hybrid")]
    Hybrid,
    /// The service is primary; the graph supplies a planned evidence bundle.
    #[serde(rename = "llm")]
    LanguageModel,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::GraphOnly, Strategy::Hybrid, Strategy::LanguageModel];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::GraphOnly => "graph",
            Strategy::Hybrid => "hybrid",
            Strategy::LanguageModel => "llm",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ReasonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| ReasonError::UnknownStrategy { name: s.to_string() })
    }
}

/// Round to three decimal places.
pub(crate) fn round3(x: f64) -> f64 {
    (x * 1_000.0).round() / 1_000.0
}

//! Rich diagnostic error types for the kquest engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly what went wrong
//! and how to fix it. Expected runtime conditions (absent entities, missing
//! paths, a failing answer service) are *not* errors: they are recovered into
//! typed results by the components themselves.

use miette::Diagnostic;
use thiserror::Error;

use crate::answer::AnswerError;

/// Top-level error type for the kquest engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum KquestError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Reason(#[from] ReasonError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Answer(#[from] AnswerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("unsupported centrality metric: \"{metric}\"")]
    #[diagnostic(
        code(kquest::graph::unsupported_metric),
        help(
            "Supported metrics are: degree, in_degree, out_degree, \
             betweenness, closeness, pagerank."
        )
    )]
    UnsupportedMetric { metric: String },

    #[error("pagerank did not converge within {iterations} iterations (residual {residual:.3e})")]
    #[diagnostic(
        code(kquest::graph::pagerank_divergence),
        help(
            "Increase `centrality.max_iterations` or loosen `centrality.tolerance`. \
             Callers of `centrality()` never see this error: the analyzer falls \
             back to degree centrality instead."
        )
    )]
    PageRankDivergence { iterations: usize, residual: f64 },

    #[error("community detection failed: {message}")]
    #[diagnostic(
        code(kquest::graph::community_detection),
        help(
            "Modularity optimisation needs at least one edge. The analyzer \
             recovers from this by reporting connected components instead."
        )
    )]
    CommunityDetection { message: String },
}

// ---------------------------------------------------------------------------
// Reasoning errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ReasonError {
    #[error("unknown reasoning strategy: \"{name}\"")]
    #[diagnostic(
        code(kquest::reason::unknown_strategy),
        help("Valid strategies are: graph, hybrid, llm.")
    )]
    UnknownStrategy { name: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(kquest::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    #[diagnostic(
        code(kquest::config::parse),
        help("Check the TOML syntax. Unknown sections are rejected, missing fields use defaults.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(kquest::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(kquest::config::invalid),
        help("Fix the offending value in the config file or leave it out to use the default.")
    )]
    Invalid { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_converts_into_top_level() {
        let err: KquestError = GraphError::UnsupportedMetric {
            metric: "eigen".into(),
        }
        .into();
        assert!(matches!(err, KquestError::Graph(_)));
        assert_eq!(err.to_string(), "unsupported centrality metric: \"eigen\"");
    }

    #[test]
    fn unknown_strategy_is_a_reasoning_error() {
        let err: KquestError = ReasonError::UnknownStrategy {
            name: "auto".into(),
        }
        .into();
        assert!(matches!(err, KquestError::Reason(_)));
        let code = err.code().map(|c| c.to_string()).unwrap_or_default();
        assert_eq!(code, "kquest::reason::unknown_strategy");
    }

    #[test]
    fn diagnostic_codes_are_namespaced() {
        let err = ConfigError::Invalid {
            message: "x".into(),
        };
        let code = err.code().map(|c| c.to_string()).unwrap_or_default();
        assert_eq!(code, "kquest::config::invalid");
    }
}

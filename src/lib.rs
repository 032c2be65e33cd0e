// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # kquest
//!
//! A knowledge graph reasoning engine: answers natural-language questions
//! over a set of subject–predicate–object triples, optionally consulting an
//! external language model.
//!
//! ## Architecture
//!
//! - **Entity graph** (`graph::index`): triples indexed as a petgraph multigraph
//!   with dense entity ids, rebuilt atomically behind a [`graph::index::GraphHandle`]
//! - **Traversal and paths** (`graph::traverse`, `graph::paths`): BFS/DFS,
//!   shortest paths and bounded simple-path enumeration
//! - **Analytics** (`graph::analytics`, `graph::community`): degree, betweenness,
//!   closeness and PageRank centrality, communities, structure reports
//! - **Reasoning** (`reason`): multi-step chains, query analysis, evidence
//!   gathering
//! - **Answer service** (`answer`): the language-model seam, with a decoder
//!   chain for untrusted replies and an Ollama implementation
//! - **Orchestration** (`orchestrator`): graph-only, hybrid and
//!   language-model-driven strategies with graceful fallback
//!
//! ## Library usage
//!
//! ```no_run
//! use kquest::config::EngineConfig;
//! use kquest::graph::{KnowledgeGraph, Triple};
//! use kquest::orchestrator::ReasoningOrchestrator;
//! use kquest::reason::Strategy;
//!
//! # async fn demo() {
//! let kg = KnowledgeGraph::from_triples(vec![
//!     Triple::new("Paris", "capital_of", "France").with_confidence(0.9),
//!     Triple::new("France", "part_of", "Europe").with_confidence(0.8),
//! ]);
//! let orchestrator = ReasoningOrchestrator::new(EngineConfig::default());
//! let result = orchestrator.answer(&kg, "Where is Paris?", Strategy::GraphOnly).await;
//! println!("{} ({:.2})", result.answer, result.confidence);
//! # }
//! ```

pub mod answer;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod orchestrator;
pub mod reason;

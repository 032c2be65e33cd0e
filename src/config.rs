//! Engine configuration, persisted as TOML.
//!
//! An [`EngineConfig`] is an immutable value handed to each component at
//! construction. Nothing in the engine mutates it afterwards; to change a
//! setting, build a new component from a new config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reason::chain::ChainDirection;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration. Every section is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub centrality: CentralityConfig,
    #[serde(default)]
    pub orchestration: OrchestrationConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub ollama: OllamaConfig,
}

/// Chain reasoning and graph-only query settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Maximum hops in a reasoning chain.
    pub max_depth: usize,
    /// Results returned by a graph-only query.
    pub max_results: usize,
    /// Top-PageRank entities used to pad sparse graph-only results.
    pub notable_entities: usize,
    /// Edge bound for all-paths enumeration.
    pub max_path_length: usize,
    /// Which edges a chain may follow.
    pub chain_direction: ChainDirection,
    /// Cap on chains enumerated per start entity; absent means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_chains_per_entity: Option<usize>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_results: 5,
            notable_entities: 3,
            max_path_length: 5,
            chain_direction: ChainDirection::Forward,
            max_chains_per_entity: None,
        }
    }
}

/// Centrality and structure-analysis settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CentralityConfig {
    /// PageRank damping factor, strictly between 0 and 1.
    pub damping: f64,
    pub max_iterations: usize,
    /// L1 convergence tolerance per node.
    pub tolerance: f64,
    /// Length of the top-N lists in structure reports.
    pub top_n: usize,
}

impl Default for CentralityConfig {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
            top_n: 5,
        }
    }
}

/// Graph vs. service weights for one intent category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlendWeights {
    pub graph: f64,
    pub service: f64,
}

impl BlendWeights {
    pub const fn new(graph: f64, service: f64) -> Self {
        Self { graph, service }
    }

    pub fn blend(&self, graph_confidence: f64, service_confidence: f64) -> f64 {
        (self.graph * graph_confidence + self.service * service_confidence).clamp(0.0, 1.0)
    }
}

/// Hybrid blend weights per intent category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HybridWeights {
    /// Factual questions lean on the graph.
    pub factual: BlendWeights,
    /// Causal and comparative questions lean on the service.
    pub open_ended: BlendWeights,
    /// Everything else.
    pub default: BlendWeights,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self {
            factual: BlendWeights::new(0.7, 0.3),
            open_ended: BlendWeights::new(0.4, 0.6),
            default: BlendWeights::new(0.5, 0.5),
        }
    }
}

/// Strategy orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Triples whose mean confidence forms the evidence confidence.
    pub evidence_top_k: usize,
    /// Paths kept in an evidence bundle.
    pub max_evidence_paths: usize,
    /// Upper bound on a search plan's chain depth.
    pub max_search_depth: usize,
    /// Longest shortest-path kept by hybrid path enhancement.
    pub path_hop_limit: usize,
    /// Supporting triples attached to a hybrid result.
    pub supporting_triple_cap: usize,
    /// Service confidence above which a hybrid answer includes the service text.
    pub enhancement_threshold: f64,
    /// Weight of the service's self-reported confidence (LLM-driven).
    pub service_weight: f64,
    /// Weight of the evidence confidence (LLM-driven).
    pub evidence_weight: f64,
    pub hybrid: HybridWeights,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self {
            evidence_top_k: 10,
            max_evidence_paths: 5,
            max_search_depth: 3,
            path_hop_limit: 4,
            supporting_triple_cap: 10,
            enhancement_threshold: 0.5,
            service_weight: 0.7,
            evidence_weight: 0.3,
            hybrid: HybridWeights::default(),
        }
    }
}

/// Call policy for the external answer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            max_retries: 3,
            retry_delay_ms: 1_000,
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Connection settings for the Ollama-backed answer service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Base URL for the Ollama API.
    pub base_url: String,
    /// Model name to use.
    pub model: String,
    /// Transport-level request timeout in seconds.
    pub timeout_secs: u64,
    pub temperature: f64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 120,
            temperature: 0.3,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file and validate.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse TOML text and validate.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::parse(content, "<inline>")
    }

    fn parse(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |message: String| Err(ConfigError::Invalid { message });

        if self.reasoning.max_depth == 0 {
            return invalid("reasoning.max_depth must be at least 1".into());
        }
        if self.reasoning.max_path_length == 0 {
            return invalid("reasoning.max_path_length must be at least 1".into());
        }
        let damping = self.centrality.damping;
        if !(damping > 0.0 && damping < 1.0) {
            return invalid(format!(
                "centrality.damping must be strictly between 0 and 1, got {damping}"
            ));
        }
        if !(self.centrality.tolerance > 0.0) {
            return invalid("centrality.tolerance must be positive".into());
        }
        if self.orchestration.evidence_top_k == 0 {
            return invalid("orchestration.evidence_top_k must be at least 1".into());
        }

        let o = &self.orchestration;
        let weights = [
            ("orchestration.enhancement_threshold", o.enhancement_threshold),
            ("orchestration.service_weight", o.service_weight),
            ("orchestration.evidence_weight", o.evidence_weight),
            ("orchestration.hybrid.factual.graph", o.hybrid.factual.graph),
            ("orchestration.hybrid.factual.service", o.hybrid.factual.service),
            ("orchestration.hybrid.open_ended.graph", o.hybrid.open_ended.graph),
            ("orchestration.hybrid.open_ended.service", o.hybrid.open_ended.service),
            ("orchestration.hybrid.default.graph", o.hybrid.default.graph),
            ("orchestration.hybrid.default.service", o.hybrid.default.service),
        ];
        for (name, value) in weights {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} must be within [0, 1], got {value}"));
            }
        }

        if self.service.timeout_ms == 0 {
            return invalid("service.timeout_ms must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.reasoning.max_depth, 3);
        assert_eq!(cfg.service.timeout(), Duration::from_secs(60));
        assert_eq!(cfg.orchestration.hybrid.factual, BlendWeights::new(0.7, 0.3));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [reasoning]
            max_depth = 2
            chain_direction = "both"

            [service]
            max_retries = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.reasoning.max_depth, 2);
        assert_eq!(cfg.reasoning.chain_direction, ChainDirection::Both);
        assert_eq!(cfg.reasoning.max_results, 5);
        assert_eq!(cfg.service.max_retries, 0);
        assert_eq!(cfg.service.timeout_ms, 60_000);
    }

    #[test]
    fn unknown_section_is_rejected() {
        let err = EngineConfig::from_toml_str("[storage]\nformat = \"rdf\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn out_of_range_values_are_invalid() {
        for toml in [
            "[reasoning]\nmax_depth = 0\n",
            "[centrality]\ndamping = 1.0\n",
            "[orchestration]\nservice_weight = 1.5\n",
            "[service]\ntimeout_ms = 0\n",
        ] {
            let err = EngineConfig::from_toml_str(toml).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { .. }), "{toml}");
        }
    }

    #[test]
    fn config_roundtrip_toml() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("kquest.toml");

        let mut cfg = EngineConfig::default();
        cfg.reasoning.max_results = 8;
        cfg.ollama.model = "qwen2.5".into();
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = EngineConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}

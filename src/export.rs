//! Export types for analysis reports.
//!
//! [`export_analysis`] is a pure function over a graph snapshot: it returns a
//! serializable structure and leaves file I/O and formatting to the caller.

use serde::{Deserialize, Serialize};

use crate::config::CentralityConfig;
use crate::graph::TripleStatistics;
use crate::graph::analytics::{CentralityAnalyzer, CentralityMetric, CentralityReport, GraphAnalysis};
use crate::graph::community::CommunityPartition;
use crate::graph::index::EntityGraph;

/// Full analysis of one graph snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisExport {
    /// Counts, connectivity and top-N centrality lists.
    pub structure: GraphAnalysis,
    /// Community partition of the undirected view.
    pub communities: CommunityPartition,
    /// Complete degree ranking.
    pub degree: CentralityReport,
    /// Complete betweenness ranking.
    pub betweenness: CentralityReport,
    /// Complete PageRank ranking (degree when PageRank did not converge).
    pub pagerank: CentralityReport,
    /// Summary counts over the underlying triples.
    pub statistics: TripleStatistics,
}

/// Analyze `graph` for export.
pub fn export_analysis(graph: &EntityGraph, config: CentralityConfig) -> AnalysisExport {
    let analyzer = CentralityAnalyzer::new(graph, config);
    let export = AnalysisExport {
        structure: analyzer.analyze_structure(),
        communities: analyzer.communities(),
        degree: analyzer.centrality(CentralityMetric::Degree),
        betweenness: analyzer.centrality(CentralityMetric::Betweenness),
        pagerank: analyzer.centrality(CentralityMetric::PageRank),
        statistics: TripleStatistics::from_triples(graph.triples()),
    };
    tracing::info!(
        entities = graph.node_count(),
        communities = export.communities.len(),
        "graph analysis exported"
    );
    export
}

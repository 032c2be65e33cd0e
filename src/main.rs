//! kquest CLI: knowledge graph reasoning over a JSON triple file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use kquest::answer::ollama::OllamaService;
use kquest::config::EngineConfig;
use kquest::export::export_analysis;
use kquest::graph::KnowledgeGraph;
use kquest::graph::analytics::{CentralityAnalyzer, CentralityMetric, GraphAnalysis};
use kquest::graph::index::EntityGraph;
use kquest::graph::paths;
use kquest::orchestrator::ReasoningOrchestrator;
use kquest::reason::{ReasoningResult, Strategy};

#[derive(Parser)]
#[command(name = "kquest", version, about = "Knowledge graph reasoning engine")]
struct Cli {
    /// TOML configuration file; defaults are used when absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a question over a triple file.
    Query {
        /// JSON array of triples.
        #[arg(long)]
        file: PathBuf,

        /// The question.
        question: String,

        /// Reasoning strategy: graph, hybrid, or llm.
        #[arg(long, default_value = "hybrid")]
        strategy: Strategy,

        /// Never contact the answer service.
        #[arg(long)]
        no_service: bool,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Analyze graph structure, centrality and communities.
    Analyze {
        /// JSON array of triples.
        #[arg(long)]
        file: PathBuf,

        /// Print the full analysis as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Find paths between two entities.
    Path {
        /// JSON array of triples.
        #[arg(long)]
        file: PathBuf,

        /// Source entity.
        from: String,

        /// Target entity.
        to: String,

        /// Enumerate every simple path instead of only the shortest.
        #[arg(long)]
        all: bool,

        /// Maximum edges per path with --all (defaults to the configured bound).
        #[arg(long)]
        max_length: Option<usize>,
    },

    /// Rank entities by a centrality metric.
    Centrality {
        /// JSON array of triples.
        #[arg(long)]
        file: PathBuf,

        /// degree, in_degree, out_degree, betweenness, closeness, or pagerank.
        #[arg(default_value = "pagerank")]
        metric: String,

        /// Number of entities to show.
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// Write the effective configuration as TOML.
    InitConfig {
        /// Destination file.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Query {
            file,
            question,
            strategy,
            no_service,
            json,
        } => {
            let kg = load_triples(&file)?;
            let mut orchestrator = ReasoningOrchestrator::new(config.clone());
            if strategy != Strategy::GraphOnly && !no_service {
                let service = OllamaService::new(config.ollama.clone());
                let client = service.clone();
                let available = tokio::task::spawn_blocking(move || client.is_reachable())
                    .await
                    .into_diagnostic()?;
                if available {
                    orchestrator = orchestrator.with_service(Arc::new(service));
                } else {
                    tracing::warn!(
                        url = %config.ollama.base_url,
                        "Ollama is not reachable, answering from the graph only"
                    );
                }
            }

            let result = orchestrator.answer(&kg, &question, strategy).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
            } else {
                print_result(&result);
            }
        }

        Commands::Analyze { file, json } => {
            let kg = load_triples(&file)?;
            let graph = EntityGraph::build(kg.triples());
            let export = export_analysis(&graph, config.centrality);

            if json {
                println!("{}", serde_json::to_string_pretty(&export).into_diagnostic()?);
                return Ok(());
            }

            match &export.structure {
                GraphAnalysis::Empty => println!("Graph is empty."),
                GraphAnalysis::Analyzed(report) => {
                    println!("Entities:   {}", report.node_count);
                    println!("Edges:      {}", report.edge_count);
                    println!("Density:    {:.4}", report.density);
                    println!(
                        "Components: {} weak, {} strong",
                        report.weak_component_count, report.strong_component_count
                    );
                    if let Some(avg) = report.average_path_length {
                        println!("Avg path:   {avg:.4}");
                    }
                    println!("Clustering: {:.4}", report.average_clustering);
                    println!("\nTop PageRank:");
                    for score in &report.top_pagerank {
                        println!("  {}. {} ({:.4})", score.rank, score.entity, score.score);
                    }
                }
            }
            println!("\nCommunities ({:?}):", export.communities.method);
            for community in &export.communities.communities {
                println!("  {}. {}", community.id, community.members.join(", "));
            }
        }

        Commands::Path {
            file,
            from,
            to,
            all,
            max_length,
        } => {
            let kg = load_triples(&file)?;
            let graph = EntityGraph::build(kg.triples());

            if all {
                let bound = max_length.unwrap_or(config.reasoning.max_path_length);
                let found = paths::all_paths(&graph, &from, &to, bound);
                if found.is_empty() {
                    println!("No path from \"{from}\" to \"{to}\" within {bound} hops.");
                }
                for path in &found {
                    println!("  [{}] {}", path.length, path.render());
                }
            } else {
                match paths::shortest_path(&graph, &from, &to) {
                    Some(path) => {
                        println!("{} ({} hops)", path.render(), path.length);
                        for triple in &path.supporting_triples {
                            println!("  {triple}");
                        }
                    }
                    None => println!("No path from \"{from}\" to \"{to}\"."),
                }
            }
        }

        Commands::Centrality { file, metric, top } => {
            let kg = load_triples(&file)?;
            let graph = EntityGraph::build(kg.triples());
            let report = CentralityAnalyzer::new(&graph, config.centrality).centrality_by_name(&metric)?;

            if report.fell_back() {
                println!(
                    "{} did not converge; showing {} instead.",
                    report.requested, report.used
                );
            }
            let label = match report.used {
                CentralityMetric::PageRank => "PageRank".to_string(),
                other => other.to_string(),
            };
            println!("Top {top} by {label}:");
            for score in report.top(top) {
                println!("  {}. {} ({:.4})", score.rank, score.entity, score.score);
            }
        }

        Commands::InitConfig { path } => {
            config.save(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
    }

    Ok(())
}

fn load_triples(path: &Path) -> Result<KnowledgeGraph> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    let kg: KnowledgeGraph = serde_json::from_str(&content).into_diagnostic()?;
    tracing::debug!(triples = kg.len(), file = %path.display(), "triples loaded");
    Ok(kg)
}

fn print_result(result: &ReasoningResult) {
    println!("{}", result.answer);
    println!("\nConfidence: {:.3}  Method: {}", result.confidence, result.method);
    if !result.reasoning_path.is_empty() {
        println!("\nReasoning:");
        for step in &result.reasoning_path {
            println!("  - {step}");
        }
    }
    if !result.supporting_triples.is_empty() {
        println!("\nSupporting facts:");
        for triple in &result.supporting_triples {
            println!("  {triple} ({:.2})", triple.confidence);
        }
    }
}

//! Heuristic query analysis and search planning.
//!
//! No NLP: intent comes from cue words (English and Chinese), keywords from a
//! script-aware regex, and target entities and relations from substring
//! matches against what the graph actually contains.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::graph::index::EntityGraph;

static WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[一-鿿]+|[A-Za-z]+").unwrap());

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "can", "do", "does", "for", "from", "has",
    "have", "how", "in", "is", "it", "of", "on", "or", "that", "the", "this", "to", "was",
    "were", "what", "when", "where", "which", "who", "why", "with", "about", "between", "me",
    "tell", "什么", "是", "的", "吗", "呢", "什么是",
];

/// Keywords kept in a search plan.
const PLAN_KEYWORDS: usize = 5;

/// What kind of answer a question asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Factual,
    Reasoning,
    Causal,
    Comparative,
    Procedural,
    Temporal,
    Spatial,
}

impl QueryIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryIntent::Factual => "factual",
            QueryIntent::Reasoning => "reasoning",
            QueryIntent::Causal => "causal",
            QueryIntent::Comparative => "comparative",
            QueryIntent::Procedural => "procedural",
            QueryIntent::Temporal => "temporal",
            QueryIntent::Spatial => "spatial",
        }
    }

    /// Causal and comparative questions need open-ended reasoning.
    pub fn is_open_ended(self) -> bool {
        matches!(self, QueryIntent::Causal | QueryIntent::Comparative)
    }

    /// Classify by the first matching cue group; questions without a cue are
    /// treated as procedural.
    pub fn classify(question: &str) -> Self {
        const CUES: &[(QueryIntent, &[&str])] = &[
            (QueryIntent::Factual, &["what is", "what are", "who is", "什么是", "什么"]),
            (QueryIntent::Causal, &["why", "how", "cause", "because", "为什么", "如何", "原因"]),
            (
                QueryIntent::Comparative,
                &["compare", "difference", "versus", " vs ", "比较", "对比", "区别"],
            ),
            (QueryIntent::Temporal, &["when", "what year", "什么时候", "何时"]),
            (QueryIntent::Spatial, &["where", "located", "哪里", "在哪"]),
            (QueryIntent::Reasoning, &["infer", "imply", "related", "relationship", "推理", "关系"]),
        ];

        let lowered = question.to_lowercase();
        CUES.iter()
            .find(|(_, cues)| cues.iter().any(|cue| lowered.contains(cue)))
            .map(|(intent, _)| *intent)
            .unwrap_or(QueryIntent::Procedural)
    }
}

impl fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rough question complexity, from the number of keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn from_keyword_count(count: usize) -> Self {
        match count {
            0..=2 => Complexity::Simple,
            3..=4 => Complexity::Medium,
            _ => Complexity::Complex,
        }
    }

    /// Chain depth a plan should search at this complexity.
    pub fn search_depth(self) -> usize {
        match self {
            Complexity::Simple => 1,
            Complexity::Medium => 2,
            Complexity::Complex => 3,
        }
    }
}

/// Result of analysing one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: QueryIntent,
    pub complexity: Complexity,
    pub keywords: Vec<String>,
    /// Graph entities named in the question.
    pub entities: Vec<String>,
    /// Whether graph evidence alone is unlikely to answer well.
    pub requires_service: bool,
}

impl QueryAnalysis {
    pub fn analyze(question: &str, graph: &EntityGraph) -> Self {
        let intent = QueryIntent::classify(question);
        let keywords = extract_keywords(question);
        let complexity = Complexity::from_keyword_count(keywords.len());
        Self {
            intent,
            complexity,
            requires_service: complexity != Complexity::Simple || intent.is_open_ended(),
            entities: mentioned_entities(graph, question),
            keywords,
        }
    }
}

/// Words of two or more characters that are not stop words, in question
/// order, without repeats.
pub fn extract_keywords(question: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for m in WORD_RE.find_iter(question) {
        let word = m.as_str();
        if word.chars().count() < 2 || STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        if !keywords.iter().any(|k| k.eq_ignore_ascii_case(word)) {
            keywords.push(word.to_string());
        }
    }
    keywords
}

/// Graph entities whose names occur in `question`, case-insensitively, in
/// entity order.
pub fn mentioned_entities(graph: &EntityGraph, question: &str) -> Vec<String> {
    let lowered = question.to_lowercase();
    graph
        .entities()
        .filter(|name| !name.is_empty() && lowered.contains(&name.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Graph predicates named in `question`; `part_of` also matches "part of".
pub fn mentioned_relations(graph: &EntityGraph, question: &str) -> Vec<String> {
    let lowered = question.to_lowercase();
    let mut relations: Vec<String> = Vec::new();
    for triple in graph.triples() {
        let predicate = triple.predicate.to_lowercase();
        if predicate.is_empty() || relations.iter().any(|r| r == &triple.predicate) {
            continue;
        }
        if lowered.contains(&predicate) || lowered.contains(&predicate.replace('_', " ")) {
            relations.push(triple.predicate.clone());
        }
    }
    relations
}

/// What to look for in the graph, and how deep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlan {
    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub relations: Vec<String>,
    /// Human-readable description of the search, passed to the service.
    pub reasoning_steps: Vec<String>,
    /// Chain depth, at least 1.
    pub depth: usize,
}

impl SearchPlan {
    pub fn build(
        question: &str,
        analysis: &QueryAnalysis,
        graph: &EntityGraph,
        max_search_depth: usize,
    ) -> Self {
        let keywords: Vec<String> = analysis.keywords.iter().take(PLAN_KEYWORDS).cloned().collect();
        let entities = analysis.entities.clone();
        let relations = mentioned_relations(graph, question);
        let depth = analysis.complexity.search_depth().min(max_search_depth).max(1);

        let mut reasoning_steps = Vec::new();
        if !keywords.is_empty() {
            reasoning_steps.push(format!("Find facts mentioning: {}", keywords.join(", ")));
        }
        if !entities.is_empty() {
            reasoning_steps.push(format!("Expand the neighbourhood of: {}", entities.join(", ")));
            reasoning_steps.push(format!("Follow reasoning chains up to {depth} hops"));
        }
        if !relations.is_empty() {
            reasoning_steps.push(format!("Collect relations: {}", relations.join(", ")));
        }
        if entities.len() >= 2 {
            reasoning_steps.push("Connect the named entities by shortest paths".into());
        }
        reasoning_steps.push(format!("Answer the {} question from the evidence", analysis.intent));

        Self {
            keywords,
            entities,
            relations,
            reasoning_steps,
            depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Triple;

    fn graph() -> EntityGraph {
        EntityGraph::build(&[
            Triple::new("Paris", "capital_of", "France"),
            Triple::new("France", "part_of", "Europe"),
        ])
    }

    #[test]
    fn classifies_cue_words() {
        assert_eq!(QueryIntent::classify("What is Paris?"), QueryIntent::Factual);
        assert_eq!(QueryIntent::classify("Why is the sky blue"), QueryIntent::Causal);
        assert_eq!(QueryIntent::classify("比较 Rust 和 Go"), QueryIntent::Comparative);
        assert_eq!(QueryIntent::classify("When did it open?"), QueryIntent::Temporal);
        assert_eq!(QueryIntent::classify("Where lies Paris"), QueryIntent::Spatial);
        assert_eq!(QueryIntent::classify("List the steps"), QueryIntent::Procedural);
        assert!(QueryIntent::Comparative.is_open_ended());
        assert!(!QueryIntent::Factual.is_open_ended());
    }

    #[test]
    fn keywords_skip_stop_words_and_short_tokens() {
        assert_eq!(
            extract_keywords("What is the capital of France, a country?"),
            vec!["capital", "France", "country"]
        );
        assert_eq!(extract_keywords("巴黎是法国的首都"), vec!["巴黎是法国的首都"]);
        assert!(extract_keywords("a b c").is_empty());
    }

    #[test]
    fn analysis_finds_graph_entities() {
        let analysis = QueryAnalysis::analyze("What is Paris?", &graph());
        assert_eq!(analysis.intent, QueryIntent::Factual);
        assert_eq!(analysis.complexity, Complexity::Simple);
        assert_eq!(analysis.entities, vec!["Paris"]);
        assert!(!analysis.requires_service);

        let open = QueryAnalysis::analyze("Why is Paris in France?", &graph());
        assert!(open.requires_service);
    }

    #[test]
    fn complexity_buckets() {
        assert_eq!(Complexity::from_keyword_count(2), Complexity::Simple);
        assert_eq!(Complexity::from_keyword_count(4), Complexity::Medium);
        assert_eq!(Complexity::from_keyword_count(9), Complexity::Complex);
        assert_eq!(Complexity::Complex.search_depth(), 3);
    }

    #[test]
    fn plan_targets_entities_and_relations() {
        let g = graph();
        let question = "Is Paris part of Europe through France?";
        let analysis = QueryAnalysis::analyze(question, &g);
        let plan = SearchPlan::build(question, &analysis, &g, 2);
        assert_eq!(plan.entities, vec!["Paris", "France", "Europe"]);
        assert_eq!(plan.relations, vec!["part_of"]);
        assert!(plan.keywords.len() <= 5);
        assert!(plan.depth <= 2 && plan.depth >= 1);
        assert!(plan.reasoning_steps.iter().any(|s| s.contains("shortest paths")));
    }
}

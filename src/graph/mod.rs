//! Knowledge graph: triples, the caller-owned triple set, and the entity graph.
//!
//! The knowledge graph is a sequence of triples (subject, predicate, object) with
//! a type tag and a confidence. It is owned by the caller and only read by the
//! engine.
//!
//! - **Triple set** ([`KnowledgeGraph`]): the ordered, read-only input
//! - **Entity graph** ([`index::EntityGraph`]): a `petgraph` multigraph built from a
//!   snapshot of the triple set, with a bidirectional entity index
//! - **Algorithms**: [`traverse`], [`paths`], [`analytics`], [`community`]

pub mod analytics;
pub mod community;
pub mod index;
pub mod paths;
pub mod traverse;

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of fact a triple expresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripleType {
    /// A relation between two entities ("Paris capital_of France").
    EntityRelation,
    /// An attribute value of an entity ("Paris population 2.1M").
    EntityAttribute,
    /// A relation between classes ("Mammal subclass_of Animal").
    ClassRelation,
    /// Class membership ("Rex instance_of Dog").
    InstanceOf,
}

impl TripleType {
    /// All variants, in declaration order.
    pub const ALL: [TripleType; 4] = [
        TripleType::EntityRelation,
        TripleType::EntityAttribute,
        TripleType::ClassRelation,
        TripleType::InstanceOf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TripleType::EntityRelation => "entity_relation",
            TripleType::EntityAttribute => "entity_attribute",
            TripleType::ClassRelation => "class_relation",
            TripleType::InstanceOf => "instance_of",
        }
    }
}

impl fmt::Display for TripleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse bucket of a triple's confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub const ALL: [ConfidenceLevel; 3] = [
        ConfidenceLevel::High,
        ConfidenceLevel::Medium,
        ConfidenceLevel::Low,
    ];

    /// Bucket a confidence: high at 0.8 and above, medium at 0.5 and above.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceLevel::High
        } else if confidence >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// A subject–predicate–object fact.
///
/// Immutable once extracted; the engine reads confidence but never raises it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    /// The subject entity.
    pub subject: String,
    /// The predicate (relation) label.
    pub predicate: String,
    /// The object entity.
    pub object: String,
    /// What kind of fact this is.
    #[serde(rename = "type", default = "default_triple_type")]
    pub triple_type: TripleType,
    /// Confidence score in [0.0, 1.0]; out-of-range input is clamped.
    #[serde(default = "default_confidence", deserialize_with = "clamped_confidence")]
    pub confidence: f64,
    /// Source text the triple was extracted from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_triple_type() -> TripleType {
    TripleType::EntityRelation
}

fn default_confidence() -> f64 {
    1.0
}

fn clamped_confidence<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(f64::deserialize(deserializer)?.clamp(0.0, 1.0))
}

impl Triple {
    /// Create an entity-relation triple with full confidence.
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            triple_type: TripleType::EntityRelation,
            confidence: 1.0,
            source: None,
        }
    }

    /// Set the confidence score, clamped to [0.0, 1.0].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the triple type.
    pub fn with_type(mut self, triple_type: TripleType) -> Self {
        self.triple_type = triple_type;
        self
    }

    pub fn confidence_level(&self) -> ConfidenceLevel {
        ConfidenceLevel::from_confidence(self.confidence)
    }

    /// Whether two triples state the same (subject, predicate, object) fact.
    pub fn same_fact(&self, other: &Triple) -> bool {
        self.subject == other.subject
            && self.predicate == other.predicate
            && self.object == other.object
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} --{}--> {}", self.subject, self.predicate, self.object)
    }
}

/// Edge data stored on petgraph edges.
///
/// `triple_index` points back into the snapshot the graph was built from, so any
/// edge resolves to its originating triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeData {
    /// The predicate label for this edge.
    pub predicate: String,
    /// Index of the originating triple in the build snapshot.
    pub triple_index: usize,
}

/// The caller-owned, ordered set of triples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KnowledgeGraph {
    triples: Vec<Triple>,
}

impl KnowledgeGraph {
    /// Create an empty knowledge graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triples(triples: Vec<Triple>) -> Self {
        Self { triples }
    }

    pub fn push(&mut self, triple: Triple) {
        self.triples.push(triple);
    }

    pub fn triples(&self) -> &[Triple] {
        &self.triples
    }

    pub fn len(&self) -> usize {
        self.triples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triples.is_empty()
    }

    /// Unique subjects, in first-seen order.
    pub fn subjects(&self) -> Vec<&str> {
        unique(self.triples.iter().map(|t| t.subject.as_str()))
    }

    /// Unique objects, in first-seen order.
    pub fn objects(&self) -> Vec<&str> {
        unique(self.triples.iter().map(|t| t.object.as_str()))
    }

    /// Unique predicates, in first-seen order.
    pub fn predicates(&self) -> Vec<&str> {
        unique(self.triples.iter().map(|t| t.predicate.as_str()))
    }

    pub fn triples_by_subject<'a>(&'a self, subject: &'a str) -> impl Iterator<Item = &'a Triple> {
        self.triples.iter().filter(move |t| t.subject == subject)
    }

    pub fn triples_by_object<'a>(&'a self, object: &'a str) -> impl Iterator<Item = &'a Triple> {
        self.triples.iter().filter(move |t| t.object == object)
    }

    pub fn triples_by_predicate<'a>(
        &'a self,
        predicate: &'a str,
    ) -> impl Iterator<Item = &'a Triple> {
        self.triples.iter().filter(move |t| t.predicate == predicate)
    }

    /// Summary counts over the triple set.
    pub fn statistics(&self) -> TripleStatistics {
        TripleStatistics::from_triples(&self.triples)
    }
}

impl From<Vec<Triple>> for KnowledgeGraph {
    fn from(triples: Vec<Triple>) -> Self {
        Self::from_triples(triples)
    }
}

impl FromIterator<Triple> for KnowledgeGraph {
    fn from_iter<I: IntoIterator<Item = Triple>>(iter: I) -> Self {
        Self {
            triples: iter.into_iter().collect(),
        }
    }
}

fn unique<'a>(items: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(*item)).collect()
}

/// Summary counts over a triple set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripleStatistics {
    pub total_triples: usize,
    pub unique_subjects: usize,
    pub unique_objects: usize,
    pub unique_predicates: usize,
    /// Distinct entity names across subjects and objects.
    pub unique_entities: usize,
    /// Count per triple type, in [`TripleType::ALL`] order.
    pub by_type: Vec<(TripleType, usize)>,
    /// Count per confidence level, in [`ConfidenceLevel::ALL`] order.
    pub by_confidence_level: Vec<(ConfidenceLevel, usize)>,
}

impl TripleStatistics {
    pub fn from_triples(triples: &[Triple]) -> Self {
        let subjects: HashSet<&str> = triples.iter().map(|t| t.subject.as_str()).collect();
        let objects: HashSet<&str> = triples.iter().map(|t| t.object.as_str()).collect();
        let predicates: HashSet<&str> = triples.iter().map(|t| t.predicate.as_str()).collect();
        let unique_entities = subjects.union(&objects).count();

        let by_type = TripleType::ALL
            .iter()
            .map(|&ty| (ty, triples.iter().filter(|t| t.triple_type == ty).count()))
            .collect();
        let by_confidence_level = ConfidenceLevel::ALL
            .iter()
            .map(|&level| {
                (
                    level,
                    triples
                        .iter()
                        .filter(|t| t.confidence_level() == level)
                        .count(),
                )
            })
            .collect();

        Self {
            total_triples: triples.len(),
            unique_subjects: subjects.len(),
            unique_objects: objects.len(),
            unique_predicates: predicates.len(),
            unique_entities,
            by_type,
            by_confidence_level,
        }
    }
}

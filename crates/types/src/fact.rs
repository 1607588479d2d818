//! Fact, source and relationship types.
//!
//! A fact is a single objective statement extracted from an external source.
//! Facts gain trust through corroboration by independent sources and lose it
//! permanently when disputed. Relationship edges between facts form the
//! knowledge graph.

use crate::hash::Hash256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::json;

/// Where a fact came from: the source domain and when it was retrieved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Domain name of the origin (e.g. `example.org`).
    pub domain: String,
    /// UNIX seconds at retrieval.
    pub retrieved_at: u64,
}

/// The nature of a link between two facts.
///
/// The closed set is fixed for this protocol version; kinds outside it
/// round-trip untouched through [`RelationKind::Other`] so newer peers can
/// extend the taxonomy without breaking older ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationKind {
    /// The facts are about the same topic.
    Related,
    /// One fact is a likely cause of the other.
    Causation,
    /// One fact chronologically follows the other.
    Chronology,
    /// The facts state opposing information.
    Contrast,
    /// One fact expands on the other.
    Elaboration,
    /// A kind this node does not know; preserved verbatim.
    Other(String),
}

impl RelationKind {
    /// The wire/storage name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            RelationKind::Related => "related",
            RelationKind::Causation => "causation",
            RelationKind::Chronology => "chronology",
            RelationKind::Contrast => "contrast",
            RelationKind::Elaboration => "elaboration",
            RelationKind::Other(s) => s,
        }
    }

    /// Parses a kind name, preserving unknown names.
    pub fn parse(s: &str) -> Self {
        match s {
            "related" => RelationKind::Related,
            "causation" => RelationKind::Causation,
            "chronology" => RelationKind::Chronology,
            "contrast" => RelationKind::Contrast,
            "elaboration" => RelationKind::Elaboration,
            other => RelationKind::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RelationKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(RelationKind::parse(&s))
    }
}

/// An edge of the knowledge graph between two facts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactLink {
    /// Local id of the first fact.
    pub fact_a: u64,
    /// Local id of the second fact.
    pub fact_b: u64,
    /// The nature of the link.
    pub kind: RelationKind,
}

/// Lifecycle stage of a fact, derived from its score and dispute flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactStatus {
    /// Seen from a single source.
    Ingested,
    /// Repeated by an independent source but contradicted.
    Disputed,
    /// Repeated by at least one independent source and undisputed.
    Trusted,
}

/// A single, objective statement extracted from a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    /// Dense positive integer, monotone per node at creation.
    pub id: u64,
    /// Immutable content hash, see [`Fact::compute_hash`].
    pub hash: Hash256,
    /// The extracted statement (trimmed, non-empty UTF-8).
    pub content: String,
    /// Opaque analyzer blob; stored verbatim, never read by consensus.
    #[serde(default = "default_semantics")]
    pub semantics: serde_json::Value,
    /// True iff a confirmed contradiction with another trusted fact exists.
    pub disputed: bool,
    /// Corroboration counter; starts at 1, increases monotonically.
    pub score: u32,
    /// UNIX seconds at creation.
    pub created_at: u64,
    /// Provenance records, one per corroborating domain.
    #[serde(default)]
    pub sources: Vec<SourceRecord>,
}

fn default_semantics() -> serde_json::Value {
    json!({})
}

impl Fact {
    /// Content hash: SHA-256 over the trimmed statement bytes.
    ///
    /// Identity is content-addressed so that independent nodes ingesting the
    /// same statement derive the same hash and the network seals it exactly
    /// once.
    pub fn compute_hash(content: &str) -> Hash256 {
        Hash256::digest(content.trim().as_bytes())
    }

    /// Builds a new ingested fact (score 1) from a first sighting.
    pub fn new(id: u64, content: String, semantics: serde_json::Value, created_at: u64) -> Self {
        let hash = Self::compute_hash(&content);
        Self {
            id,
            hash,
            content,
            semantics,
            disputed: false,
            score: 1,
            created_at,
            sources: Vec::new(),
        }
    }

    /// Repeated by at least one independent source.
    pub fn is_corroborated(&self) -> bool {
        self.score >= 2
    }

    /// Corroborated and not disputed: eligible for sealing.
    pub fn is_trusted(&self) -> bool {
        self.is_corroborated() && !self.disputed
    }

    /// Derived lifecycle stage.
    pub fn status(&self) -> FactStatus {
        if self.disputed {
            FactStatus::Disputed
        } else if self.is_corroborated() {
            FactStatus::Trusted
        } else {
            FactStatus::Ingested
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = Fact::compute_hash("the sky is blue");
        let b = Fact::compute_hash("the sky is blue");
        let c = Fact::compute_hash("the sky is green");
        assert_eq!(a, b);
        assert_ne!(a, c);
        // Surrounding whitespace does not change identity.
        assert_eq!(Fact::compute_hash("  the sky is blue "), a);
    }

    #[test]
    fn lifecycle_thresholds() {
        let mut fact = Fact::new(1, "water boils at 100C".into(), json!({}), 1700000000);
        assert_eq!(fact.status(), FactStatus::Ingested);
        assert!(!fact.is_trusted());

        fact.score = 2;
        assert_eq!(fact.status(), FactStatus::Trusted);
        assert!(fact.is_trusted());

        fact.disputed = true;
        assert_eq!(fact.status(), FactStatus::Disputed);
        assert!(!fact.is_trusted());
    }

    #[test]
    fn relation_kind_round_trips_unknown_names() {
        for name in ["related", "causation", "chronology", "contrast", "elaboration"] {
            let kind = RelationKind::parse(name);
            assert_eq!(kind.as_str(), name);
            assert!(!matches!(kind, RelationKind::Other(_)));
        }
        let exotic = RelationKind::parse("refutation");
        assert_eq!(exotic, RelationKind::Other("refutation".into()));
        let json = serde_json::to_string(&exotic).unwrap();
        let back: RelationKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, exotic);
    }

    #[test]
    fn fact_serde_round_trip() {
        let fact = Fact::new(7, "granite is igneous".into(), json!({"entities": []}), 42);
        let json = serde_json::to_string(&fact).unwrap();
        let back: Fact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fact);
    }
}

//! Fact lifecycle operations.
//!
//! Facts enter at score 1 from a single source. A sighting from a new,
//! independent domain corroborates (score + 1); the same domain repeating
//! itself does not. Disputes are one-way and permanent.

use crate::{FactLedger, LedgerError, Result};
use axiom_types::{Fact, FactLink, Hash256, RelationKind};
use tracing::info;

/// What happened to an ingested statement.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// The stored fact after the operation.
    pub fact: Fact,
    /// True when this sighting corroborated an existing fact.
    pub corroborated: bool,
}

impl FactLedger {
    /// Ingests a statement from `domain`. First sighting stores it at
    /// score 1; a repeat from a new domain corroborates it; a repeat from a
    /// known domain changes nothing.
    pub fn ingest_fact(
        &self,
        content: &str,
        semantics: &serde_json::Value,
        domain: &str,
        now: u64,
    ) -> Result<IngestOutcome> {
        let content = content.trim();
        if content.is_empty() {
            return Err(LedgerError::EmptyContent);
        }

        let hash = Fact::compute_hash(content);
        if let Some(existing) = self.db().get_fact_by_hash(&hash)? {
            let new_domain = self.db().attach_source(existing.id, domain, now)?;
            if new_domain {
                let score = self.db().increment_score(existing.id)?;
                info!(fact = existing.id, score, domain, "fact corroborated");
            }
            let fact = self
                .db()
                .get_fact_by_id(existing.id)?
                .ok_or_else(|| LedgerError::Storage(axiom_storage::StorageError::NotFound(
                    format!("fact {}", existing.id),
                )))?;
            return Ok(IngestOutcome {
                fact,
                corroborated: new_domain,
            });
        }

        let fact = self.db().insert_fact(content, semantics, now)?;
        self.db().attach_source(fact.id, domain, now)?;
        info!(fact = fact.id, hash = %fact.hash, domain, "fact ingested");
        let fact = self
            .db()
            .get_fact_by_id(fact.id)?
            .unwrap_or(fact);
        Ok(IngestOutcome {
            fact,
            corroborated: false,
        })
    }

    /// Inserts a knowledge-graph edge between two facts.
    pub fn insert_relationship(&self, fact_a: u64, fact_b: u64, kind: RelationKind) -> Result<()> {
        self.db().insert_link(fact_a, fact_b, &kind)?;
        info!(fact_a, fact_b, kind = %kind, "relationship inserted");
        Ok(())
    }

    /// Marks two facts as mutually contradicted. Both become permanently
    /// ineligible for sealing and are linked with a `contrast` edge.
    pub fn mark_disputed(&self, fact_a: u64, fact_b: u64) -> Result<()> {
        self.db().mark_disputed(fact_a, fact_b)?;
        info!(fact_a, fact_b, "facts marked disputed");
        Ok(())
    }

    /// A fact together with its neighborhood in the knowledge graph.
    pub fn fact_context(&self, hash: &Hash256) -> Result<Option<(Fact, Vec<(FactLink, Fact)>)>> {
        let Some(fact) = self.db().get_fact_by_hash(hash)? else {
            return Ok(None);
        };
        let mut neighbors = Vec::new();
        for link in self.db().links_of(fact.id)? {
            let other_id = if link.fact_a == fact.id {
                link.fact_b
            } else {
                link.fact_a
            };
            if let Some(other) = self.db().get_fact_by_id(other_id)? {
                neighbors.push((link, other));
            }
        }
        Ok(Some((fact, neighbors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axiom_storage::LedgerDb;
    use serde_json::json;
    use std::sync::Arc;

    fn ledger() -> FactLedger {
        FactLedger::new(Arc::new(LedgerDb::open_in_memory().unwrap())).unwrap()
    }

    #[test]
    fn ingest_then_corroborate_from_new_domain() {
        let ledger = ledger();
        let first = ledger
            .ingest_fact("mars has two moons", &json!({}), "alpha.example", 10)
            .unwrap();
        assert!(!first.corroborated);
        assert_eq!(first.fact.score, 1);

        let again = ledger
            .ingest_fact("mars has two moons", &json!({}), "alpha.example", 11)
            .unwrap();
        assert!(!again.corroborated);
        assert_eq!(again.fact.score, 1);

        let second = ledger
            .ingest_fact("mars has two moons", &json!({}), "beta.example", 12)
            .unwrap();
        assert!(second.corroborated);
        assert_eq!(second.fact.score, 2);
        assert!(second.fact.is_trusted());
        assert_eq!(second.fact.id, first.fact.id);
    }

    #[test]
    fn empty_content_is_rejected() {
        let ledger = ledger();
        assert!(matches!(
            ledger.ingest_fact("   ", &json!({}), "alpha.example", 0),
            Err(LedgerError::EmptyContent)
        ));
    }

    #[test]
    fn context_returns_linked_neighbors() {
        let ledger = ledger();
        let a = ledger
            .ingest_fact("the dam was built in 1936", &json!({}), "a.example", 0)
            .unwrap()
            .fact;
        let b = ledger
            .ingest_fact("the dam generates hydropower", &json!({}), "a.example", 0)
            .unwrap()
            .fact;
        ledger
            .insert_relationship(a.id, b.id, RelationKind::Elaboration)
            .unwrap();

        let (fact, neighbors) = ledger.fact_context(&a.hash).unwrap().unwrap();
        assert_eq!(fact.id, a.id);
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].1.id, b.id);
        assert_eq!(neighbors[0].0.kind, RelationKind::Elaboration);
    }
}

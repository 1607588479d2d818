//! The answer-synthesis collaborator seam.
//!
//! `/chat` delegates to whatever [`SearchProvider`] the node was wired
//! with. The built-in [`LocalContentSearch`] ranks facts by naive term
//! overlap so the endpoint is total even without the external engine.

use axiom_storage::LedgerDb;
use axiom_types::Fact;
use std::sync::Arc;

/// Answers free-text queries against the fact store.
pub trait SearchProvider: Send + Sync {
    /// Up to `limit` matching facts, best first.
    fn search(&self, query: &str, limit: usize) -> Vec<Fact>;
}

/// Term-overlap search over local fact content.
pub struct LocalContentSearch {
    db: Arc<LedgerDb>,
}

impl LocalContentSearch {
    /// A provider reading from the given store.
    pub fn new(db: Arc<LedgerDb>) -> Self {
        Self { db }
    }
}

impl SearchProvider for LocalContentSearch {
    fn search(&self, query: &str, limit: usize) -> Vec<Fact> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .filter(|t| t.len() > 2)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let Ok(ids) = self.db.list_fact_ids() else {
            return Vec::new();
        };
        let mut scored: Vec<(usize, Fact)> = Vec::new();
        for id in ids {
            let Ok(Some(fact)) = self.db.get_fact_by_id(id) else {
                continue;
            };
            let content = fact.content.to_lowercase();
            let score = terms.iter().filter(|t| content.contains(t.as_str())).count();
            if score > 0 {
                scored.push((score, fact));
            }
        }
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.id.cmp(&b.1.id)));
        scored.into_iter().take(limit).map(|(_, f)| f).collect()
    }
}

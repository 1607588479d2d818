//! The fact-extraction collaborator seam.
//!
//! The NLP pipeline that extracts candidate statements from source text is
//! an external collaborator. It talks to the node through a [`FactIntake`]
//! handle; the node side drains submissions into the ledger on its
//! ingestion task.

use axiom_ledger::FactLedger;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One candidate statement handed over by the extraction pipeline.
#[derive(Debug, Clone)]
pub struct FactSubmission {
    /// The extracted statement.
    pub content: String,
    /// Opaque analyzer output, stored verbatim.
    pub semantics: serde_json::Value,
    /// Domain of the document the statement came from.
    pub source_domain: String,
}

/// Cloneable handle the extraction collaborator submits through.
#[derive(Clone)]
pub struct FactIntake {
    tx: mpsc::Sender<FactSubmission>,
}

impl FactIntake {
    /// Submits a candidate fact; returns `false` when the node is gone.
    pub async fn submit(&self, submission: FactSubmission) -> bool {
        self.tx.send(submission).await.is_ok()
    }
}

/// Spawns the ingestion task and returns the collaborator handle.
pub fn spawn_intake(
    ledger: Arc<FactLedger>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> (FactIntake, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<FactSubmission>(256);
    let task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                submission = rx.recv() => {
                    let Some(submission) = submission else { break };
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);
                    match ledger.ingest_fact(
                        &submission.content,
                        &submission.semantics,
                        &submission.source_domain,
                        now,
                    ) {
                        Ok(outcome) => debug!(
                            fact = outcome.fact.id,
                            corroborated = outcome.corroborated,
                            "submission ingested"
                        ),
                        Err(e) => warn!(error = %e, "submission rejected"),
                    }
                }
            }
        }
        debug!("ingestion task stopped");
    });
    (FactIntake { tx }, task)
}

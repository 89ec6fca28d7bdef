//! Best-effort background enrichment of file snapshots
//!
//! Enrichment is enqueued after a snapshot commits and lands through the
//! store's guarded seam, possibly after the creating operation returned.
//! Failures are logged and swallowed; nothing here is load-bearing for
//! correctness.

use crossbeam_channel::{unbounded, Sender};
use recoder_store::FileSnapshotStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use uuid::Uuid;

/// What the enricher gets to look at; holds no request-scoped state
#[derive(Debug, Clone)]
pub struct EnrichmentRequest {
    pub snapshot_id: Uuid,
    pub original_path: PathBuf,
    pub snapshot_path: PathBuf,
    pub prompt: String,
}

/// Annotations produced by the enricher
#[derive(Debug, Clone)]
pub struct Enrichment {
    pub summary: String,
    pub analysis: Option<String>,
}

/// An opaque, best-effort summariser (e.g. an AI analysis backend)
pub trait Enricher: Send + Sync + 'static {
    fn summarize(&self, request: &EnrichmentRequest) -> anyhow::Result<Enrichment>;
}

/// Worker thread draining the enrichment queue
///
/// Dropping the worker closes the queue and joins the thread, so queued
/// work either lands or is discarded at deactivation, never half-applied.
pub struct EnrichmentWorker {
    tx: Option<Sender<EnrichmentRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl EnrichmentWorker {
    /// Spawn the worker against a file store
    pub fn spawn(enricher: Arc<dyn Enricher>, store: Arc<FileSnapshotStore>) -> Self {
        let (tx, rx) = unbounded::<EnrichmentRequest>();

        let handle = std::thread::spawn(move || {
            for request in rx {
                let snapshot_id = request.snapshot_id;
                match enricher.summarize(&request) {
                    Ok(enrichment) => {
                        if let Err(err) = store.apply_enrichment(
                            snapshot_id,
                            Some(enrichment.summary),
                            enrichment.analysis,
                        ) {
                            tracing::warn!(snapshot = %snapshot_id, "enrichment write failed: {err}");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(snapshot = %snapshot_id, "enrichment failed: {err}");
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Queue a snapshot for enrichment; never blocks the caller
    pub fn enqueue(&self, request: EnrichmentRequest) {
        if let Some(tx) = &self.tx {
            if tx.send(request).is_err() {
                tracing::warn!("enrichment queue closed; request dropped");
            }
        }
    }
}

impl Drop for EnrichmentWorker {
    fn drop(&mut self) {
        // Close the queue, then let the worker drain what it already has
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recoder_store::CacheDir;
    use tempfile::TempDir;

    struct CannedEnricher;

    impl Enricher for CannedEnricher {
        fn summarize(&self, request: &EnrichmentRequest) -> anyhow::Result<Enrichment> {
            Ok(Enrichment {
                summary: format!("summary for {}", request.prompt),
                analysis: None,
            })
        }
    }

    struct FailingEnricher;

    impl Enricher for FailingEnricher {
        fn summarize(&self, _request: &EnrichmentRequest) -> anyhow::Result<Enrichment> {
            anyhow::bail!("backend unavailable")
        }
    }

    fn snapshot_fixture(temp: &TempDir) -> (Arc<FileSnapshotStore>, recoder_store::FileSnapshot) {
        let file = temp.path().join("a.txt");
        std::fs::write(&file, b"content").unwrap();
        let cache = CacheDir::init(temp.path(), None, None).unwrap();
        let store = Arc::new(FileSnapshotStore::bind(cache).unwrap());
        let snapshot = store
            .create_snapshot(&file, "tweak parser", None, None, None)
            .unwrap();
        (store, snapshot)
    }

    #[test]
    fn test_enrichment_lands_after_commit() {
        let temp = TempDir::new().unwrap();
        let (store, snapshot) = snapshot_fixture(&temp);

        let worker = EnrichmentWorker::spawn(Arc::new(CannedEnricher), store.clone());
        worker.enqueue(EnrichmentRequest {
            snapshot_id: snapshot.id,
            original_path: snapshot.original_path.clone(),
            snapshot_path: snapshot.snapshot_path.clone(),
            prompt: snapshot.prompt.clone(),
        });
        drop(worker); // joins the thread, guaranteeing the queue drained

        let enriched = store.get(snapshot.id).unwrap();
        assert_eq!(
            enriched.ai_summary.as_deref(),
            Some("summary for tweak parser")
        );
    }

    #[test]
    fn test_enrichment_failure_is_swallowed() {
        let temp = TempDir::new().unwrap();
        let (store, snapshot) = snapshot_fixture(&temp);

        let worker = EnrichmentWorker::spawn(Arc::new(FailingEnricher), store.clone());
        worker.enqueue(EnrichmentRequest {
            snapshot_id: snapshot.id,
            original_path: snapshot.original_path.clone(),
            snapshot_path: snapshot.snapshot_path.clone(),
            prompt: snapshot.prompt.clone(),
        });
        drop(worker);

        // The snapshot is intact, just unenriched
        let unchanged = store.get(snapshot.id).unwrap();
        assert!(unchanged.ai_summary.is_none());
        assert_eq!(unchanged.prompt, "tweak parser");
    }
}

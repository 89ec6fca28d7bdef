//! CodeRecoder operation surface
//!
//! Binds the snapshot stores to an activated project and exposes the
//! operation set as structured responses. The transport framing that
//! carries these responses is out of scope; this crate never prints, it
//! returns values and logs diagnostics through tracing.

pub mod enrich;
pub mod response;

pub use enrich::{Enricher, Enrichment, EnrichmentRequest, EnrichmentWorker};
pub use response::Response;

use recoder_store::{
    CacheDir, Error, FileSnapshotStore, ProjectStore,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// One activated project: bound cache directory plus both stores
struct ActiveProject {
    cache: CacheDir,
    files: Arc<FileSnapshotStore>,
    projects: ProjectStore,
    enrichment: Option<EnrichmentWorker>,
}

/// Handle through which a client drives the snapshot engine
///
/// Unactivated handles answer every snapshot operation with
/// `NotActivated`. Activation binds the stores and returns the cache
/// directory; it replaces any previously active project on this handle.
pub struct ProjectOps {
    enricher: Option<Arc<dyn Enricher>>,
    active: Option<ActiveProject>,
}

impl ProjectOps {
    /// Handle without an enrichment backend
    pub fn new() -> Self {
        Self {
            enricher: None,
            active: None,
        }
    }

    /// Handle with a best-effort enrichment backend
    pub fn with_enricher(enricher: Arc<dyn Enricher>) -> Self {
        Self {
            enricher: Some(enricher),
            active: None,
        }
    }

    /// Bind the stores to a project root, creating `.CodeRecoder/` if needed
    pub fn activate_project(
        &mut self,
        project_path: &Path,
        name: Option<&str>,
        language: Option<&str>,
    ) -> Response {
        let activated = (|| -> recoder_store::Result<ActiveProject> {
            let cache = CacheDir::init(project_path, name, language)?;
            let files = Arc::new(FileSnapshotStore::bind(cache.clone())?);
            let projects = ProjectStore::bind(cache.clone())?;
            let enrichment = self
                .enricher
                .clone()
                .map(|enricher| EnrichmentWorker::spawn(enricher, files.clone()));
            Ok(ActiveProject {
                cache,
                files,
                projects,
                enrichment,
            })
        })();

        match activated {
            Ok(active) => {
                let cache_directory = active.cache.cache_root().to_path_buf();
                tracing::info!(project = %project_path.display(), "project activated");
                self.active = Some(active);
                Response::success(json!({ "cacheDirectory": cache_directory }))
            }
            Err(err) => Response::failure(&err),
        }
    }

    /// Release the active project; the enrichment queue drains on the way out
    pub fn deactivate_project(&mut self, save_history: bool) -> Response {
        match self.active.take() {
            Some(active) => {
                if save_history {
                    tracing::debug!("deactivating with history retained on disk");
                }
                drop(active);
                Response::success(json!({}))
            }
            None => Response::failure(&Error::NotActivated),
        }
    }

    /// Whether a project is currently activated
    pub fn is_activated(&self) -> bool {
        self.active.is_some()
    }

    pub fn create_file_snapshot(
        &self,
        file_path: &Path,
        prompt: &str,
        session_id: Option<Uuid>,
        metadata: Option<Value>,
    ) -> Response {
        let active = match self.active() {
            Ok(active) => active,
            Err(err) => return Response::failure(&err),
        };

        match active
            .files
            .create_snapshot(file_path, prompt, session_id, None, metadata)
        {
            Ok(snapshot) => {
                if let Some(worker) = &active.enrichment {
                    worker.enqueue(EnrichmentRequest {
                        snapshot_id: snapshot.id,
                        original_path: snapshot.original_path.clone(),
                        snapshot_path: snapshot.snapshot_path.clone(),
                        prompt: snapshot.prompt.clone(),
                    });
                }
                Response::success(json!({
                    "snapshotId": snapshot.id,
                    "sessionId": snapshot.session_id,
                    "fileSize": snapshot.file_size,
                    "fileHash": snapshot.content_hash,
                }))
            }
            Err(err) => Response::failure(&err),
        }
    }

    pub fn restore_file_snapshot(&self, snapshot_id: Uuid) -> Response {
        match self.active() {
            Ok(active) => Response::from_result(active.files.restore_snapshot(snapshot_id)),
            Err(err) => Response::failure(&err),
        }
    }

    pub fn list_file_snapshots(
        &self,
        session_id: Option<Uuid>,
        file_path: Option<&Path>,
        limit: Option<usize>,
    ) -> Response {
        match self.active() {
            Ok(active) => {
                let snapshots = active.files.list_snapshots(session_id, file_path, limit);
                Response::success(json!({ "snapshots": snapshots }))
            }
            Err(err) => Response::failure(&err),
        }
    }

    pub fn delete_file_snapshot(&self, snapshot_id: Uuid) -> Response {
        match self.active() {
            Ok(active) => {
                Response::from_result(active.files.delete_snapshot(snapshot_id).map(|_| json!({})))
            }
            Err(err) => Response::failure(&err),
        }
    }

    pub fn create_project_snapshot(
        &self,
        prompt: &str,
        name: Option<String>,
        tags: Vec<String>,
    ) -> Response {
        match self.active() {
            Ok(active) => match active.projects.create_snapshot(prompt, name, tags) {
                Ok(snapshot) => Response::success(json!({
                    "snapshotId": snapshot.id,
                    "saveNumber": snapshot.save_number,
                    "kind": snapshot.kind,
                    "changedFiles": snapshot.changed_files,
                })),
                Err(err) => Response::failure(&err),
            },
            Err(err) => Response::failure(&err),
        }
    }

    pub fn list_project_snapshots(&self) -> Response {
        match self.active() {
            Ok(active) => {
                let snapshots = active.projects.list_snapshots();
                let fulls = snapshots
                    .iter()
                    .filter(|s| s.restorability == "directly restorable")
                    .count();
                let estimated_total: u64 =
                    snapshots.iter().map(|s| s.estimated_size_bytes).sum();
                let summary = json!({
                    "total": snapshots.len(),
                    "directlyRestorable": fulls,
                    "chained": snapshots.len() - fulls,
                    "estimatedSizeBytes": estimated_total,
                });
                Response::success(json!({ "snapshots": snapshots, "summary": summary }))
            }
            Err(err) => Response::failure(&err),
        }
    }

    pub fn restore_project_snapshot(&self, snapshot_id: Uuid) -> Response {
        match self.active() {
            Ok(active) => Response::from_result(active.projects.restore_snapshot(snapshot_id)),
            Err(err) => Response::failure(&err),
        }
    }

    fn active(&self) -> recoder_store::Result<&ActiveProject> {
        self.active.as_ref().ok_or(Error::NotActivated)
    }
}

impl Default for ProjectOps {
    fn default() -> Self {
        Self::new()
    }
}

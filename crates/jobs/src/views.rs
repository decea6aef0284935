// crates/jobs/src/views.rs
//! Dependent views that fetch derived artifacts once a job completes.

use std::sync::Arc;

use posboard_core::{ApiError, Artifact, ArtifactKind, JobBackend, JobId, Track};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::CompletedJob;

/// Result of one artifact fetch.
#[derive(Debug)]
pub struct ArtifactFetch {
    pub kind: ArtifactKind,
    pub track: Track,
    pub job_id: JobId,
    pub result: Result<Artifact, ApiError>,
}

/// Fetches one kind of artifact for every newly completed job.
///
/// A view only reads the tracker's completion channel; it never writes to
/// tracker state.
pub struct ArtifactView {
    kind: ArtifactKind,
    backend: Arc<dyn JobBackend>,
}

impl ArtifactView {
    pub fn new(kind: ArtifactKind, backend: Arc<dyn JobBackend>) -> Self {
        Self { kind, backend }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    /// Run the view until `token` is cancelled, the completion channel closes,
    /// or `tx` is dropped. A job already completed at spawn time is fetched
    /// immediately.
    pub fn spawn(
        self,
        completed: watch::Receiver<Option<CompletedJob>>,
        tx: mpsc::Sender<ArtifactFetch>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(completed, tx, token))
    }

    async fn run(
        self,
        mut completed: watch::Receiver<Option<CompletedJob>>,
        tx: mpsc::Sender<ArtifactFetch>,
        token: CancellationToken,
    ) {
        let mut last: Option<(Track, JobId)> = None;
        loop {
            let current = completed.borrow_and_update().clone();
            if let Some(done) = current {
                let key = (done.track, done.id.clone());
                if last.as_ref() != Some(&key) {
                    last = Some(key);
                    if !self.fetch(&done, &tx, &token).await {
                        return;
                    }
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                changed = completed.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
    }

    /// Returns false when the view should stop.
    async fn fetch(
        &self,
        done: &CompletedJob,
        tx: &mpsc::Sender<ArtifactFetch>,
        token: &CancellationToken,
    ) -> bool {
        let Some(handle) = done.result_refs.get(&self.kind) else {
            debug!(kind = %self.kind, job_id = %done.id, "no artifact for this job");
            return true;
        };

        let result = tokio::select! {
            _ = token.cancelled() => return false,
            result = self.backend.artifact(self.kind, handle) => result,
        };
        if let Err(e) = &result {
            warn!(kind = %self.kind, job_id = %done.id, error = %e, "artifact fetch failed");
        }

        tx.send(ArtifactFetch {
            kind: self.kind,
            track: done.track,
            job_id: done.id.clone(),
            result,
        })
        .await
        .is_ok()
    }
}

// crates/core/src/job.rs
//! Forward-only state machine for one server-side processing run.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::{ArtifactKind, ArtifactRef, FailureCause, GraphSummary, JobId, JobStatus, Track};
use crate::wire::JobUpdate;

/// Client-side record of a backend job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub track: Track,
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub message: String,
    pub current_step: Option<String>,
    /// Empty until the job is `Completed`.
    pub result_refs: BTreeMap<ArtifactKind, ArtifactRef>,
    pub processing_time_secs: Option<f64>,
    pub summary: Option<GraphSummary>,
    pub failure: Option<FailureCause>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of applying an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same status, fields refreshed.
    Refreshed,
    /// Status moved forward.
    Advanced { from: JobStatus, to: JobStatus },
}

/// Why an update was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The job already reached `Completed` or `Failed`.
    Terminal(JobStatus),
    /// The update would move the job backwards.
    Regressed { current: JobStatus, proposed: JobStatus },
}

impl Job {
    /// A freshly submitted job.
    pub fn submitted(track: Track, id: JobId) -> Self {
        let now = Utc::now();
        Self {
            id,
            track,
            status: JobStatus::Pending,
            progress: Some(0),
            message: format!("{track} processing submitted"),
            current_step: None,
            result_refs: BTreeMap::new(),
            processing_time_secs: None,
            summary: None,
            failure: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `Pending -> Processing` when the first status poll starts.
    /// No-op in any other state.
    pub fn begin_processing(&mut self) -> bool {
        if self.status != JobStatus::Pending {
            return false;
        }
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
        true
    }

    /// Apply a polled update under the forward-only rule.
    ///
    /// A `Completed` update installs its result references in the same step;
    /// references carried by non-terminal updates are ignored.
    pub fn apply(&mut self, update: JobUpdate) -> Result<Transition, Rejection> {
        if self.status.is_terminal() {
            return Err(Rejection::Terminal(self.status));
        }
        if update.status.rank() < self.status.rank() {
            return Err(Rejection::Regressed {
                current: self.status,
                proposed: update.status,
            });
        }

        let from = self.status;
        let JobUpdate {
            status,
            progress,
            message,
            current_step,
            processing_time_secs,
            summary,
            result_refs,
        } = update;

        if progress.is_some() {
            self.progress = progress;
        }
        if let Some(message) = message {
            self.message = message;
        }
        if current_step.is_some() {
            self.current_step = current_step;
        }
        if processing_time_secs.is_some() {
            self.processing_time_secs = processing_time_secs;
        }
        if summary.is_some() {
            self.summary = summary;
        }

        match status {
            JobStatus::Completed => {
                self.result_refs = result_refs;
                self.progress = Some(100);
            }
            JobStatus::Failed => {
                self.failure = Some(FailureCause::Backend);
            }
            JobStatus::Pending | JobStatus::Processing => {}
        }
        self.status = status;
        self.updated_at = Utc::now();

        if from == status {
            Ok(Transition::Refreshed)
        } else {
            Ok(Transition::Advanced { from, to: status })
        }
    }

    /// Force the job into `Failed` with a client-side cause.
    pub fn fail(&mut self, cause: FailureCause, message: impl Into<String>) -> Result<Transition, Rejection> {
        if self.status.is_terminal() {
            return Err(Rejection::Terminal(self.status));
        }
        let from = self.status;
        self.status = JobStatus::Failed;
        self.failure = Some(cause);
        self.message = message.into();
        self.updated_at = Utc::now();
        Ok(Transition::Advanced {
            from,
            to: JobStatus::Failed,
        })
    }
}

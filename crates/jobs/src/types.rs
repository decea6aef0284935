// crates/jobs/src/types.rs
//! Snapshots and events published by the tracker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use posboard_core::{ArtifactKind, ArtifactRef, Job, JobId, Track};
use serde::Serialize;

/// Published once per job when it reaches `Completed`.
///
/// This is the only value dependent views react to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedJob {
    pub track: Track,
    pub id: JobId,
    pub result_refs: BTreeMap<ArtifactKind, ArtifactRef>,
    pub completed_at: DateTime<Utc>,
}

impl CompletedJob {
    pub(crate) fn from_job(job: &Job) -> Self {
        Self {
            track: job.track,
            id: job.id.clone(),
            result_refs: job.result_refs.clone(),
            completed_at: job.updated_at,
        }
    }
}

/// Immutable view of both tracks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    /// Track whose status panel is shown. The other track's record is kept
    /// but not displayed.
    pub visible: Option<Track>,
    pub auto: Option<Job>,
    pub manual: Option<Job>,
}

impl TrackerSnapshot {
    pub fn job(&self, track: Track) -> Option<&Job> {
        match track {
            Track::Auto => self.auto.as_ref(),
            Track::Manual => self.manual.as_ref(),
        }
    }

    /// The job behind the visible panel.
    pub fn visible_job(&self) -> Option<&Job> {
        self.visible.and_then(|t| self.job(t))
    }
}

/// Lifecycle notification, in the order the tracker applied it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A job was submitted and is now tracked (status `pending`).
    Started { job: Job },
    /// A live job changed (status, progress, message).
    Updated { job: Job },
    Completed { job: Job },
    /// `http_status` is set when the failure came from an HTTP answer, so the
    /// caller can tell a 401 apart.
    Failed { job: Job, http_status: Option<u16> },
    /// A newer submission on the same track replaced this job.
    Superseded { track: Track, id: JobId },
    /// Polling was cancelled without the job reaching a terminal state.
    Stopped { track: Track, id: JobId },
    /// The visible panel switched to `track`.
    Shown { track: Track },
}

impl TrackerEvent {
    pub fn track(&self) -> Track {
        match self {
            TrackerEvent::Started { job }
            | TrackerEvent::Updated { job }
            | TrackerEvent::Completed { job }
            | TrackerEvent::Failed { job, .. } => job.track,
            TrackerEvent::Superseded { track, .. }
            | TrackerEvent::Stopped { track, .. }
            | TrackerEvent::Shown { track } => *track,
        }
    }

    pub fn job(&self) -> Option<&Job> {
        match self {
            TrackerEvent::Started { job }
            | TrackerEvent::Updated { job }
            | TrackerEvent::Completed { job }
            | TrackerEvent::Failed { job, .. } => Some(job),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_visible_job() {
        let manual = Job::submitted(Track::Manual, JobId::new("m1"));
        let snapshot = TrackerSnapshot {
            visible: Some(Track::Manual),
            auto: None,
            manual: Some(manual.clone()),
        };
        assert_eq!(snapshot.visible_job(), Some(&manual));
        assert!(snapshot.job(Track::Auto).is_none());
        assert!(TrackerSnapshot::default().visible_job().is_none());
    }

    #[test]
    fn test_event_serialize() {
        let event = TrackerEvent::Superseded {
            track: Track::Auto,
            id: JobId::new("a1"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"superseded","track":"auto","id":"a1"}"#);

        let job = Job::submitted(Track::Manual, JobId::new("m1"));
        let json = serde_json::to_string(&TrackerEvent::Started { job }).unwrap();
        assert!(json.contains("\"type\":\"started\""));
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"resultRefs\":{}"));
    }
}

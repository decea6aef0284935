// crates/core/src/wire.rs
//! JSON payloads exchanged with the analytics backend.
//!
//! Status payloads vary by track and most keys are optional, so every optional
//! key is an `Option<T>` and the payload is turned into a [`JobUpdate`] before
//! it reaches the tracker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ArtifactKind, ArtifactRef, GraphSummary, JobId, JobStatus, Track};

/// `{ "process_id": ... }` returned by a successful submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitResponse {
    pub process_id: String,
}

/// `{ "error": ... }` body on non-2xx answers.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Status string reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl From<WireStatus> for JobStatus {
    fn from(s: WireStatus) -> Self {
        match s {
            WireStatus::Pending => JobStatus::Pending,
            WireStatus::Processing => JobStatus::Processing,
            WireStatus::Completed => JobStatus::Completed,
            WireStatus::Failed => JobStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PosDataSummary {
    #[serde(default)]
    pub rules_count: Option<u64>,
    #[serde(default)]
    pub nodes_count: Option<u64>,
    #[serde(default)]
    pub edges_count: Option<u64>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusteringSummary {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub cluster_count: Option<u64>,
}

/// Nested `result_data` block of the automatic track.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultData {
    #[serde(default)]
    pub pos_data: Option<PosDataSummary>,
    #[serde(default)]
    pub clustering: Option<ClusteringSummary>,
    #[serde(default)]
    pub processing_time: Option<f64>,
}

/// Body of `GET /api/posdata/status/{id}` and `/auto-status/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: WireStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub current_step: Option<String>,
    #[serde(default)]
    pub processing_time: Option<f64>,
    #[serde(default)]
    pub result_data: Option<ResultData>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub cluster_filename: Option<String>,
    #[serde(default)]
    pub rules_count: Option<u64>,
    #[serde(default)]
    pub nodes_count: Option<u64>,
    #[serde(default)]
    pub edges_count: Option<u64>,
}

impl StatusPayload {
    /// A bare payload with only the status set.
    pub fn with_status(status: WireStatus) -> Self {
        Self {
            status,
            message: None,
            progress: None,
            current_step: None,
            processing_time: None,
            result_data: None,
            filename: None,
            cluster_filename: None,
            rules_count: None,
            nodes_count: None,
            edges_count: None,
        }
    }

    /// Validate the payload into an update for job `id` on `track`.
    ///
    /// Result references are only built for `completed` payloads.
    pub fn into_update(self, track: Track, id: &JobId) -> JobUpdate {
        let status = JobStatus::from(self.status);
        let empty = ResultData::default();
        let result_data = self.result_data.as_ref().unwrap_or(&empty);

        let progress = self
            .progress
            .filter(|p| p.is_finite())
            .map(|p| p.round().clamp(0.0, 100.0) as u8);

        let summary = summary_from(&self, result_data);
        let processing_time_secs = self.processing_time.or(result_data.processing_time);

        let result_refs = if status == JobStatus::Completed {
            result_refs_for(track, id, &self, result_data)
        } else {
            BTreeMap::new()
        };

        JobUpdate {
            status,
            progress,
            message: self.message,
            current_step: self.current_step,
            processing_time_secs,
            summary,
            result_refs,
        }
    }
}

fn summary_from(payload: &StatusPayload, result_data: &ResultData) -> Option<GraphSummary> {
    if let Some(pos) = &result_data.pos_data {
        if pos.rules_count.is_some() || pos.nodes_count.is_some() || pos.edges_count.is_some() {
            return Some(GraphSummary {
                rules_count: pos.rules_count.unwrap_or(0),
                nodes_count: pos.nodes_count.unwrap_or(0),
                edges_count: pos.edges_count.unwrap_or(0),
            });
        }
    }
    if payload.rules_count.is_some() || payload.nodes_count.is_some() || payload.edges_count.is_some()
    {
        return Some(GraphSummary {
            rules_count: payload.rules_count.unwrap_or(0),
            nodes_count: payload.nodes_count.unwrap_or(0),
            edges_count: payload.edges_count.unwrap_or(0),
        });
    }
    None
}

fn result_refs_for(
    track: Track,
    id: &JobId,
    payload: &StatusPayload,
    result_data: &ResultData,
) -> BTreeMap<ArtifactKind, ArtifactRef> {
    let pos_file = payload
        .filename
        .clone()
        .or_else(|| result_data.pos_data.as_ref().and_then(|p| p.filename.clone()));
    let cluster_file = payload
        .cluster_filename
        .clone()
        .or_else(|| result_data.clustering.as_ref().and_then(|c| c.filename.clone()));

    let mut refs = BTreeMap::new();
    match track {
        Track::Manual => {
            if let Some(name) = pos_file {
                refs.insert(ArtifactKind::Pos, ArtifactRef::File(name));
            }
            if let Some(name) = cluster_file {
                refs.insert(ArtifactKind::Clustering, ArtifactRef::File(name));
            }
            refs.insert(ArtifactKind::Network, ArtifactRef::Keyed(id.clone()));
            refs.insert(ArtifactKind::Radar, ArtifactRef::Keyed(id.clone()));
        }
        Track::Auto => {
            for kind in ArtifactKind::ALL {
                refs.insert(kind, ArtifactRef::Keyed(id.clone()));
            }
            if let Some(name) = pos_file {
                refs.insert(ArtifactKind::Pos, ArtifactRef::File(name));
            }
            if let Some(name) = cluster_file {
                refs.insert(ArtifactKind::Clustering, ArtifactRef::File(name));
            }
        }
    }
    refs
}

/// Validated status update ready to be applied to a [`crate::Job`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub current_step: Option<String>,
    pub processing_time_secs: Option<f64>,
    pub summary: Option<GraphSummary>,
    pub result_refs: BTreeMap<ArtifactKind, ArtifactRef>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            message: None,
            current_step: None,
            processing_time_secs: None,
            summary: None,
            result_refs: BTreeMap::new(),
        }
    }
}

/// Body of `POST /api/posdata/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPreview {
    pub columns: Vec<String>,
    #[serde(default)]
    pub row_count: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST /api/posdata/llm-mapping`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmMappingResponse {
    #[serde(default)]
    pub mapping: serde_json::Map<String, serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(json: &str) -> StatusPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_processing_payload_has_no_refs() {
        let update = parse(r#"{"status":"processing","progress":40,"message":"running"}"#)
            .into_update(Track::Manual, &JobId::new("m1"));
        assert_eq!(update.status, JobStatus::Processing);
        assert_eq!(update.progress, Some(40));
        assert!(update.result_refs.is_empty());
    }

    #[test]
    fn test_manual_completion_refs() {
        let update = parse(
            r#"{"status":"completed","filename":"out.csv","rules_count":12,"nodes_count":5,"edges_count":7}"#,
        )
        .into_update(Track::Manual, &JobId::new("m1"));

        assert_eq!(
            update.result_refs.get(&ArtifactKind::Pos),
            Some(&ArtifactRef::File("out.csv".into()))
        );
        assert!(!update.result_refs.contains_key(&ArtifactKind::Clustering));
        assert_eq!(
            update.result_refs.get(&ArtifactKind::Radar),
            Some(&ArtifactRef::Keyed(JobId::new("m1")))
        );
        assert_eq!(
            update.summary,
            Some(GraphSummary {
                rules_count: 12,
                nodes_count: 5,
                edges_count: 7
            })
        );
    }

    #[test]
    fn test_auto_completion_prefers_result_data() {
        let update = parse(
            r#"{
                "status": "completed",
                "message": "done",
                "result_data": {
                    "pos_data": {"rules_count": 3, "nodes_count": 2, "edges_count": 1},
                    "clustering": {"filename": "clusters.csv"},
                    "processing_time": 12.5
                }
            }"#,
        )
        .into_update(Track::Auto, &JobId::new("a1"));

        assert_eq!(update.result_refs.len(), 4);
        assert_eq!(
            update.result_refs.get(&ArtifactKind::Clustering),
            Some(&ArtifactRef::File("clusters.csv".into()))
        );
        assert_eq!(
            update.result_refs.get(&ArtifactKind::Pos),
            Some(&ArtifactRef::Keyed(JobId::new("a1")))
        );
        assert_eq!(update.processing_time_secs, Some(12.5));
        assert_eq!(update.summary.map(|s| s.rules_count), Some(3));
    }

    #[test]
    fn test_update_keeps_top_level_fields_alongside_result_data() {
        let update = parse(
            r#"{
                "status": "completed",
                "message": "analysis finished",
                "current_step": "export",
                "result_data": {"pos_data": {"filename": "pos_m1.csv", "edges_count": 4}}
            }"#,
        )
        .into_update(Track::Manual, &JobId::new("m1"));

        assert_eq!(update.message.as_deref(), Some("analysis finished"));
        assert_eq!(update.current_step.as_deref(), Some("export"));
        assert_eq!(
            update.result_refs.get(&ArtifactKind::Pos),
            Some(&ArtifactRef::File("pos_m1.csv".into()))
        );
        assert_eq!(
            update.summary,
            Some(GraphSummary {
                rules_count: 0,
                nodes_count: 0,
                edges_count: 4
            })
        );
    }

    #[test]
    fn test_progress_is_clamped() {
        let update = parse(r#"{"status":"processing","progress":140.2}"#)
            .into_update(Track::Auto, &JobId::new("a1"));
        assert_eq!(update.progress, Some(100));
        let update = parse(r#"{"status":"processing","progress":-3}"#)
            .into_update(Track::Auto, &JobId::new("a1"));
        assert_eq!(update.progress, Some(0));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(serde_json::from_str::<StatusPayload>(r#"{"status":"exploded"}"#).is_err());
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let payload = parse(r#"{"status":"failed","message":"boom","extra":{"a":1}}"#);
        assert_eq!(payload.status, WireStatus::Failed);
        assert_eq!(payload.message.as_deref(), Some("boom"));
    }
}

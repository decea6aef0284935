// crates/core/src/types.rs
//! Identifiers and enums shared by the client, the tracker and the CLI.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two independent processing pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Backend infers the column layout itself.
    Auto,
    /// Caller supplies the column mapping and association thresholds.
    Manual,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Auto, Track::Manual];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Auto => "auto",
            Track::Manual => "manual",
        }
    }

    /// The track that is hidden when this one becomes visible.
    pub fn other(&self) -> Track {
        match self {
            Track::Auto => Track::Manual,
            Track::Manual => Track::Auto,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque `process_id` assigned by the backend on submission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Lifecycle status of a job as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Position in the forward-only ordering. Both terminal states share the
    /// top rank so neither can replace the other.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::Pending => 0,
            JobStatus::Processing => 1,
            JobStatus::Completed | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named derived result retrievable once a job has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Pos,
    Clustering,
    Network,
    Radar,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Pos,
        ArtifactKind::Clustering,
        ArtifactKind::Network,
        ArtifactKind::Radar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Pos => "pos",
            ArtifactKind::Clustering => "clustering",
            ArtifactKind::Network => "network",
            ArtifactKind::Radar => "radar",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos" => Ok(ArtifactKind::Pos),
            "clustering" | "cluster" => Ok(ArtifactKind::Clustering),
            "network" => Ok(ArtifactKind::Network),
            "radar" => Ok(ArtifactKind::Radar),
            other => Err(format!("unknown artifact kind: {other}")),
        }
    }
}

/// Retrieval handle for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "value", rename_all = "lowercase")]
pub enum ArtifactRef {
    /// A file the backend wrote to its download area.
    File(String),
    /// Fetched by process id plus artifact kind.
    Keyed(JobId),
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactRef::File(name) => write!(f, "file:{name}"),
            ArtifactRef::Keyed(id) => write!(f, "job:{id}"),
        }
    }
}

/// Why a job ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    /// The backend reported `status: "failed"`.
    Backend,
    /// Status could not be fetched (network error, non-2xx, bad payload).
    Transport,
    /// The backend answered 401; the caller has to log in again.
    SessionExpired,
    /// The job did not reach a terminal state within the poll ceiling.
    TimedOut,
}

/// Association-graph counts reported with a completed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSummary {
    pub rules_count: u64,
    pub nodes_count: u64,
    pub edges_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_orders_terminal_last() {
        assert!(JobStatus::Pending.rank() < JobStatus::Processing.rank());
        assert!(JobStatus::Processing.rank() < JobStatus::Completed.rank());
        assert_eq!(JobStatus::Completed.rank(), JobStatus::Failed.rank());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Pending.is_live());
    }

    #[test]
    fn test_track_other() {
        assert_eq!(Track::Auto.other(), Track::Manual);
        assert_eq!(Track::Manual.other(), Track::Auto);
    }

    #[test]
    fn test_artifact_kind_parse() {
        assert_eq!("Radar".parse::<ArtifactKind>(), Ok(ArtifactKind::Radar));
        assert_eq!("cluster".parse::<ArtifactKind>(), Ok(ArtifactKind::Clustering));
        assert!("mindmap".parse::<ArtifactKind>().is_err());
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Track::Manual).unwrap(), "\"manual\"");
        assert_eq!(serde_json::to_string(&JobId::new("m1")).unwrap(), "\"m1\"");
        assert_eq!(
            serde_json::to_string(&FailureCause::SessionExpired).unwrap(),
            "\"session_expired\""
        );
        let r = ArtifactRef::File("out.csv".into());
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"by":"file","value":"out.csv"}"#
        );
    }
}

// crates/core/src/client/mod.rs
//! Backend seam used by the tracker and the artifact views.

mod http;

pub use http::HttpBackend;

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::ApiError;
use crate::mapping::{ColumnMapping, DEFAULT_MAX_LEN, DEFAULT_MIN_SUPPORT};
use crate::types::{ArtifactKind, ArtifactRef, JobId, Track};
use crate::wire::StatusPayload;

/// The calls the job lifecycle needs from the analytics backend.
///
/// Implementations:
/// - [`HttpBackend`]: reqwest against the real `/api/posdata/*` routes
/// - in-memory scripted backends in tests
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Upload a file and start processing. Returns the backend's process id.
    async fn submit(&self, request: &SubmitRequest) -> Result<JobId, ApiError>;

    /// Fetch the current status of `id` on `track`.
    async fn status(&self, track: Track, id: &JobId) -> Result<StatusPayload, ApiError>;

    /// Fetch a derived artifact of a completed job.
    async fn artifact(&self, kind: ArtifactKind, handle: &ArtifactRef) -> Result<Artifact, ApiError>;
}

/// A file to upload.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| ApiError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());
        Ok(Self::new(file_name, bytes))
    }

    /// MIME type the backend expects for the upload's extension.
    pub fn mime(&self) -> &'static str {
        let lower = self.file_name.to_ascii_lowercase();
        if lower.ends_with(".csv") {
            "text/csv"
        } else if lower.ends_with(".xlsx") {
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        } else if lower.ends_with(".xls") {
            "application/vnd.ms-excel"
        } else {
            "application/octet-stream"
        }
    }
}

/// Association-analysis parameters for the manual track.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualParams {
    pub column_mapping: ColumnMapping,
    pub min_support: f64,
    pub max_len: u32,
}

impl Default for ManualParams {
    fn default() -> Self {
        Self {
            column_mapping: ColumnMapping::new(),
            min_support: DEFAULT_MIN_SUPPORT,
            max_len: DEFAULT_MAX_LEN,
        }
    }
}

/// Track-specific submission body.
#[derive(Debug, Clone)]
pub enum SubmitRequest {
    Auto { upload: Upload },
    Manual { upload: Upload, params: ManualParams },
}

impl SubmitRequest {
    pub fn track(&self) -> Track {
        match self {
            SubmitRequest::Auto { .. } => Track::Auto,
            SubmitRequest::Manual { .. } => Track::Manual,
        }
    }

    pub fn upload(&self) -> &Upload {
        match self {
            SubmitRequest::Auto { upload } | SubmitRequest::Manual { upload, .. } => upload,
        }
    }
}

/// Downloaded artifact body.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub handle: ArtifactRef,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl Artifact {
    /// File name to save the artifact under.
    pub fn suggested_file_name(&self) -> String {
        match &self.handle {
            ArtifactRef::File(name) => name.clone(),
            ArtifactRef::Keyed(_) => format!("{}_result.csv", self.kind),
        }
    }
}

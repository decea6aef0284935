// crates/core/src/client/http.rs
//! reqwest implementation of [`JobBackend`] against the `/api/posdata/*` routes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use tracing::{debug, warn};

use super::{Artifact, JobBackend, SubmitRequest, Upload};
use crate::config::BackendConfig;
use crate::error::ApiError;
use crate::mapping::{dedupe_mapping, fallback_mapping, ColumnMapping};
use crate::types::{ArtifactKind, ArtifactRef, JobId, Track};
use crate::wire::{LlmMappingResponse, StatusPayload, SubmitResponse, UploadPreview};

const USER_AGENT: &str = concat!("posboard/", env!("CARGO_PKG_VERSION"));

/// Cookie-session HTTP client for the analytics backend.
///
/// Every request goes through one `reqwest::Client` with a cookie store, so a
/// successful [`HttpBackend::login`] authenticates all later calls.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base: Url,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let base = Url::parse(config.base_url.trim())
            .map_err(|e| ApiError::Decode(format!("invalid base url {}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::Decode(format!(
                "invalid base url {}: not a base",
                config.base_url
            )));
        }
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| ApiError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // cannot_be_a_base was rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// `POST /api/login`. The session cookie is kept for later calls.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let resp = self
            .client
            .post(self.url(&["api", "login"]))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        check(resp).await?;
        debug!(%username, "logged in");
        Ok(())
    }

    /// `POST /api/logout`.
    pub async fn logout(&self) -> Result<(), ApiError> {
        let resp = self.client.post(self.url(&["api", "logout"])).send().await?;
        check(resp).await?;
        Ok(())
    }

    /// `POST /api/posdata/upload`: read the column names of an upload.
    pub async fn inspect(&self, upload: &Upload) -> Result<UploadPreview, ApiError> {
        let form = Form::new().part("file", file_part(upload)?);
        let resp = self
            .client
            .post(self.url(&["api", "posdata", "upload"]))
            .multipart(form)
            .send()
            .await?;
        decode(check(resp).await?).await
    }

    /// `POST /api/posdata/llm-mapping`, de-duplicated so each target gets one column.
    pub async fn suggest_mapping(&self, columns: &[String]) -> Result<ColumnMapping, ApiError> {
        let resp = self
            .client
            .post(self.url(&["api", "posdata", "llm-mapping"]))
            .json(&serde_json::json!({ "columns": columns }))
            .send()
            .await?;
        let body: LlmMappingResponse = decode(check(resp).await?).await?;
        Ok(dedupe_mapping(&body.mapping))
    }

    /// LLM mapping, or the substring fallback when the LLM call fails.
    pub async fn suggest_mapping_or_fallback(&self, columns: &[String]) -> ColumnMapping {
        match self.suggest_mapping(columns).await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!(error = %e, "LLM column mapping unavailable, using substring match");
                fallback_mapping(columns)
            }
        }
    }

    fn artifact_url(&self, kind: ArtifactKind, handle: &ArtifactRef) -> Url {
        match handle {
            ArtifactRef::File(name) => self.url(&["api", "posdata", "download", name.as_str()]),
            ArtifactRef::Keyed(id) => {
                self.url(&["api", "posdata", "auto-download", id.as_str(), kind.as_str()])
            }
        }
    }
}

#[async_trait]
impl JobBackend for HttpBackend {
    async fn submit(&self, request: &SubmitRequest) -> Result<JobId, ApiError> {
        let (segment, form) = match request {
            SubmitRequest::Auto { upload } => {
                ("auto-process", Form::new().part("file", file_part(upload)?))
            }
            SubmitRequest::Manual { upload, params } => (
                "process",
                Form::new()
                    .part("file", file_part(upload)?)
                    .text("column_mapping", params.column_mapping.to_json())
                    .text("min_support", params.min_support.to_string())
                    .text("max_len", params.max_len.to_string()),
            ),
        };
        let resp = self
            .client
            .post(self.url(&["api", "posdata", segment]))
            .multipart(form)
            .send()
            .await?;
        let body: SubmitResponse = decode(check(resp).await?).await?;
        if body.process_id.trim().is_empty() {
            return Err(ApiError::Decode("empty process_id".into()));
        }
        debug!(track = %request.track(), process_id = %body.process_id, "job submitted");
        Ok(JobId::new(body.process_id))
    }

    async fn status(&self, track: Track, id: &JobId) -> Result<StatusPayload, ApiError> {
        let segment = match track {
            Track::Auto => "auto-status",
            Track::Manual => "status",
        };
        let resp = self
            .client
            .get(self.url(&["api", "posdata", segment, id.as_str()]))
            .send()
            .await?;
        decode(check(resp).await?).await
    }

    async fn artifact(&self, kind: ArtifactKind, handle: &ArtifactRef) -> Result<Artifact, ApiError> {
        let resp = self.client.get(self.artifact_url(kind, handle)).send().await?;
        let resp = check(resp).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?;
        Ok(Artifact {
            kind,
            handle: handle.clone(),
            content_type,
            bytes,
        })
    }
}

fn file_part(upload: &Upload) -> Result<Part, ApiError> {
    Part::bytes(upload.bytes.to_vec())
        .file_name(upload.file_name.clone())
        .mime_str(upload.mime())
        .map_err(|e| ApiError::Decode(format!("invalid mime type: {e}")))
}

/// Turn a non-2xx response into [`ApiError::Http`] carrying the backend's
/// `error` message verbatim.
async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let code = status.as_u16();
    let text = resp.text().await.unwrap_or_default();
    Err(ApiError::http(code, error_message(code, &text)))
}

fn error_message(status: u16, body: &str) -> String {
    let body = body.trim();
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        return match value.get("error") {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => format!("HTTP {status}"),
        };
    }
    if body.is_empty() {
        format!("HTTP {status}")
    } else {
        body.to_string()
    }
}

async fn decode<T: serde::de::DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
    let text = resp.text().await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
}

// crates/core/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{JobId, Track};

/// Errors from a single call against the analytics backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx answer. `message` is the backend's `error` field when present.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection refused, reset, timed out, ...
    #[error("communication error: {0}")]
    Transport(String),

    /// 2xx answer whose body did not match the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status of the failed call, if the backend answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for a 401; the surrounding application must force a logout.
    pub fn is_session_expired(&self) -> bool {
        self.status() == Some(401)
    }

    /// Message suitable for showing to the user as-is.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::Transport(err.to_string()),
        }
    }
}

/// Errors surfaced by the job lifecycle.
#[derive(Debug, Error)]
pub enum JobError {
    /// The backend rejected the upload/process request; no job exists.
    #[error("submission failed: {}", .0.user_message())]
    Submission(#[source] ApiError),

    /// Manual submission is missing required column targets.
    #[error("column mapping is missing required targets: {}", .0.join(", "))]
    IncompleteMapping(Vec<String>),

    #[error("job {id} failed: {message}")]
    JobFailed { id: JobId, message: String },

    #[error("job {id} did not finish before the poll timeout")]
    TimedOut { id: JobId },

    #[error("no job is tracked on the {0} track")]
    NotTracked(Track),
}

impl JobError {
    /// HTTP status carried by a submission failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Submission(api) => api.status(),
            _ => None,
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::http(400, "file_required");
        assert_eq!(err.to_string(), "HTTP 400: file_required");
        assert_eq!(err.user_message(), "file_required");
        assert_eq!(err.status(), Some(400));
        assert!(!err.is_session_expired());
    }

    #[test]
    fn test_session_expired() {
        assert!(ApiError::http(401, "unauthorized").is_session_expired());
        assert!(!ApiError::Transport("reset".into()).is_session_expired());
        assert_eq!(ApiError::Transport("reset".into()).status(), None);
    }

    #[test]
    fn test_submission_error_keeps_status() {
        let err = JobError::Submission(ApiError::http(401, "login_required"));
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.to_string(), "submission failed: login_required");
    }

    #[test]
    fn test_incomplete_mapping_display() {
        let err = JobError::IncompleteMapping(vec!["利用日時".into(), "利用金額".into()]);
        assert_eq!(
            err.to_string(),
            "column mapping is missing required targets: 利用日時, 利用金額"
        );
    }
}

use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::{RequestError, RequestValidationError};

/// Errors returned by Stable Horde operations.
#[derive(Error, Debug)]
pub enum HordeError {
    /// The horde rejected the request payload (HTTP 400).
    #[error("Request validation failed: {message}")]
    Validation {
        message: String,
        errors: BTreeMap<String, String>,
    },

    /// The API key was rejected (HTTP 401).
    #[error("Invalid API key: {0}")]
    InvalidCredential(String),

    /// Too many requests or prompts in flight for this key (HTTP 429).
    #[error("Rate limited by Stable Horde: {0}")]
    RateLimited(String),

    /// The horde is in maintenance mode or otherwise unavailable (HTTP 503).
    #[error("Stable Horde unavailable: {0}")]
    ServiceUnavailable(String),

    /// No job exists with this id (HTTP 404 on a lookup endpoint).
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Any HTTP status the endpoint does not document.
    #[error("Stable Horde returned unexpected HTTP {status}")]
    UnexpectedResponse { status: u16 },

    /// Response bytes were not valid JSON, did not match the expected shape,
    /// or an inline image was not valid base64.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Saving generation `index` failed. Files in `written` were saved
    /// before the failure and remain on disk.
    #[error("Failed to save generation {index} to {}: {source}", path.display())]
    WriteFailure {
        index: usize,
        path: PathBuf,
        written: Vec<PathBuf>,
        source: Box<HordeError>,
    },

    /// The horde marked the job as faulted. Terminal, never retried.
    #[error("Job {0} faulted on Stable Horde")]
    Faulted(String),

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller's cancellation token fired.
    #[error("Operation was cancelled")]
    Cancelled,

    /// The configured deadline elapsed before the job finished.
    #[error("Timed out waiting for job")]
    TimedOut,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for HordeError {
    fn from(err: serde_json::Error) -> Self {
        HordeError::Decode(err.to_string())
    }
}

impl From<base64::DecodeError> for HordeError {
    fn from(err: base64::DecodeError) -> Self {
        HordeError::Decode(format!("invalid base64 image: {}", err))
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, HordeError>;

/// The failure a documented non-success status maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorKind {
    Validation,
    InvalidCredential,
    RateLimited,
    ServiceUnavailable,
    JobNotFound,
}

/// `POST /generate/async`
pub(crate) const SUBMIT_ERRORS: &[(u16, ErrorKind)] = &[
    (400, ErrorKind::Validation),
    (401, ErrorKind::InvalidCredential),
    (429, ErrorKind::RateLimited),
    (503, ErrorKind::ServiceUnavailable),
];

/// `GET /generate/check/{id}` and `GET /generate/status/{id}`
pub(crate) const JOB_LOOKUP_ERRORS: &[(u16, ErrorKind)] = &[
    (404, ErrorKind::JobNotFound),
    (429, ErrorKind::RateLimited),
    (503, ErrorKind::ServiceUnavailable),
];

/// `GET /find_user`. The horde answers 404 when no user owns the key.
pub(crate) const ACCOUNT_ERRORS: &[(u16, ErrorKind)] = &[
    (401, ErrorKind::InvalidCredential),
    (404, ErrorKind::InvalidCredential),
    (429, ErrorKind::RateLimited),
    (503, ErrorKind::ServiceUnavailable),
];

/// `GET /status/models`
pub(crate) const PUBLIC_ERRORS: &[(u16, ErrorKind)] = &[
    (429, ErrorKind::RateLimited),
    (503, ErrorKind::ServiceUnavailable),
];

/// Map a non-success response to an error using `table`.
///
/// `subject` names the thing the request was about (the job id for lookups)
/// and is used when the error body carries no message of its own.
pub(crate) fn status_error(
    table: &[(u16, ErrorKind)],
    status: u16,
    body: &[u8],
    subject: &str,
) -> HordeError {
    let kind = table
        .iter()
        .find(|(code, _)| *code == status)
        .map(|(_, kind)| *kind);

    match kind {
        Some(ErrorKind::Validation) => {
            let descriptor: RequestValidationError = serde_json::from_slice(body)
                .unwrap_or_else(|_| RequestValidationError::from_message(body_text(body)));
            HordeError::Validation {
                message: descriptor.message,
                errors: descriptor.errors,
            }
        }
        Some(ErrorKind::InvalidCredential) => HordeError::InvalidCredential(message(body)),
        Some(ErrorKind::RateLimited) => HordeError::RateLimited(message(body)),
        Some(ErrorKind::ServiceUnavailable) => HordeError::ServiceUnavailable(message(body)),
        Some(ErrorKind::JobNotFound) => HordeError::JobNotFound(subject.to_string()),
        None => HordeError::UnexpectedResponse { status },
    }
}

/// Error bodies that are not a `{"message": ...}` object fall back to the raw text.
fn message(body: &[u8]) -> String {
    serde_json::from_slice::<RequestError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body_text(body))
}

fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).trim().to_string()
}

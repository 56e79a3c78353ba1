//! Error taxonomy (spec §7): one `thiserror` enum per subsystem, plus a
//! crate-level [`EngineError`] that wraps them for the scheduler's public
//! surface. Every operation document which kinds it can produce.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while parsing a master or media playlist (§4.2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PlaylistError {
    #[error("no media playlist entry found in master playlist")]
    NoMediaPlaylist,
    #[error("invalid playlist: {0}")]
    Malformed(String),
    #[error("invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors raised by a single segment fetch (§4.3). Transport/upstream errors are
/// recovered locally by the retry loop; only the final exhausted error escapes.
#[derive(Debug, Error, Clone)]
pub enum FetchError {
    #[error("empty response body")]
    EmptyResponse,
    #[error("unexpected content type: {0}")]
    UnexpectedContentType(String),
    #[error("upstream error: {0}")]
    UpstreamError(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl FetchError {
    /// Transport and upstream errors are retried per-segment; validation
    /// failures on content the server insists is final are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Cancelled)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(Duration::from_secs(60))
        } else {
            FetchError::NetworkError(err.to_string())
        }
    }
}

/// Errors raised by the parallel segment pipeline (§4.4).
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error("segment {index} failed: {cause}")]
    SegmentFailed { index: u64, cause: FetchError },
    #[error("local I/O error: {0}")]
    Io(String),
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by the muxer (§4.5, §6.4).
#[derive(Debug, Error)]
pub enum MuxError {
    #[error("failed to concatenate segments: {0}")]
    ConcatIOError(#[from] std::io::Error),
    #[error("remux failed (exit code {exit_code:?}): {stderr_tail}")]
    RemuxFailed {
        exit_code: Option<i32>,
        stderr_tail: String,
    },
    #[error("remux tool not found: {hint}")]
    ToolMissing { hint: String },
}

/// Errors raised by the retention store (§4.6).
#[derive(Debug, Error)]
pub enum RetentionError {
    #[error("retention override must be null or an integer in 1..=365")]
    BadRetention,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("no retention metadata for job {0}")]
    NotFound(String),
}

/// Validation and state errors raised synchronously by scheduler operations (§7).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid preset: {0}")]
    InvalidPreset(String),
    #[error("wrong state: expected job to be {expected}, found {found}")]
    WrongState { expected: String, found: String },
    #[error("job not found")]
    NotFound,
    #[error("job is running and cannot be removed")]
    NotRemovable,
    #[error("position {position} is out of range (queue length {queue_len})")]
    BadPosition { position: usize, queue_len: usize },
    #[error("path escapes the downloads root")]
    PathEscape,
    #[error("no media source: {0}")]
    NoMediaSource(String),
    #[error("upstream adapter error: {0}")]
    UpstreamAdapter(String),
}

/// Crate-level error wrapping every subsystem error for the scheduler's public API.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Mux(#[from] MuxError),
    #[error(transparent)]
    Retention(#[from] RetentionError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Compact, wire-facing error shape delivered in progress events and responses
/// (§7 "Propagation policy"): `{ kind, message }`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::Playlist(PlaylistError::NoMediaPlaylist) => "NoMediaPlaylist",
            EngineError::Playlist(_) => "PlaylistError",
            EngineError::Fetch(FetchError::EmptyResponse) => "EmptyResponse",
            EngineError::Fetch(FetchError::UnexpectedContentType(_)) => "UnexpectedContentType",
            EngineError::Fetch(FetchError::UpstreamError(_)) => "UpstreamError",
            EngineError::Fetch(FetchError::Timeout(_)) => "Timeout",
            EngineError::Fetch(FetchError::NetworkError(_)) => "NetworkError",
            EngineError::Fetch(FetchError::ValidationFailed(_)) => "ValidationFailed",
            EngineError::Fetch(FetchError::Cancelled) => "Cancelled",
            EngineError::Pipeline(PipelineError::SegmentFailed { .. }) => "SegmentFailed",
            EngineError::Pipeline(_) => "PipelineError",
            EngineError::Mux(MuxError::ConcatIOError(_)) => "ConcatIOError",
            EngineError::Mux(MuxError::RemuxFailed { .. }) => "RemuxFailed",
            EngineError::Mux(MuxError::ToolMissing { .. }) => "ToolMissing",
            EngineError::Retention(RetentionError::BadRetention) => "BadRetention",
            EngineError::Retention(_) => "RetentionError",
            EngineError::Scheduler(SchedulerError::InvalidPreset(_)) => "InvalidPreset",
            EngineError::Scheduler(SchedulerError::WrongState { .. }) => "WrongState",
            EngineError::Scheduler(SchedulerError::NotFound) => "NotFound",
            EngineError::Scheduler(SchedulerError::NotRemovable) => "NotRemovable",
            EngineError::Scheduler(SchedulerError::BadPosition { .. }) => "BadPosition",
            EngineError::Scheduler(SchedulerError::PathEscape) => "PathEscape",
            EngineError::Scheduler(SchedulerError::NoMediaSource(_)) => "NoMediaSource",
            EngineError::Scheduler(SchedulerError::UpstreamAdapter(_)) => "UpstreamAdapter",
            EngineError::Io(_) => "Io",
            EngineError::Serde(_) => "Serde",
        };
        ErrorInfo {
            kind: kind.to_string(),
            message: err.to_string(),
        }
    }
}

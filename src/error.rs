use thiserror::Error;
use uuid::Uuid;

use crate::session::{CaptureMode, SessionState};

/// Caller-facing errors. Anything else is absorbed inside the pipeline
/// and degrades to counters and log lines.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("room {0:?} does not resolve")]
    InvalidRoom(String),
    #[error("session {0} not found")]
    SessionNotFound(Uuid),
    #[error("operation not valid while session is {0:?}")]
    InvalidState(SessionState),
    #[error("ingestion does not match session mode {0:?}")]
    WrongMode(CaptureMode),
    #[error("conflicting terminal transition for session {0}")]
    StateConflict(Uuid),
    #[error("media decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Undecodable media. Fatal for the ingestion call that carried it; fatal
/// for the session only when it was the session's sole media.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to decode image: {0}")]
    Image(String),
    #[error("failed to decode video: {0}")]
    Video(String),
    #[error("io error during decode: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of a single vision-model call. Retried per keyframe; a keyframe
/// that exhausts its retries contributes nothing, it never fails the session.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("vision call timed out")]
    Timeout,
    #[error("vision backend returned status {0}")]
    Http(u16),
    #[error("vision transport error: {0}")]
    Transport(String),
    #[error("vision response carried no parsable payload")]
    Parse,
}

impl AnalysisError {
    /// Timeouts, 5xx and transport drops are worth another attempt.
    /// Client-side 4xx and unparsable payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AnalysisError::Timeout => true,
            AnalysisError::Http(status) => *status >= 500,
            AnalysisError::Transport(_) => true,
            AnalysisError::Parse => false,
        }
    }
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Running,
    Done,
    Error,
}

impl ProgressStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Done | ProgressStatus::Error)
    }
}

/// One tick of the per-session progress stream. Listeners observe `seq`
/// in strictly increasing order; `Done`/`Error` close the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub session_id: Uuid,
    pub seq: u64,
    pub status: ProgressStatus,
    pub progress: f32,
    pub message: String,
    pub candidate_count: usize,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CaptureError;

/// How media reaches the session. One session entity, a closed set of
/// modes, mode-specific ingestion dispatched by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    Video,
    Image,
    Rapid,
    Scan,
}

/// Lifecycle of a capture session. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Active,
    Finalizing,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

/// The aggregate root: mode, lifecycle, counters and in-flight-analysis
/// accounting. All mutation is serialized through the session manager;
/// this type only enforces the transition rules.
#[derive(Debug, Clone)]
pub struct CaptureSession {
    pub id: Uuid,
    pub room_id: String,
    pub mode: CaptureMode,
    pub state: SessionState,
    /// Ingestion calls accepted (videos, snaps, images).
    pub media_count: u32,
    /// Keyframes admitted to analysis.
    pub frame_count: u32,
    pub candidate_count: usize,
    /// Keyframes whose analysis exhausted its retries.
    pub skipped_keyframes: u32,
    /// Reported objects dropped as unparsable.
    pub skipped_objects: u32,
    pub in_flight: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl CaptureSession {
    pub fn new(room_id: String, mode: CaptureMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            mode,
            state: SessionState::Created,
            media_count: 0,
            frame_count: 0,
            candidate_count: 0,
            skipped_keyframes: 0,
            skipped_objects: 0,
            in_flight: 0,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Accept one ingestion call. The first one promotes `Created` to
    /// `Active`; once finalizing has begun, ingestion is refused.
    /// Returns the media count prior to this call, so a video ingestion
    /// can tell whether it was the session's only media when it fails
    /// to decode.
    pub fn record_ingest(&mut self) -> Result<u32, CaptureError> {
        match self.state {
            SessionState::Created => self.state = SessionState::Active,
            SessionState::Active => {}
            other => return Err(CaptureError::InvalidState(other)),
        }
        let prior = self.media_count;
        self.media_count += 1;
        Ok(prior)
    }

    pub fn record_keyframe(&mut self) -> Result<(), CaptureError> {
        if self.state != SessionState::Active {
            return Err(CaptureError::InvalidState(self.state));
        }
        self.frame_count += 1;
        Ok(())
    }

    /// Reserve in-flight slots before dispatching vision calls. The
    /// counter must be raised before dispatch and lowered on settle,
    /// never skipped — finalization correctness depends on it.
    pub fn begin_analyses(&mut self, count: u32) -> Result<(), CaptureError> {
        if self.state != SessionState::Active {
            return Err(CaptureError::InvalidState(self.state));
        }
        self.in_flight += count;
        Ok(())
    }

    pub fn settle_analysis(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Stop accepting ingestion; outstanding analyses drain before the
    /// final candidate list is produced. Idempotent while finalizing.
    pub fn begin_finalize(&mut self) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Created | SessionState::Active => {
                self.state = SessionState::Finalizing;
                Ok(())
            }
            SessionState::Finalizing => Ok(()),
            other => Err(CaptureError::InvalidState(other)),
        }
    }

    /// Terminal transition. Calling it again is fine; conflicting with a
    /// prior `Failed` is not.
    pub fn complete(&mut self) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Completed => Ok(()),
            SessionState::Failed => Err(CaptureError::StateConflict(self.id)),
            _ => {
                self.state = SessionState::Completed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
        }
    }

    pub fn fail(&mut self) -> Result<(), CaptureError> {
        match self.state {
            SessionState::Failed => Ok(()),
            SessionState::Completed => Err(CaptureError::StateConflict(self.id)),
            _ => {
                self.state = SessionState::Failed;
                self.completed_at = Some(Utc::now());
                Ok(())
            }
        }
    }
}

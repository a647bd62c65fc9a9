use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The distinguishing condition behind a mode-switch suggestion.
/// Each kind is surfaced at most once per candidate per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryKind {
    BookSpineUnreadable,
    SmallText,
    Occlusion,
    HighValue,
    LowConfidence,
    BarcodeVisible,
}

/// Informational only; the session keeps running in its current mode
/// until the user decides to switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSwitchAdvisory {
    pub kind: AdvisoryKind,
    pub candidate_id: Uuid,
    pub message: String,
}

pub mod advisor;
pub mod config;
pub mod dedup;
pub mod error;
pub mod frame;
pub mod keyframe;
pub mod progress;
pub mod quality;
pub mod service;
pub mod session;
pub mod types;
pub mod vision;

pub use config::Configuration;
pub use error::{AnalysisError, CaptureError, DecodeError};
pub use service::{CaptureService, OpenRoomDirectory, RoomDirectory, VideoIngestReceipt};
pub use session::{CaptureMode, FinalizedSession, SessionState};
pub use types::{CanonicalCandidate, DetectedObject, ModeSwitchAdvisory, ProgressEvent};

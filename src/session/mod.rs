pub mod manager;
pub mod state;

pub use manager::{
    AnalysisOutcome, FinalizedSession, SessionManager, SessionManagerHandle,
};
pub use state::{CaptureMode, CaptureSession, SessionState};

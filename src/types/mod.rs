pub mod advisory;
pub mod candidate;
pub mod detection;
pub mod progress;

pub use advisory::{AdvisoryKind, ModeSwitchAdvisory};
pub use candidate::CanonicalCandidate;
pub use detection::{BoundingBox, Category, Condition, DetectedObject};
pub use progress::{ProgressEvent, ProgressStatus};

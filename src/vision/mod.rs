pub mod http;
pub mod parse;
pub mod prompt;

use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use tracing::warn;

use crate::error::AnalysisError;
use crate::types::DetectedObject;

pub use http::HttpVisionClient;
pub use prompt::PromptProfile;

/// What one vision call produced: the detections that survived coercion
/// plus how many reported objects were dropped as unparsable.
#[derive(Debug, Clone, Default)]
pub struct FrameAnalysis {
    pub objects: Vec<DetectedObject>,
    pub skipped: usize,
}

/// Narrow seam to the external vision-reasoning model. Volatile,
/// rate-limited and nondeterministic in production; tests substitute a
/// deterministic fake.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    async fn analyze(
        &self,
        image: &DynamicImage,
        profile: PromptProfile,
    ) -> Result<FrameAnalysis, AnalysisError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff * 2u32.saturating_pow(attempt);
        let jitter_ms = rand::random_range(0..=self.base_backoff.as_millis().max(1) as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }
}

/// One keyframe's analysis with bounded retries. Exhausted retries surface
/// the last error; the caller degrades that keyframe to an empty
/// contribution rather than failing the session.
pub async fn analyze_with_retry(
    backend: &dyn VisionBackend,
    image: &DynamicImage,
    profile: PromptProfile,
    policy: RetryPolicy,
) -> Result<FrameAnalysis, AnalysisError> {
    let mut attempt = 0;
    loop {
        match backend.analyze(image, profile).await {
            Ok(analysis) => return Ok(analysis),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(attempt, "vision call failed ({e}), retrying in {delay:?}");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

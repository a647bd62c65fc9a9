use serde::Deserialize;

/// Tunable knobs for the whole capture pipeline. Defaults are tuned for
/// 1fps handheld walkthrough footage; every field can be overridden from
/// the environment with a `ROOMSCAN_` prefix.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Laplacian-variance floor; frames below it are considered motion blur.
    pub blur_threshold: f32,
    /// Perceptual-hash Hamming distance below which a frame is a near-duplicate.
    pub duplicate_distance: usize,
    /// How many recently accepted fingerprints the near-duplicate test remembers.
    pub quality_window: usize,
    /// Video sampling rate, independent of the source frame rate.
    pub sample_fps: f32,
    /// Hard cap on keyframes per video ingestion.
    pub keyframe_cap: usize,
    /// Decoded sample dimensions (ffmpeg scales during extraction).
    pub frame_width: u32,
    pub frame_height: u32,
    /// Concurrent vision calls per process.
    pub analysis_parallelism: usize,
    /// Retries per keyframe after the first failed attempt.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub analysis_timeout_secs: u64,
    /// Budget for the interactive single-frame overlay path.
    pub interactive_timeout_secs: u64,
    /// Text-similarity thresholds for cross-frame merging.
    pub name_similarity: f64,
    pub weak_name_similarity: f64,
    pub description_similarity: f64,
    /// Hamming threshold for crop-fingerprint merging.
    pub crop_distance: usize,
    /// Below this aggregated confidence the advisor asks for a close-up.
    pub low_confidence: f32,
    /// At or above this rough value estimate the advisor asks for documentation.
    pub high_value_usd: f64,
    /// Progress channel backlog per session.
    pub progress_backlog: usize,
    /// How many finished sessions keep a frozen snapshot around for
    /// idempotent re-finalization before the oldest is evicted.
    pub archive_capacity: usize,
    pub vision_endpoint: String,
    pub vision_model: String,
    pub vision_api_key: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            blur_threshold: 100.0,
            duplicate_distance: 10,
            quality_window: 8,
            sample_fps: 1.0,
            keyframe_cap: 30,
            frame_width: 960,
            frame_height: 540,
            analysis_parallelism: 3,
            max_retries: 2,
            retry_backoff_ms: 500,
            analysis_timeout_secs: 60,
            interactive_timeout_secs: 10,
            name_similarity: 0.8,
            weak_name_similarity: 0.6,
            description_similarity: 0.7,
            crop_distance: 12,
            low_confidence: 0.7,
            high_value_usd: 500.0,
            progress_backlog: 256,
            archive_capacity: 64,
            vision_endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            vision_model: "claude-sonnet-4-20250514".to_string(),
            vision_api_key: String::new(),
        }
    }
}

impl Configuration {
    /// Defaults overlaid with any `ROOMSCAN_*` environment variables.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("ROOMSCAN"))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Configuration::default();
        assert!(cfg.keyframe_cap >= 10 && cfg.keyframe_cap <= 30);
        assert!(cfg.low_confidence > 0.0 && cfg.low_confidence < 1.0);
        assert!(cfg.analysis_parallelism > 0);
    }
}

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::DecodeError;
use crate::frame::{Keyframe, RawFrame};
use crate::quality::QualityFilter;

/// Turns an uploaded video into time-ordered samples at a fixed rate,
/// independent of the source frame rate. Substituted in tests with a
/// synthetic frame source.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn decode(&self, video: &[u8]) -> Result<Vec<RawFrame>, DecodeError>;
}

/// Shells out to ffmpeg: samples at `sample_fps`, scales during extraction,
/// writes numbered jpegs into a scratch directory and decodes them back.
pub struct FfmpegDecoder {
    sample_fps: f32,
    width: u32,
    height: u32,
}

impl FfmpegDecoder {
    pub fn new(config: &Configuration) -> Self {
        Self {
            sample_fps: config.sample_fps,
            width: config.frame_width,
            height: config.frame_height,
        }
    }

    async fn extract(&self, video: &[u8], scratch: &PathBuf) -> Result<Vec<RawFrame>, DecodeError> {
        tokio::fs::create_dir_all(scratch).await?;
        let input_path = scratch.join("input.bin");
        tokio::fs::write(&input_path, video).await?;

        let vf = format!("fps={},scale={}:{}", self.sample_fps, self.width, self.height);
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-i", &input_path.to_string_lossy()])
            .args(["-an", "-sn"])
            .args(["-vf", &vf])
            .args(["-q:v", "4"])
            .args(["-y", &scratch.join("frame_%04d.jpg").to_string_lossy()])
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DecodeError::Video(stderr.trim().to_string()));
        }

        let mut frame_files: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(scratch).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "jpg").unwrap_or(false) {
                frame_files.push(path);
            }
        }
        frame_files.sort();

        let mut frames = Vec::with_capacity(frame_files.len());
        for (i, path) in frame_files.iter().enumerate() {
            let data = tokio::fs::read(path).await?;
            match image::load_from_memory(&data) {
                Ok(img) => frames.push(RawFrame::new(img, i as f64 / self.sample_fps as f64)),
                Err(e) => warn!(frame = i, "skipping undecodable extracted frame: {e}"),
            }
        }

        if frames.is_empty() {
            return Err(DecodeError::Video("no frames extracted".to_string()));
        }
        Ok(frames)
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn decode(&self, video: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
        let scratch = std::env::temp_dir().join(format!("roomscan-{}", Uuid::new_v4()));
        let result = self.extract(video, &scratch).await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            warn!("failed to clean decode scratch dir: {e}");
        }
        result
    }
}

/// Applies the quality filter to decoded samples in arrival order and
/// emits a bounded, temporally spread set of keyframes. Acceptance always
/// requires passing both quality tests; elapsed time alone never admits
/// a frame. Emits whatever survives, even below the minimum viable count.
pub struct KeyframeSelector {
    filter: QualityFilter,
    cap: usize,
    accepted: usize,
}

impl KeyframeSelector {
    pub fn new(config: &Configuration) -> Self {
        Self {
            filter: QualityFilter::new(
                config.blur_threshold,
                config.duplicate_distance,
                config.quality_window,
            ),
            cap: config.keyframe_cap,
            accepted: 0,
        }
    }

    /// Offer one frame; `Some` means it was admitted as a keyframe.
    pub fn offer(&mut self, session_id: Uuid, frame: &RawFrame) -> Option<Keyframe> {
        if self.accepted >= self.cap {
            return None;
        }
        let verdict = self.filter.assess(&frame.image);
        if !verdict.accepted {
            debug!(
                ts = frame.timestamp_secs,
                sharpness = verdict.sharpness,
                "frame rejected: {:?}",
                verdict.rejection
            );
            return None;
        }
        let keyframe = Keyframe::new(session_id, self.accepted, frame, verdict.sharpness);
        self.accepted += 1;
        Some(keyframe)
    }

    /// Run the whole sample stream through the filter.
    pub fn select(&mut self, session_id: Uuid, frames: &[RawFrame]) -> Vec<Keyframe> {
        frames
            .iter()
            .filter_map(|frame| self.offer(session_id, frame))
            .collect()
    }

    /// Scan/rapid snaps are already-selected keyframes; the filter only
    /// contributes a diagnostic score and never rejects.
    pub fn admit_unfiltered(&mut self, session_id: Uuid, frame: &RawFrame) -> Keyframe {
        let score = self.filter.score(&frame.image);
        let keyframe = Keyframe::new(session_id, self.accepted, frame, score);
        self.accepted += 1;
        keyframe
    }
}

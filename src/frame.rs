use std::sync::Arc;

use image::DynamicImage;
use uuid::Uuid;

/// A decoded sample straight out of the video decoder or a client upload.
/// The pixel data is shared, cloning a frame never copies the image.
#[derive(Clone)]
pub struct RawFrame {
    pub image: Arc<DynamicImage>,
    /// Seconds since the start of the media this frame came from.
    pub timestamp_secs: f64,
}

impl RawFrame {
    pub fn new(image: DynamicImage, timestamp_secs: f64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp_secs,
        }
    }
}

/// A frame that survived quality filtering and is headed for analysis.
/// Lives only between selection and analysis; confirmed items keep its id
/// as an evidentiary reference.
#[derive(Clone)]
pub struct Keyframe {
    pub id: Uuid,
    pub session_id: Uuid,
    pub index: usize,
    pub timestamp_secs: f64,
    pub image: Arc<DynamicImage>,
    pub quality_score: f32,
}

impl Keyframe {
    pub fn new(session_id: Uuid, index: usize, frame: &RawFrame, quality_score: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            index,
            timestamp_secs: frame.timestamp_secs,
            image: Arc::clone(&frame.image),
            quality_score,
        }
    }
}

use std::collections::VecDeque;

use image::{DynamicImage, GrayImage};
use imghash::{perceptual::PerceptualHasher, ImageHash, ImageHasher};

/// Why a frame was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRejection {
    Blurry,
    NearDuplicate,
}

#[derive(Debug, Clone)]
pub struct QualityVerdict {
    pub accepted: bool,
    /// Laplacian variance, kept for diagnostics even on rejection.
    pub sharpness: f32,
    pub rejection: Option<FrameRejection>,
}

impl QualityVerdict {
    fn accept(sharpness: f32) -> Self {
        Self {
            accepted: true,
            sharpness,
            rejection: None,
        }
    }

    fn reject(sharpness: f32, why: FrameRejection) -> Self {
        Self {
            accepted: false,
            sharpness,
            rejection: Some(why),
        }
    }
}

/// Two independent gates over a candidate frame: a sharpness floor and a
/// near-duplicate test against a window of recently accepted fingerprints.
/// Never errors; anything it cannot score fails closed.
pub struct QualityFilter {
    hasher: PerceptualHasher,
    recent: VecDeque<ImageHash>,
    blur_threshold: f32,
    duplicate_distance: usize,
    window_size: usize,
}

impl QualityFilter {
    pub fn new(blur_threshold: f32, duplicate_distance: usize, window_size: usize) -> Self {
        Self {
            hasher: PerceptualHasher::default(),
            recent: VecDeque::with_capacity(window_size),
            blur_threshold,
            duplicate_distance,
            window_size,
        }
    }

    /// Score a frame and, if accepted, remember its fingerprint for the
    /// near-duplicate window.
    pub fn assess(&mut self, image: &DynamicImage) -> QualityVerdict {
        if image.width() < 3 || image.height() < 3 {
            return QualityVerdict::reject(0.0, FrameRejection::Blurry);
        }

        let sharpness = laplacian_variance(&image.to_luma8());
        if sharpness < self.blur_threshold {
            return QualityVerdict::reject(sharpness, FrameRejection::Blurry);
        }

        let fingerprint = self.hasher.hash_from_img(image);
        let duplicate = self.recent.iter().any(|seen| {
            seen.distance(&fingerprint).unwrap_or(0) < self.duplicate_distance
        });
        if duplicate {
            return QualityVerdict::reject(sharpness, FrameRejection::NearDuplicate);
        }

        if self.recent.len() >= self.window_size {
            self.recent.pop_front();
        }
        self.recent.push_back(fingerprint);
        QualityVerdict::accept(sharpness)
    }

    /// Sharpness only, without touching the duplicate window. Used by the
    /// scan/rapid paths where the filter runs advisory-only.
    pub fn score(&self, image: &DynamicImage) -> f32 {
        if image.width() < 3 || image.height() < 3 {
            return 0.0;
        }
        laplacian_variance(&image.to_luma8())
    }
}

/// Variance of a 3x3 Laplacian over a grayscale image, the standard blur
/// metric. Higher is sharper.
pub fn laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width() as i32, img.height() as i32);
    if w < 3 || h < 3 {
        return 0.0;
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0u64;

    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = img.get_pixel(x as u32, y as u32).0[0] as f64;
            let top = img.get_pixel(x as u32, (y - 1) as u32).0[0] as f64;
            let bottom = img.get_pixel(x as u32, (y + 1) as u32).0[0] as f64;
            let left = img.get_pixel((x - 1) as u32, y as u32).0[0] as f64;
            let right = img.get_pixel((x + 1) as u32, y as u32).0[0] as f64;

            let response = top + bottom + left + right - 4.0 * center;
            sum += response;
            sum_sq += response * response;
            count += 1;
        }
    }

    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64) - (mean * mean);
    variance.max(0.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn flat_image(size: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(
            size,
            size,
            Rgb([value, value, value]),
        ))
    }

    fn checkerboard(size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(size, size, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        }))
    }

    #[test]
    fn flat_frame_reads_as_blurry() {
        assert_eq!(laplacian_variance(&flat_image(32, 128).to_luma8()), 0.0);
    }

    #[test]
    fn high_frequency_frame_reads_as_sharp() {
        let variance = laplacian_variance(&checkerboard(32).to_luma8());
        assert!(variance > 100.0, "checkerboard variance was {variance}");
    }

    #[test]
    fn blurry_frame_is_rejected() {
        let mut filter = QualityFilter::new(100.0, 10, 8);
        let verdict = filter.assess(&flat_image(32, 128));
        assert!(!verdict.accepted);
        assert_eq!(verdict.rejection, Some(FrameRejection::Blurry));
    }

    #[test]
    fn repeated_frame_is_rejected_as_duplicate() {
        let mut filter = QualityFilter::new(10.0, 10, 8);
        let frame = checkerboard(64);
        assert!(filter.assess(&frame).accepted);
        let verdict = filter.assess(&frame);
        assert!(!verdict.accepted);
        assert_eq!(verdict.rejection, Some(FrameRejection::NearDuplicate));
    }

    #[test]
    fn tiny_frame_fails_closed() {
        let mut filter = QualityFilter::new(10.0, 10, 8);
        let verdict = filter.assess(&flat_image(2, 0));
        assert!(!verdict.accepted);
        assert_eq!(verdict.sharpness, 0.0);
    }

    #[test]
    fn advisory_score_does_not_commit_fingerprint() {
        let mut filter = QualityFilter::new(10.0, 10, 8);
        let frame = checkerboard(64);
        let _ = filter.score(&frame);
        // Not remembered, so the same frame still passes as fresh.
        assert!(filter.assess(&frame).accepted);
    }
}

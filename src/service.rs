use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::join_all;
use image::DynamicImage;
use imghash::{perceptual::PerceptualHasher, ImageHash, ImageHasher};
use tokio::sync::Semaphore;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::error::{CaptureError, DecodeError};
use crate::frame::{Keyframe, RawFrame};
use crate::keyframe::{KeyframeSelector, VideoDecoder};
use crate::session::{
    AnalysisOutcome, CaptureMode, CaptureSession, FinalizedSession, SessionManager,
    SessionManagerHandle,
};
use crate::types::{DetectedObject, ProgressEvent};
use crate::vision::{analyze_with_retry, PromptProfile, RetryPolicy, VisionBackend};

/// Resolves room ids to something real. Room storage itself belongs to a
/// collaborator; the capture pipeline only needs a yes/no.
pub trait RoomDirectory: Send + Sync {
    fn resolve(&self, room_id: &str) -> bool;
}

/// Accepts any non-empty room id. Deployments wire in their real directory.
pub struct OpenRoomDirectory;

impl RoomDirectory for OpenRoomDirectory {
    fn resolve(&self, room_id: &str) -> bool {
        !room_id.trim().is_empty()
    }
}

/// What a video ingestion accepted before analysis started.
#[derive(Debug, Clone, Copy)]
pub struct VideoIngestReceipt {
    pub samples_decoded: usize,
    pub keyframes_admitted: usize,
}

/// The operation surface of the capture pipeline. Owns the session manager
/// task, the bounded analysis slots and one keyframe selector per live
/// session; vision backend, video decoder and room directory are seams.
pub struct CaptureService {
    config: Configuration,
    manager: SessionManagerHandle,
    _manager_task: SessionManager,
    vision: Arc<dyn VisionBackend>,
    decoder: Arc<dyn VideoDecoder>,
    rooms: Arc<dyn RoomDirectory>,
    analysis_slots: Arc<Semaphore>,
    selectors: Mutex<HashMap<Uuid, KeyframeSelector>>,
}

impl CaptureService {
    pub fn new(
        config: Configuration,
        vision: Arc<dyn VisionBackend>,
        decoder: Arc<dyn VideoDecoder>,
        rooms: Arc<dyn RoomDirectory>,
    ) -> Self {
        let (manager_task, manager) = SessionManager::new(config.clone());
        Self {
            analysis_slots: Arc::new(Semaphore::new(config.analysis_parallelism)),
            selectors: Mutex::new(HashMap::new()),
            manager,
            _manager_task: manager_task,
            vision,
            decoder,
            rooms,
            config,
        }
    }

    pub async fn start_session(
        &self,
        room_id: &str,
        mode: CaptureMode,
    ) -> Result<Uuid, CaptureError> {
        if !self.rooms.resolve(room_id) {
            return Err(CaptureError::InvalidRoom(room_id.to_string()));
        }
        Ok(self.manager.open(room_id.to_string(), mode).await)
    }

    /// Decode, select keyframes, dispatch bounded survey analyses and
    /// return immediately; results accumulate in the session and stream
    /// out as progress events. A video that fails to decode fails the
    /// session only when it was the session's sole media.
    pub async fn ingest_video(
        &self,
        session: Uuid,
        video: Vec<u8>,
    ) -> Result<VideoIngestReceipt, CaptureError> {
        let prior_media = self
            .manager
            .record_ingest(session, CaptureMode::Video)
            .await?;
        let frames = match self.decoder.decode(&video).await {
            Ok(frames) => frames,
            Err(e) => {
                if prior_media == 0 {
                    self.manager
                        .fail(session, format!("sole video failed to decode: {e}"))
                        .await;
                }
                return Err(CaptureError::Decode(e));
            }
        };

        let samples_decoded = frames.len();
        let keyframes = {
            let mut selectors = self.selectors.lock().expect("selector registry poisoned");
            let selector = selectors
                .entry(session)
                .or_insert_with(|| KeyframeSelector::new(&self.config));
            selector.select(session, &frames)
        };
        info!(
            session = %session,
            sampled = samples_decoded,
            kept = keyframes.len(),
            "video ingested"
        );

        for _ in &keyframes {
            self.manager.record_keyframe(session).await?;
        }
        self.manager
            .begin_analyses(session, keyframes.len() as u32)
            .await?;

        let policy = self.retry_policy();
        for keyframe in keyframes.iter().cloned() {
            let vision = Arc::clone(&self.vision);
            let slots = Arc::clone(&self.analysis_slots);
            let manager = self.manager.clone();
            tokio::spawn(async move {
                let outcome =
                    run_analysis(&*vision, &slots, &keyframe, PromptProfile::Survey, policy)
                        .await;
                manager
                    .settle_analysis(keyframe.session_id, keyframe.id, outcome)
                    .await;
            });
        }

        Ok(VideoIngestReceipt {
            samples_decoded,
            keyframes_admitted: keyframes.len(),
        })
    }

    /// Single deliberate photo, analyzed with the detail profile and merged
    /// synchronously. Returns this call's detections.
    pub async fn ingest_image(
        &self,
        session: Uuid,
        bytes: &[u8],
    ) -> Result<Vec<DetectedObject>, CaptureError> {
        self.manager
            .record_ingest(session, CaptureMode::Image)
            .await?;
        let image = decode_image(bytes)?;
        let keyframe = self.admit(session, RawFrame::new(image, 0.0));
        self.manager.record_keyframe(session).await?;
        self.manager.begin_analyses(session, 1).await?;

        let outcome = self
            .analyze_keyframe(&keyframe, PromptProfile::Detail, self.retry_policy())
            .await;
        Ok(self
            .manager
            .settle_analysis_returning(session, keyframe.id, outcome)
            .await)
    }

    /// Rapid-mode burst: every snap is a keyframe, analyzed concurrently
    /// within the shared parallelism bound. Undecodable snaps are skipped.
    /// Returns the batch's detections in snap order.
    pub async fn ingest_batch(
        &self,
        session: Uuid,
        snaps: Vec<(Vec<u8>, f64)>,
    ) -> Result<Vec<DetectedObject>, CaptureError> {
        self.manager
            .record_ingest(session, CaptureMode::Rapid)
            .await?;

        let mut keyframes = Vec::with_capacity(snaps.len());
        for (bytes, timestamp_secs) in &snaps {
            match decode_image(bytes) {
                Ok(image) => {
                    let keyframe = self.admit(session, RawFrame::new(image, *timestamp_secs));
                    self.manager.record_keyframe(session).await?;
                    keyframes.push(keyframe);
                }
                Err(e) => warn!(session = %session, "skipping undecodable snap: {e}"),
            }
        }
        self.manager
            .begin_analyses(session, keyframes.len() as u32)
            .await?;

        let policy = self.retry_policy();
        let analyses = keyframes.iter().map(|keyframe| async move {
            let outcome = self
                .analyze_keyframe(keyframe, PromptProfile::Survey, policy)
                .await;
            self.manager
                .settle_analysis_returning(session, keyframe.id, outcome)
                .await
        });

        let mut contributions = Vec::new();
        for batch in join_all(analyses).await {
            contributions.extend(batch);
        }
        Ok(contributions)
    }

    /// Continuous-scan frame. Accumulates into the session like any other
    /// keyframe; the return value carries only this frame's contributions,
    /// already routed through the deduplicator.
    pub async fn ingest_scan_frame(
        &self,
        session: Uuid,
        bytes: &[u8],
        timestamp_secs: f64,
    ) -> Result<Vec<DetectedObject>, CaptureError> {
        self.manager
            .record_ingest(session, CaptureMode::Scan)
            .await?;
        let image = decode_image(bytes)?;
        let keyframe = self.admit(session, RawFrame::new(image, timestamp_secs));
        self.manager.record_keyframe(session).await?;
        self.manager.begin_analyses(session, 1).await?;

        let outcome = self
            .analyze_keyframe(&keyframe, PromptProfile::Survey, self.retry_policy())
            .await;
        Ok(self
            .manager
            .settle_analysis_returning(session, keyframe.id, outcome)
            .await)
    }

    pub async fn subscribe_progress(
        &self,
        session: Uuid,
    ) -> Result<BroadcastStream<ProgressEvent>, CaptureError> {
        self.manager.subscribe(session).await
    }

    /// Stops ingestion, waits for every in-flight analysis to settle, and
    /// returns the frozen candidate list with its advisories and counters.
    pub async fn finalize_session(
        &self,
        session: Uuid,
    ) -> Result<FinalizedSession, CaptureError> {
        let finalized = self.manager.finalize(session).await?;
        self.selectors
            .lock()
            .expect("selector registry poisoned")
            .remove(&session);
        Ok(finalized)
    }

    pub async fn session(&self, session: Uuid) -> Result<CaptureSession, CaptureError> {
        self.manager.snapshot(session).await
    }

    /// Interactive one-shot detection for a live overlay: no session, no
    /// retries, a short hard budget, and failure degrades to an empty list.
    /// Skips the analysis slots — the overlay must not queue behind a
    /// batch ingestion.
    pub async fn detect_single_frame(
        &self,
        bytes: &[u8],
    ) -> Result<Vec<DetectedObject>, CaptureError> {
        let image = decode_image(bytes)?;
        let budget = Duration::from_secs(self.config.interactive_timeout_secs);
        match tokio::time::timeout(budget, self.vision.analyze(&image, PromptProfile::Survey))
            .await
        {
            Ok(Ok(analysis)) => Ok(analysis.objects),
            Ok(Err(e)) => {
                warn!("interactive detection failed: {e}");
                Ok(Vec::new())
            }
            Err(_) => {
                warn!("interactive detection exceeded its budget");
                Ok(Vec::new())
            }
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.max_retries,
            Duration::from_millis(self.config.retry_backoff_ms),
        )
    }

    fn admit(&self, session: Uuid, frame: RawFrame) -> Keyframe {
        let mut selectors = self.selectors.lock().expect("selector registry poisoned");
        selectors
            .entry(session)
            .or_insert_with(|| KeyframeSelector::new(&self.config))
            .admit_unfiltered(session, &frame)
    }

    async fn analyze_keyframe(
        &self,
        keyframe: &Keyframe,
        profile: PromptProfile,
        policy: RetryPolicy,
    ) -> AnalysisOutcome {
        run_analysis(
            self.vision.as_ref(),
            &self.analysis_slots,
            keyframe,
            profile,
            policy,
        )
        .await
    }
}

/// One keyframe's bounded, retried analysis. Detections are stamped with
/// their source keyframe and paired with the perceptual fingerprint of
/// their bounding-box crop.
async fn run_analysis(
    vision: &dyn VisionBackend,
    slots: &Semaphore,
    keyframe: &Keyframe,
    profile: PromptProfile,
    policy: RetryPolicy,
) -> AnalysisOutcome {
    let _permit = slots.acquire().await.expect("analysis semaphore closed");

    match analyze_with_retry(vision, &keyframe.image, profile, policy).await {
        Ok(analysis) => {
            let hasher = PerceptualHasher::default();
            let objects = analysis
                .objects
                .into_iter()
                .map(|object| {
                    let object = object.with_source(keyframe.id);
                    let fingerprint = fingerprint_crop(&hasher, &keyframe.image, &object);
                    (object, fingerprint)
                })
                .collect();
            AnalysisOutcome::Detections {
                objects,
                skipped: analysis.skipped as u32,
            }
        }
        Err(e) => {
            warn!(keyframe = %keyframe.id, "analysis degraded to empty contribution: {e}");
            AnalysisOutcome::Failed
        }
    }
}

fn fingerprint_crop(
    hasher: &PerceptualHasher,
    image: &DynamicImage,
    detection: &DetectedObject,
) -> Option<ImageHash> {
    let bb = detection.bounding_box?;
    let (x, y, w, h) = bb.to_pixels(image.width(), image.height());
    // Tiny crops hash to noise.
    if w < 8 || h < 8 {
        return None;
    }
    let crop = image.crop_imm(x, y, w, h);
    Some(hasher.hash_from_img(&crop))
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage, CaptureError> {
    image::load_from_memory(bytes)
        .map_err(|e| CaptureError::Decode(DecodeError::Image(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::session::SessionState;
    use crate::types::Category;
    use crate::vision::FrameAnalysis;
    use async_trait::async_trait;
    use image::{ImageBuffer, Rgb};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn detection(name: &str, category: Category, confidence: f32) -> DetectedObject {
        DetectedObject {
            name: name.to_string(),
            description: String::new(),
            category,
            is_book: false,
            confidence,
            bounding_box: None,
            needs_closer_look: false,
            closer_look_reason: None,
            estimated_value_usd: None,
            condition: None,
            brand: None,
            model_number: None,
            visible_text: None,
            barcode_present: false,
            source_keyframe: Uuid::new_v4(),
        }
    }

    /// Returns the same detections for every frame, after an optional delay.
    struct StaticBackend {
        objects: Vec<DetectedObject>,
        delay: Duration,
        calls: AtomicU32,
        last_profile: Mutex<Option<PromptProfile>>,
    }

    impl StaticBackend {
        fn returning(objects: Vec<DetectedObject>) -> Arc<Self> {
            Arc::new(Self {
                objects,
                delay: Duration::from_millis(5),
                calls: AtomicU32::new(0),
                last_profile: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl VisionBackend for StaticBackend {
        async fn analyze(
            &self,
            _image: &DynamicImage,
            profile: PromptProfile,
        ) -> Result<FrameAnalysis, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_profile.lock().unwrap() = Some(profile);
            tokio::time::sleep(self.delay).await;
            Ok(FrameAnalysis {
                objects: self.objects.clone(),
                skipped: 0,
            })
        }
    }

    struct TimeoutBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl VisionBackend for TimeoutBackend {
        async fn analyze(
            &self,
            _image: &DynamicImage,
            _profile: PromptProfile,
        ) -> Result<FrameAnalysis, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AnalysisError::Timeout)
        }
    }

    /// Emits distinct synthetic frames without touching ffmpeg.
    struct SyntheticDecoder {
        frames: usize,
    }

    #[async_trait]
    impl VideoDecoder for SyntheticDecoder {
        async fn decode(&self, _video: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
            Ok((0..self.frames as u32)
                .map(|i| RawFrame::new(noisy_image(i * 13 + 1), i as f64))
                .collect())
        }
    }

    struct FailingDecoder;

    #[async_trait]
    impl VideoDecoder for FailingDecoder {
        async fn decode(&self, _video: &[u8]) -> Result<Vec<RawFrame>, DecodeError> {
            Err(DecodeError::Video("moov atom not found".to_string()))
        }
    }

    fn noisy_image(seed: u32) -> DynamicImage {
        // Spatial frequency varies with the seed, so frames differ in
        // structure, not just pixel values, and hash far apart.
        let fx = seed % 5 + 1;
        let fy = seed % 7 + 2;
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(64, 64, |x, y| {
            let v = (x.wrapping_mul(fx).wrapping_mul(31)
                ^ y.wrapping_mul(fy).wrapping_mul(17)
                ^ seed.wrapping_mul(2654435761)) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_add(101)])
        }))
    }

    fn png_bytes(seed: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        noisy_image(seed)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    fn test_config() -> Configuration {
        Configuration {
            blur_threshold: 10.0,
            max_retries: 1,
            retry_backoff_ms: 1,
            interactive_timeout_secs: 1,
            ..Configuration::default()
        }
    }

    fn service(
        vision: Arc<dyn VisionBackend>,
        decoder: Arc<dyn VideoDecoder>,
    ) -> Arc<CaptureService> {
        Arc::new(CaptureService::new(
            test_config(),
            vision,
            decoder,
            Arc::new(OpenRoomDirectory),
        ))
    }

    #[tokio::test]
    async fn unresolvable_room_is_rejected() {
        let svc = service(
            StaticBackend::returning(vec![]),
            Arc::new(SyntheticDecoder { frames: 1 }),
        );
        let result = svc.start_session("   ", CaptureMode::Video).await;
        assert!(matches!(result, Err(CaptureError::InvalidRoom(_))));
    }

    #[tokio::test]
    async fn ingestion_must_match_the_session_mode() {
        let backend = StaticBackend::returning(vec![detection(
            "Coat rack",
            Category::Furniture,
            0.9,
        )]);
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 1 }));

        let id = svc.start_session("hallway", CaptureMode::Scan).await.unwrap();
        assert!(matches!(
            svc.ingest_video(id, vec![0u8; 16]).await,
            Err(CaptureError::WrongMode(CaptureMode::Scan))
        ));
        assert!(matches!(
            svc.ingest_image(id, &png_bytes(1)).await,
            Err(CaptureError::WrongMode(CaptureMode::Scan))
        ));

        // The rejection leaves the session untouched.
        let detections = svc.ingest_scan_frame(id, &png_bytes(1), 0.0).await.unwrap();
        assert_eq!(detections.len(), 1);
        let snapshot = svc.session(id).await.unwrap();
        assert_eq!(snapshot.media_count, 1);
    }

    #[tokio::test]
    async fn video_walkthrough_end_to_end() {
        let backend = StaticBackend::returning(vec![detection(
            "Sofa",
            Category::Furniture,
            0.85,
        )]);
        let svc = service(backend.clone(), Arc::new(SyntheticDecoder { frames: 6 }));

        let id = svc.start_session("living-room", CaptureMode::Video).await.unwrap();
        let receipt = svc.ingest_video(id, vec![0u8; 16]).await.unwrap();
        assert_eq!(receipt.samples_decoded, 6);
        assert!(receipt.keyframes_admitted >= 1);

        let finalized = svc.finalize_session(id).await.unwrap();
        assert_eq!(finalized.state, SessionState::Completed);
        // Every frame reported the same sofa; dedup collapses it to one.
        assert_eq!(finalized.candidates.len(), 1);
        assert_eq!(
            finalized.candidates[0].members.len(),
            receipt.keyframes_admitted
        );
        assert_eq!(
            backend.calls.load(Ordering::SeqCst) as usize,
            receipt.keyframes_admitted
        );
    }

    #[tokio::test]
    async fn sole_undecodable_video_fails_the_session() {
        let svc = service(StaticBackend::returning(vec![]), Arc::new(FailingDecoder));
        let id = svc.start_session("garage", CaptureMode::Video).await.unwrap();

        let result = svc.ingest_video(id, vec![0u8; 16]).await;
        assert!(matches!(result, Err(CaptureError::Decode(_))));

        let finalized = svc.finalize_session(id).await.unwrap();
        assert_eq!(finalized.state, SessionState::Failed);
        assert!(finalized.candidates.is_empty());
    }

    #[tokio::test]
    async fn exhausted_retries_degrade_frames_not_the_session() {
        let backend = Arc::new(TimeoutBackend {
            calls: AtomicU32::new(0),
        });
        let svc = service(backend.clone(), Arc::new(SyntheticDecoder { frames: 2 }));

        let id = svc.start_session("office", CaptureMode::Video).await.unwrap();
        let receipt = svc.ingest_video(id, vec![0u8; 16]).await.unwrap();
        assert!(receipt.keyframes_admitted >= 2);

        let finalized = svc.finalize_session(id).await.unwrap();
        assert_eq!(finalized.state, SessionState::Completed);
        assert!(finalized.candidates.is_empty());
        assert_eq!(
            finalized.skipped_keyframes as usize,
            receipt.keyframes_admitted
        );
        // max_retries = 1: two attempts per keyframe.
        assert_eq!(
            backend.calls.load(Ordering::SeqCst) as usize,
            receipt.keyframes_admitted * 2
        );
    }

    #[tokio::test]
    async fn scan_frames_return_only_their_own_contributions() {
        let backend = StaticBackend::returning(vec![detection(
            "Coffee mug",
            Category::Kitchenware,
            0.8,
        )]);
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 0 }));

        let id = svc.start_session("kitchen", CaptureMode::Scan).await.unwrap();
        let first = svc.ingest_scan_frame(id, &png_bytes(1), 0.5).await.unwrap();
        let second = svc.ingest_scan_frame(id, &png_bytes(2), 1.0).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1, "only this call's detections come back");

        let finalized = svc.finalize_session(id).await.unwrap();
        assert_eq!(finalized.candidates.len(), 1, "both sightings merged");
        assert_eq!(finalized.candidates[0].members.len(), 2);
    }

    #[tokio::test]
    async fn rapid_batch_merges_across_snaps() {
        let backend = StaticBackend::returning(vec![detection("Lamp", Category::Decor, 0.9)]);
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 0 }));

        let id = svc.start_session("bedroom", CaptureMode::Rapid).await.unwrap();
        let snaps = vec![
            (png_bytes(1), 0.0),
            (png_bytes(2), 0.4),
            (png_bytes(3), 0.8),
        ];
        let contributions = svc.ingest_batch(id, snaps).await.unwrap();
        assert_eq!(contributions.len(), 3);

        let finalized = svc.finalize_session(id).await.unwrap();
        assert_eq!(finalized.candidates.len(), 1);
        assert_eq!(finalized.candidates[0].members.len(), 3);
    }

    #[tokio::test]
    async fn image_mode_uses_the_detail_profile() {
        let backend = StaticBackend::returning(vec![detection(
            "Espresso machine",
            Category::Appliances,
            0.9,
        )]);
        let svc = service(backend.clone(), Arc::new(SyntheticDecoder { frames: 0 }));

        let id = svc.start_session("kitchen", CaptureMode::Image).await.unwrap();
        let detections = svc.ingest_image(id, &png_bytes(7)).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(
            *backend.last_profile.lock().unwrap(),
            Some(PromptProfile::Detail)
        );
    }

    #[tokio::test]
    async fn undecodable_image_surfaces_without_killing_the_session() {
        let backend = StaticBackend::returning(vec![detection("Chair", Category::Furniture, 0.9)]);
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 0 }));

        let id = svc.start_session("study", CaptureMode::Image).await.unwrap();
        let result = svc.ingest_image(id, b"not an image").await;
        assert!(matches!(result, Err(CaptureError::Decode(_))));

        // The session keeps accepting media.
        let detections = svc.ingest_image(id, &png_bytes(3)).await.unwrap();
        assert_eq!(detections.len(), 1);
    }

    #[tokio::test]
    async fn interactive_detection_times_out_to_an_empty_list() {
        let backend = Arc::new(StaticBackend {
            objects: vec![detection("Plant", Category::Decor, 0.9)],
            delay: Duration::from_secs(5),
            calls: AtomicU32::new(0),
            last_profile: Mutex::new(None),
        });
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 0 }));

        let detections = svc.detect_single_frame(&png_bytes(9)).await.unwrap();
        assert!(detections.is_empty());
    }

    #[tokio::test]
    async fn interactive_detection_returns_detections_in_budget() {
        let backend = StaticBackend::returning(vec![detection("Plant", Category::Decor, 0.9)]);
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 0 }));
        let detections = svc.detect_single_frame(&png_bytes(9)).await.unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].name, "Plant");
    }

    #[tokio::test]
    async fn progress_stream_reaches_done_with_ordered_sequence() {
        use tokio_stream::StreamExt;

        let backend = StaticBackend::returning(vec![detection(
            "Bookcase",
            Category::Furniture,
            0.9,
        )]);
        let svc = service(backend, Arc::new(SyntheticDecoder { frames: 3 }));

        let id = svc.start_session("den", CaptureMode::Video).await.unwrap();
        let mut stream = svc.subscribe_progress(id).await.unwrap();
        svc.ingest_video(id, vec![0u8; 16]).await.unwrap();
        let _ = svc.finalize_session(id).await.unwrap();

        let mut last: Option<u64> = None;
        let mut terminal = false;
        while let Ok(Some(Ok(event))) =
            tokio::time::timeout(Duration::from_secs(2), stream.next()).await
        {
            if let Some(prev) = last {
                assert!(event.seq > prev);
            }
            last = Some(event.seq);
            if event.status.is_terminal() {
                terminal = true;
                break;
            }
        }
        assert!(terminal, "listener must observe the terminal event");
    }
}

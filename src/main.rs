use std::sync::Arc;

use roomscan::config::Configuration;
use roomscan::keyframe::FfmpegDecoder;
use roomscan::service::{CaptureService, OpenRoomDirectory};
use roomscan::session::CaptureMode;
use roomscan::vision::HttpVisionClient;
use tracing::{info, Level};

fn init_logging() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let configuration = Configuration::from_env()?;

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: roomscan <photo> [room]");
        return Ok(());
    };
    let room = std::env::args().nth(2).unwrap_or_else(|| "unsorted".to_string());

    let vision = Arc::new(HttpVisionClient::new(&configuration));
    let decoder = Arc::new(FfmpegDecoder::new(&configuration));
    let service = CaptureService::new(
        configuration,
        vision,
        decoder,
        Arc::new(OpenRoomDirectory),
    );

    let bytes = tokio::fs::read(&path).await?;
    let session = service.start_session(&room, CaptureMode::Image).await?;
    let detections = service.ingest_image(session, &bytes).await?;
    for detected in &detections {
        info!(
            name = %detected.name,
            category = ?detected.category,
            confidence = detected.confidence,
            "detected"
        );
    }

    let finalized = service.finalize_session(session).await?;
    info!(
        candidates = finalized.candidates.len(),
        advisories = finalized.advisories.len(),
        "session complete"
    );
    for advisory in &finalized.advisories {
        info!("advisory: {}", advisory.message);
    }
    Ok(())
}

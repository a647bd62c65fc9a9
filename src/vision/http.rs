use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::Configuration;
use crate::error::AnalysisError;

use super::parse::parse_detections;
use super::{FrameAnalysis, PromptProfile, VisionBackend};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages-API shaped client for the external vision-reasoning model.
/// One image plus a fixed-schema prompt per call; per-call timeout;
/// failure classification feeds the retry policy upstream.
pub struct HttpVisionClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

#[derive(Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

impl HttpVisionClient {
    pub fn new(config: &Configuration) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.vision_endpoint.clone(),
            model: config.vision_model.clone(),
            api_key: config.vision_api_key.clone(),
            timeout: Duration::from_secs(config.analysis_timeout_secs),
        }
    }

    /// Interactive paths trade thoroughness for latency.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn encode_jpeg(image: &DynamicImage) -> Result<String, AnalysisError> {
        let mut buf = Cursor::new(Vec::new());
        image
            .write_to(&mut buf, image::ImageFormat::Jpeg)
            .map_err(|e| AnalysisError::Transport(format!("jpeg encode failed: {e}")))?;
        Ok(STANDARD.encode(buf.into_inner()))
    }
}

#[async_trait]
impl VisionBackend for HttpVisionClient {
    async fn analyze(
        &self,
        image: &DynamicImage,
        profile: PromptProfile,
    ) -> Result<FrameAnalysis, AnalysisError> {
        let body = json!({
            "model": self.model,
            "max_tokens": profile.max_tokens(),
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image",
                        "source": {
                            "type": "base64",
                            "media_type": "image/jpeg",
                            "data": Self::encode_jpeg(image)?,
                        },
                    },
                    { "type": "text", "text": profile.text() },
                ],
            }],
        });

        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AnalysisError::Http(status.as_u16()));
        }

        let message: MessageResponse = response
            .json()
            .await
            .map_err(|_| AnalysisError::Parse)?;
        let text = message
            .content
            .iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .ok_or(AnalysisError::Parse)?;

        debug!(profile = ?profile, bytes = text.len(), "vision reply received");
        parse_detections(text)
    }
}

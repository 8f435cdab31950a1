use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::SpeechSynthesizer;
use crate::config::ElevenLabsConfig;
use crate::error::{Result, VideoError};
use crate::scene::request::validate_voice_id;
use crate::scene::{NarrationAudio, Voice};
use crate::video::probe::probe_duration;

const OUTPUT_FORMAT: &str = "mp3_44100_128";

/// Client for speech synthesis and voice listing.
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    config: ElevenLabsConfig,
    ffprobe: PathBuf,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<Voice>,
}

impl ElevenLabsClient {
    /// `ffprobe` measures the returned audio; its length is never estimated.
    pub fn new(config: ElevenLabsConfig, ffprobe: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VideoError::EnvError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            ffprobe: ffprobe.into(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn measure(&self, audio: &[u8]) -> Result<f64> {
        let file = tempfile::Builder::new()
            .prefix("narration-")
            .suffix(".mp3")
            .tempfile()?;
        tokio::fs::write(file.path(), audio).await?;

        probe_duration(&self.ffprobe, file.path())
            .await
            .map_err(|e| VideoError::Narration(format!("could not measure audio duration: {}", e.diagnostic())))
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<NarrationAudio> {
        validate_voice_id(voice_id)?;
        if text.trim().is_empty() {
            return Err(VideoError::Narration("narration text is empty".to_string()));
        }
        info!("Generating speech with voice {} ({} characters)", voice_id, text.len());

        let request_body = json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost
            }
        });

        let response = self
            .client
            .post(self.url(&format!("text-to-speech/{}", voice_id)))
            .query(&[("output_format", OUTPUT_FORMAT)])
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| VideoError::Narration(format!("speech API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VideoError::Narration(format!(
                "speech API error (HTTP {}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| VideoError::Narration(format!("speech API response failed: {}", e)))?
            .to_vec();
        if audio.is_empty() {
            return Err(VideoError::Narration("speech API returned no audio".to_string()));
        }

        let duration = self.measure(&audio).await?;
        info!("Speech generated: {:.2}s, {} bytes", duration, audio.len());

        Ok(NarrationAudio::new(audio, duration, voice_id, "mp3"))
    }

    async fn list_voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(self.url("voices"))
            .header("xi-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| VideoError::Narration(format!("voice listing failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VideoError::Narration(format!(
                "voice listing error (HTTP {}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: VoicesResponse = response
            .json()
            .await
            .map_err(|e| VideoError::Narration(format!("unreadable voice listing: {}", e)))?;

        debug!("Fetched {} voices", body.voices.len());
        Ok(body.voices)
    }
}

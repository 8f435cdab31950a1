use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::base64_bytes;
use super::{GenerationRequest, SceneImage, SceneScript};

/// Synthesized narration track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrationAudio {
    pub id: Uuid,
    #[serde(rename = "audio_base64", with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Measured from the returned audio, authoritative for all timing
    pub duration: f64,
    pub voice_id: String,
    /// Container/codec tag, e.g. `mp3`
    pub format: String,
}

impl NarrationAudio {
    pub fn new(data: Vec<u8>, duration: f64, voice_id: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            duration,
            voice_id: voice_id.into(),
            format: format.into(),
        }
    }
}

/// A voice offered by the speech service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub labels: VoiceLabels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceLabels {
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub use_case: Option<String>,
    /// Any label the service adds beyond the known ones
    #[serde(flatten)]
    pub other: HashMap<String, String>,
}

/// One timed caption, visible during `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleCue {
    pub words: Vec<String>,
    pub start: f64,
    pub end: f64,
}

impl SubtitleCue {
    /// Caption text as rendered on screen.
    pub fn display_text(&self) -> String {
        self.words.join(" ").to_uppercase()
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// The encoded portrait video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoArtifact {
    pub id: Uuid,
    #[serde(rename = "video_base64", with = "base64_bytes")]
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub format: String,
}

impl VideoArtifact {
    pub fn new(data: Vec<u8>, width: u32, height: u32, duration: f64, format: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            width,
            height,
            duration,
            format: format.into(),
        }
    }

    /// `WIDTHxHEIGHT`, e.g. `1080x1920`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// Everything one complete run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub project_id: Uuid,
    pub request: GenerationRequest,
    pub script: SceneScript,
    pub images: Vec<SceneImage>,
    pub audio: NarrationAudio,
    pub subtitles: Vec<SubtitleCue>,
    pub video: VideoArtifact,
    pub created_at: DateTime<Utc>,
}

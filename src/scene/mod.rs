mod media;
pub(crate) mod request;

pub use media::{NarrationAudio, PipelineResult, SubtitleCue, VideoArtifact, Voice, VoiceLabels};
pub use request::{GenerationRequest, MAX_DURATION_SECS, MIN_DURATION_SECS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The generated script: narration text plus its ordered scene breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneScript {
    pub id: Uuid,
    /// Prompt the script was written for
    pub prompt: String,
    /// Requested duration in seconds
    pub duration: u32,
    /// Full narration text, read out by the voice stage
    pub script_text: String,
    /// One short visual description per scene, in display order
    pub scenes: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl SceneScript {
    pub fn new(prompt: String, duration: u32, script_text: String, scenes: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            prompt,
            duration,
            script_text,
            scenes,
            created_at: Utc::now(),
        }
    }
}

/// Which image model actually served a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageModel {
    Primary,
    Fallback,
}

impl std::fmt::Display for ImageModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageModel::Primary => write!(f, "primary"),
            ImageModel::Fallback => write!(f, "fallback"),
        }
    }
}

/// One generated still, owned by the scene at `scene_index`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneImage {
    pub id: Uuid,
    pub scene_index: usize,
    pub scene_description: String,
    /// Prompt actually sent, scene description plus style directive
    pub prompt: String,
    #[serde(rename = "image_base64", with = "base64_bytes")]
    pub data: Vec<u8>,
    pub model: ImageModel,
    /// Provider model name, e.g. `gpt-image-1`
    pub model_name: String,
}

impl SceneImage {
    pub fn new(
        scene_index: usize,
        scene_description: String,
        prompt: String,
        data: Vec<u8>,
        model: ImageModel,
        model_name: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            scene_index,
            scene_description,
            prompt,
            data,
            model,
            model_name,
        }
    }

    /// File extension matching the encoded payload.
    pub fn extension(&self) -> &'static str {
        match image::guess_format(&self.data) {
            Ok(image::ImageFormat::Jpeg) => "jpg",
            Ok(image::ImageFormat::WebP) => "webp",
            _ => "png",
        }
    }
}

/// Serializes binary artifacts as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

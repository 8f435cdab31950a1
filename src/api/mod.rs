//! External service seams.
//!
//! Each generation service sits behind a small trait so the coordinator can
//! run against real HTTP clients or test doubles alike.

pub mod elevenlabs;
pub mod openai;
pub mod script;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{Result, VideoError};
use crate::scene::{ImageModel, NarrationAudio, SceneImage, SceneScript, Voice};

pub use elevenlabs::ElevenLabsClient;
pub use openai::OpenAiClient;

/// Receiver side of a cancellation flag; `true` means cancelled.
pub type CancelSignal = watch::Receiver<bool>;

/// A signal that never fires.
pub fn never_cancel() -> CancelSignal {
    let (_tx, rx) = watch::channel(false);
    rx
}

pub fn is_cancelled(cancel: &CancelSignal) -> bool {
    *cancel.borrow()
}

/// Resolves once the signal is raised. A dropped sender never resolves.
pub async fn cancelled(cancel: &mut CancelSignal) {
    if cancel.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Turns a prompt and target length into a scene script.
#[async_trait]
pub trait ScriptWriter: Send + Sync {
    async fn write_script(&self, prompt: &str, duration: u32) -> Result<SceneScript>;
}

/// Outcome of a single image call that did not produce an image.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageCallError {
    /// The account or tier may not use this model; another model may work
    #[error("capability rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Failed(String),
}

/// Renders one styled prompt with the requested model.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    async fn render(&self, model: ImageModel, prompt: &str) -> std::result::Result<Vec<u8>, ImageCallError>;

    /// Provider name of the model behind `model`, for bookkeeping.
    fn model_name(&self, model: ImageModel) -> String {
        model.to_string()
    }
}

/// Speech synthesis plus voice discovery.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<NarrationAudio>;

    async fn list_voices(&self) -> Result<Vec<Voice>>;
}

/// Visual style appended to every scene so one video keeps a single look.
pub const STYLE_PREFIX: &str = "Dramatic artistic charcoal drawing";
pub const STYLE_QUALIFIERS: &str = "Black, grey and white palette only. Grainy texture, strong shadows, rich textures. \
Charcoal and compressed charcoal technique with blending. Dramatic atmosphere, raw emotion, expressive aesthetic. \
Cinematic composition, high-contrast lighting, textured details.";

pub fn styled_prompt(scene: &str) -> String {
    format!("{}: {}. {}", STYLE_PREFIX, scene.trim().trim_end_matches('.'), STYLE_QUALIFIERS)
}

/// Per-scene image generation with a single hop to the fallback model when
/// the primary one is refused for the account.
#[derive(Clone)]
pub struct SceneImageGenerator {
    backend: Arc<dyn ImageBackend>,
}

impl SceneImageGenerator {
    pub fn new(backend: Arc<dyn ImageBackend>) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, scene_index: usize, description: &str) -> Result<SceneImage> {
        let prompt = styled_prompt(description);

        let (model, data) = match self.backend.render(ImageModel::Primary, &prompt).await {
            Ok(data) => (ImageModel::Primary, data),
            Err(ImageCallError::Rejected(reason)) => {
                info!(
                    "Primary image model rejected scene {} ({}), retrying with fallback model",
                    scene_index, reason
                );
                let data = self
                    .backend
                    .render(ImageModel::Fallback, &prompt)
                    .await
                    .map_err(|e| VideoError::image(scene_index, format!("fallback model: {}", e)))?;
                (ImageModel::Fallback, data)
            }
            Err(ImageCallError::Failed(reason)) => {
                warn!("Image generation failed for scene {}: {}", scene_index, reason);
                return Err(VideoError::image(scene_index, reason));
            }
        };

        if data.is_empty() {
            return Err(VideoError::image(scene_index, format!("{} model returned no image", model)));
        }
        let decoded = image::load_from_memory(&data).map_err(|e| {
            VideoError::image(
                scene_index,
                format!("{} model returned an undecodable image: {}", model, e),
            )
        })?;
        debug!(
            "Scene {} image: {}x{}, {} bytes",
            scene_index,
            decoded.width(),
            decoded.height(),
            data.len()
        );

        Ok(SceneImage::new(
            scene_index,
            description.to_string(),
            prompt,
            data,
            model,
            self.backend.model_name(model),
        ))
    }
}

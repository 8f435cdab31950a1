use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Script generation failed: {0}")]
    Generation(String),

    #[error("Image generation failed for scene {scene_index}: {message}")]
    ImageGeneration { scene_index: usize, message: String },

    #[error("Narration failed: {0}")]
    Narration(String),

    #[error("Video assembly failed: {diagnostic}")]
    Assembly { diagnostic: String },

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvError(String),
}

impl VideoError {
    pub fn assembly(diagnostic: impl Into<String>) -> Self {
        Self::Assembly {
            diagnostic: diagnostic.into(),
        }
    }

    pub fn image(scene_index: usize, message: impl Into<String>) -> Self {
        Self::ImageGeneration {
            scene_index,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VideoError>;

/// A full pipeline run that stopped at exactly one stage.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {cause}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub cause: VideoError,
}

impl PipelineFailure {
    pub fn new(stage: Stage, cause: VideoError) -> Self {
        Self { stage, cause }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, VideoError::Cancelled)
    }
}

pub mod command;
mod generator;
pub mod probe;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::CancelSignal;
use crate::error::Result;
use crate::scene::{NarrationAudio, SceneImage, SubtitleCue, VideoArtifact};

pub use command::{FfmpegCommand, FfmpegRunner};
pub use generator::{SlideshowPlan, VideoGenerator};

/// Failures of the external media tools.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found")]
    ToolNotFound(String),

    #[error("{message}")]
    Failed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn failed(message: impl Into<String>, stderr: Option<String>, exit_code: Option<i32>) -> Self {
        Self::Failed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Message plus whatever the tool printed, for user-facing reports.
    pub fn diagnostic(&self) -> String {
        match self {
            MediaError::Failed {
                message,
                stderr: Some(stderr),
                exit_code,
            } if !stderr.trim().is_empty() => match exit_code {
                Some(code) => format!("{} (exit code {}): {}", message, code, stderr.trim()),
                None => format!("{}: {}", message, stderr.trim()),
            },
            MediaError::Failed {
                message,
                exit_code: Some(code),
                ..
            } => format!("{} (exit code {})", message, code),
            other => other.to_string(),
        }
    }
}

/// Final stage: composites stills, narration and captions into one video.
#[async_trait]
pub trait VideoAssembler: Send + Sync {
    async fn assemble(
        &self,
        images: &[SceneImage],
        narration: &NarrationAudio,
        cues: &[SubtitleCue],
        cancel: CancelSignal,
    ) -> Result<VideoArtifact>;
}

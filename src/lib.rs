//! Turns a short prompt into a narrated, subtitled vertical video.
//!
//! A [`Pipeline`] writes a script, illustrates each scene, synthesizes the
//! narration, times the captions against the measured audio, and hands the
//! lot to FFmpeg for a single encode.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod scene;
pub mod subtitle;
pub mod video;

pub use api::{never_cancel, CancelSignal, ImageBackend, ImageCallError, ScriptWriter, SpeechSynthesizer};
pub use config::Config;
pub use error::{PipelineFailure, Result, VideoError};
pub use pipeline::{Pipeline, PipelineState, Stage};
pub use scene::{
    GenerationRequest, ImageModel, NarrationAudio, PipelineResult, SceneImage, SceneScript, SubtitleCue,
    VideoArtifact, Voice,
};
pub use video::{VideoAssembler, VideoGenerator};

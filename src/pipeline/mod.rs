//! Pipeline coordinator.
//!
//! Stages run strictly in order: script, images, narration, subtitles,
//! assembly. A run either completes with every artifact or stops at the
//! first failing stage, which is named in the returned [`PipelineFailure`].
//! The narrow operations on [`Pipeline`] expose single stages for callers
//! that want partial output.

mod images;

pub use images::generate_in_order;

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::{
    cancelled, is_cancelled, CancelSignal, ElevenLabsClient, ImageBackend, OpenAiClient, SceneImageGenerator,
    ScriptWriter, SpeechSynthesizer,
};
use crate::config::{Config, PipelineLimits};
use crate::error::{PipelineFailure, Result, VideoError};
use crate::scene::request::{validate_prompt, validate_voice_id};
use crate::scene::{GenerationRequest, NarrationAudio, PipelineResult, SceneImage, SceneScript, SubtitleCue, Voice};
use crate::subtitle::{build_cues, DEFAULT_WORDS_PER_CUE};
use crate::video::{VideoAssembler, VideoGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ScriptGeneration,
    ImageGeneration,
    NarrationGeneration,
    SubtitleBuild,
    VideoAssembly,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ScriptGeneration,
        Stage::ImageGeneration,
        Stage::NarrationGeneration,
        Stage::SubtitleBuild,
        Stage::VideoAssembly,
    ];

    /// The stage that follows this one, `None` after assembly.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::ScriptGeneration => Some(Stage::ImageGeneration),
            Stage::ImageGeneration => Some(Stage::NarrationGeneration),
            Stage::NarrationGeneration => Some(Stage::SubtitleBuild),
            Stage::SubtitleBuild => Some(Stage::VideoAssembly),
            Stage::VideoAssembly => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::ScriptGeneration => "script generation",
            Stage::ImageGeneration => "image generation",
            Stage::NarrationGeneration => "narration generation",
            Stage::SubtitleBuild => "subtitle build",
            Stage::VideoAssembly => "video assembly",
        };
        f.write_str(name)
    }
}

/// Where a run currently is, as published to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Running { stage: Stage },
    Complete,
    Failed { stage: Stage, cause: String },
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Complete | PipelineState::Failed { .. })
    }
}

/// Sequences the adapters for one or many independent runs.
///
/// Holds no per-run state, so one `Pipeline` can serve concurrent runs.
#[derive(Clone)]
pub struct Pipeline {
    writer: Arc<dyn ScriptWriter>,
    images: SceneImageGenerator,
    speech: Arc<dyn SpeechSynthesizer>,
    assembler: Arc<dyn VideoAssembler>,
    limits: PipelineLimits,
    words_per_cue: usize,
}

impl Pipeline {
    pub fn new(
        writer: Arc<dyn ScriptWriter>,
        images: Arc<dyn ImageBackend>,
        speech: Arc<dyn SpeechSynthesizer>,
        assembler: Arc<dyn VideoAssembler>,
    ) -> Self {
        Self {
            writer,
            images: SceneImageGenerator::new(images),
            speech,
            assembler,
            limits: PipelineLimits::default(),
            words_per_cue: DEFAULT_WORDS_PER_CUE,
        }
    }

    /// Wires the HTTP clients and the FFmpeg assembler from one config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let openai = Arc::new(OpenAiClient::new(config.openai.clone(), config.limits.max_scenes)?);
        let speech = Arc::new(ElevenLabsClient::new(
            config.elevenlabs.clone(),
            config.render.ffprobe_path.clone(),
        )?);
        let assembler = Arc::new(VideoGenerator::new(config.render.clone()));

        Ok(Self::new(openai.clone(), openai, speech, assembler)
            .with_limits(config.limits)
            .with_words_per_cue(config.render.words_per_cue))
    }

    pub fn with_limits(mut self, limits: PipelineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_words_per_cue(mut self, words_per_cue: usize) -> Self {
        self.words_per_cue = words_per_cue.max(1);
        self
    }

    pub fn limits(&self) -> PipelineLimits {
        self.limits
    }

    /// Script only. Scenes beyond `max_scenes` are dropped.
    pub async fn generate_script(&self, prompt: &str, duration: u32) -> Result<SceneScript> {
        validate_prompt(prompt, duration)?;

        let mut script = self.writer.write_script(prompt.trim(), duration).await?;
        if script.script_text.trim().is_empty() {
            return Err(VideoError::Generation("script has no narration text".to_string()));
        }
        if script.scenes.is_empty() {
            return Err(VideoError::Generation("script has no scenes".to_string()));
        }

        let max_scenes = self.limits.max_scenes.max(1);
        if script.scenes.len() > max_scenes {
            warn!(
                "Script has {} scenes, keeping the first {}",
                script.scenes.len(),
                max_scenes
            );
            script.scenes.truncate(max_scenes);
        }
        Ok(script)
    }

    /// One image per scene, in scene order.
    pub async fn generate_images(&self, scenes: &[String]) -> Result<Vec<SceneImage>> {
        if scenes.is_empty() {
            return Err(VideoError::InvalidRequest("no scenes to illustrate".to_string()));
        }
        generate_in_order(&self.images, scenes, self.limits.image_concurrency).await
    }

    /// Narration with its measured duration.
    pub async fn generate_narration(&self, text: &str, voice_id: &str) -> Result<NarrationAudio> {
        validate_voice_id(voice_id)?;
        if text.trim().is_empty() {
            return Err(VideoError::InvalidRequest("narration text must not be empty".to_string()));
        }

        let audio = self.speech.synthesize(text, voice_id).await?;
        if !audio.duration.is_finite() || audio.duration <= 0.0 {
            return Err(VideoError::Narration(format!(
                "narration has no usable duration: {}",
                audio.duration
            )));
        }
        Ok(audio)
    }

    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        self.speech.list_voices().await
    }

    pub fn build_subtitles(&self, text: &str, duration: f64) -> Result<Vec<SubtitleCue>> {
        build_cues(text, duration, self.words_per_cue)
    }

    /// Runs every stage for `request`.
    pub async fn run(
        &self,
        request: &GenerationRequest,
        cancel: CancelSignal,
    ) -> std::result::Result<PipelineResult, PipelineFailure> {
        self.run_observed(request, cancel, None).await
    }

    /// Like [`run`](Self::run), publishing every state change to `observer`.
    pub async fn run_observed(
        &self,
        request: &GenerationRequest,
        cancel: CancelSignal,
        observer: Option<&watch::Sender<PipelineState>>,
    ) -> std::result::Result<PipelineResult, PipelineFailure> {
        let project_id = Uuid::new_v4();
        let span = info_span!("pipeline", run_id = %project_id);

        let result = async {
            let run = Run { cancel, observer };
            self.run_stages(project_id, request, &run).await
        }
        .instrument(span)
        .await;

        if let Some(observer) = observer {
            let state = match &result {
                Ok(_) => PipelineState::Complete,
                Err(failure) => PipelineState::Failed {
                    stage: failure.stage,
                    cause: failure.cause.to_string(),
                },
            };
            observer.send_replace(state);
        }
        result
    }

    async fn run_stages(
        &self,
        project_id: Uuid,
        request: &GenerationRequest,
        run: &Run<'_>,
    ) -> std::result::Result<PipelineResult, PipelineFailure> {
        // Malformed requests never reach an external service
        request
            .validate()
            .map_err(|e| PipelineFailure::new(Stage::ScriptGeneration, e))?;
        info!(
            "Starting pipeline: \"{}\" ({}s, voice {})",
            request.prompt, request.duration, request.voice_id
        );

        let script = run
            .guarded(
                Stage::ScriptGeneration,
                self.generate_script(&request.prompt, request.duration),
            )
            .await?;
        info!("Script ready: {} scenes", script.scenes.len());

        let images = run
            .guarded(Stage::ImageGeneration, self.generate_images(&script.scenes))
            .await?;
        info!("Images ready: {}", images.len());

        let audio = run
            .guarded(
                Stage::NarrationGeneration,
                self.generate_narration(&script.script_text, &request.voice_id),
            )
            .await?;
        info!("Narration ready: {:.2}s", audio.duration);

        run.enter(Stage::SubtitleBuild)?;
        let subtitles = self
            .build_subtitles(&script.script_text, audio.duration)
            .map_err(|e| run.fail(Stage::SubtitleBuild, e))?;
        info!("Subtitles ready: {} cues", subtitles.len());

        // The assembler watches the signal itself so it can stop the encoder
        // and clear its working directory before returning
        run.enter(Stage::VideoAssembly)?;
        let video = self
            .assembler
            .assemble(&images, &audio, &subtitles, run.cancel.clone())
            .await
            .map_err(|e| run.fail(Stage::VideoAssembly, e))?;
        info!("Pipeline complete: {:.2}s video", video.duration);

        Ok(PipelineResult {
            project_id,
            request: request.clone(),
            script,
            images,
            audio,
            subtitles,
            video,
            created_at: Utc::now(),
        })
    }
}

/// Per-run plumbing: the cancellation signal and the optional observer.
struct Run<'a> {
    cancel: CancelSignal,
    observer: Option<&'a watch::Sender<PipelineState>>,
}

impl Run<'_> {
    fn enter(&self, stage: Stage) -> std::result::Result<(), PipelineFailure> {
        if is_cancelled(&self.cancel) {
            return Err(self.fail(stage, VideoError::Cancelled));
        }
        info!("Entering {} stage", stage);
        if let Some(observer) = self.observer {
            observer.send_replace(PipelineState::Running { stage });
        }
        Ok(())
    }

    fn fail(&self, stage: Stage, cause: VideoError) -> PipelineFailure {
        match &cause {
            VideoError::Cancelled => warn!("Pipeline cancelled during {} stage", stage),
            other => error!("{} stage failed: {}", stage, other),
        }
        PipelineFailure::new(stage, cause)
    }

    /// Runs `work` as `stage`, abandoning it as soon as cancellation is raised.
    async fn guarded<T, F>(&self, stage: Stage, work: F) -> std::result::Result<T, PipelineFailure>
    where
        F: Future<Output = Result<T>>,
    {
        self.enter(stage)?;

        let mut cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => Err(VideoError::Cancelled),
            result = work => result,
        };
        outcome.map_err(|e| self.fail(stage, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_strictly_ordered() {
        let mut walked = vec![Stage::ScriptGeneration];
        while let Some(next) = walked.last().and_then(|s| s.next()) {
            walked.push(next);
        }
        assert_eq!(walked, Stage::ALL.to_vec());
    }

    #[test]
    fn stage_names_read_well_in_failures() {
        let failure = PipelineFailure::new(Stage::NarrationGeneration, VideoError::Narration("quota".into()));
        assert_eq!(
            failure.to_string(),
            "narration generation stage failed: Narration failed: quota"
        );
        assert!(!failure.is_cancelled());
    }

    #[test]
    fn state_serializes_with_tag() {
        let state = PipelineState::Failed {
            stage: Stage::VideoAssembly,
            cause: "Cancelled".into(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "failed");
        assert_eq!(json["stage"], "video_assembly");
        assert!(state.is_terminal());
        assert!(!PipelineState::Running { stage: Stage::SubtitleBuild }.is_terminal());
    }
}

//! Runtime configuration.
//!
//! Keys, endpoints and limits are collected once into a [`Config`] and handed
//! to each client at construction time. Nothing below the binary reads the
//! process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, VideoError};

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io/v1";
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub primary_image_model: String,
    pub primary_image_size: String,
    pub fallback_image_model: String,
    pub fallback_image_size: String,
    /// Language the narration is written in
    pub language: String,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            text_model: "gpt-4.1".to_string(),
            primary_image_model: "gpt-image-1".to_string(),
            primary_image_size: "1024x1536".to_string(),
            fallback_image_model: "dall-e-3".to_string(),
            fallback_image_size: "1024x1792".to_string(),
            language: "English".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub base_url: String,
    pub model_id: String,
    pub stability: f32,
    pub similarity_boost: f32,
    pub timeout: Duration,
}

impl ElevenLabsConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_ELEVENLABS_BASE_URL.to_string(),
            model_id: "eleven_multilingual_v2".to_string(),
            stability: 0.5,
            similarity_boost: 0.75,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Output format and encoder settings for the final assembly.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Cross-dissolve length between consecutive scenes, in seconds
    pub dissolve_secs: f64,
    /// Words per subtitle cue
    pub words_per_cue: usize,
    pub font_file: Option<PathBuf>,
    pub font_size: u32,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Per-run working directories are created under this root
    pub work_root: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            fps: 30,
            dissolve_secs: 0.5,
            words_per_cue: 4,
            font_file: None,
            font_size: 72,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            work_root: std::env::temp_dir(),
        }
    }
}

/// Limits applied by the pipeline coordinator.
#[derive(Debug, Clone, Copy)]
pub struct PipelineLimits {
    /// Scenes generated at once
    pub image_concurrency: usize,
    /// Scenes kept from a generated script
    pub max_scenes: usize,
}

impl Default for PipelineLimits {
    fn default() -> Self {
        Self {
            image_concurrency: 3,
            max_scenes: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub elevenlabs: ElevenLabsConfig,
    pub render: RenderConfig,
    pub limits: PipelineLimits,
    pub default_voice_id: String,
}

impl Config {
    pub fn new(openai_api_key: impl Into<String>, elevenlabs_api_key: impl Into<String>) -> Self {
        Self {
            openai: OpenAiConfig::new(openai_api_key),
            elevenlabs: ElevenLabsConfig::new(elevenlabs_api_key),
            render: RenderConfig::default(),
            limits: PipelineLimits::default(),
            default_voice_id: DEFAULT_VOICE_ID.to_string(),
        }
    }

    /// Loads `.env`, then reads every key from `overrides` first and the
    /// process environment second.
    pub fn from_env_with<F>(overrides: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        dotenvy::dotenv().ok();
        Self::from_lookup(layered(overrides, |key| std::env::var(key).ok()))
    }

    /// Builds a config from any key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| VideoError::EnvError(format!("{} not set", key)))
        };

        let mut config = Self::new(required("OPENAI_API_KEY")?, required("ELEVENLABS_API_KEY")?);

        if let Some(url) = lookup("OPENAI_BASE_URL") {
            config.openai.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_TEXT_MODEL") {
            config.openai.text_model = model;
        }
        if let Some(model) = lookup("OPENAI_IMAGE_MODEL") {
            config.openai.primary_image_model = model;
        }
        if let Some(model) = lookup("OPENAI_FALLBACK_IMAGE_MODEL") {
            config.openai.fallback_image_model = model;
        }
        if let Some(language) = lookup("SHORTFORM_LANGUAGE") {
            config.openai.language = language;
        }
        if let Some(url) = lookup("ELEVENLABS_BASE_URL") {
            config.elevenlabs.base_url = url;
        }
        if let Some(model) = lookup("ELEVENLABS_MODEL_ID") {
            config.elevenlabs.model_id = model;
        }
        if let Some(voice) = lookup("SHORTFORM_DEFAULT_VOICE") {
            config.default_voice_id = voice;
        }
        if let Some(font) = lookup("SHORTFORM_FONT_FILE") {
            config.render.font_file = Some(PathBuf::from(font));
        }
        if let Some(path) = lookup("SHORTFORM_FFMPEG") {
            config.render.ffmpeg_path = PathBuf::from(path);
        }
        if let Some(path) = lookup("SHORTFORM_FFPROBE") {
            config.render.ffprobe_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("SHORTFORM_WORK_DIR") {
            config.render.work_root = PathBuf::from(dir);
        }
        if let Some(v) = parse_opt::<f64>(&lookup, "SHORTFORM_DISSOLVE_SECS")? {
            config.render.dissolve_secs = v;
        }
        if let Some(v) = parse_opt::<usize>(&lookup, "SHORTFORM_IMAGE_CONCURRENCY")? {
            config.limits.image_concurrency = v.max(1);
        }
        if let Some(v) = parse_opt::<usize>(&lookup, "SHORTFORM_MAX_SCENES")? {
            config.limits.max_scenes = v.max(1);
        }

        Ok(config)
    }
}

fn layered<O, E>(overrides: O, environment: E) -> impl Fn(&str) -> Option<String>
where
    O: Fn(&str) -> Option<String>,
    E: Fn(&str) -> Option<String>,
{
    move |key| overrides(key).or_else(|| environment(key))
}

fn parse_opt<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| VideoError::EnvError(format!("{} has invalid value: {}", key, raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_keys_are_reported() {
        let err = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk")])).unwrap_err();
        assert!(err.to_string().contains("ELEVENLABS_API_KEY"));
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk"),
            ("ELEVENLABS_API_KEY", "el"),
        ]))
        .unwrap();

        assert_eq!(config.openai.primary_image_model, "gpt-image-1");
        assert_eq!(config.openai.fallback_image_model, "dall-e-3");
        assert_eq!(config.render.width, 1080);
        assert_eq!(config.render.height, 1920);
        assert_eq!(config.limits.max_scenes, 10);
        assert_eq!(config.default_voice_id, DEFAULT_VOICE_ID);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk"),
            ("ELEVENLABS_API_KEY", "el"),
            ("SHORTFORM_IMAGE_CONCURRENCY", "5"),
            ("SHORTFORM_DISSOLVE_SECS", "0.25"),
            ("OPENAI_BASE_URL", "http://localhost:9000"),
        ]))
        .unwrap();

        assert_eq!(config.limits.image_concurrency, 5);
        assert!((config.render.dissolve_secs - 0.25).abs() < f64::EPSILON);
        assert_eq!(config.openai.base_url, "http://localhost:9000");
    }

    #[test]
    fn overrides_win_over_the_environment() {
        let environment = lookup_from(&[
            ("OPENAI_API_KEY", "sk-env"),
            ("ELEVENLABS_API_KEY", "el-env"),
            ("SHORTFORM_MAX_SCENES", "4"),
        ]);
        let overrides = |key: &str| (key == "OPENAI_API_KEY").then(|| "sk-flag".to_string());

        let config = Config::from_lookup(layered(overrides, environment)).unwrap();

        assert_eq!(config.openai.api_key, "sk-flag");
        assert_eq!(config.elevenlabs.api_key, "el-env");
        assert_eq!(config.limits.max_scenes, 4);
    }

    #[test]
    fn explicit_keys_load_without_environment_keys() {
        let config = Config::from_env_with(|key| match key {
            "OPENAI_API_KEY" => Some("sk-flag".to_string()),
            "ELEVENLABS_API_KEY" => Some("el-flag".to_string()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.openai.api_key, "sk-flag");
        assert_eq!(config.elevenlabs.api_key, "el-flag");
    }

    #[test]
    fn invalid_number_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk"),
            ("ELEVENLABS_API_KEY", "el"),
            ("SHORTFORM_MAX_SCENES", "ten"),
        ]));
        assert!(matches!(result, Err(VideoError::EnvError(_))));
    }
}

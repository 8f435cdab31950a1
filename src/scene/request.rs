use serde::{Deserialize, Serialize};

use crate::error::{Result, VideoError};

pub const MIN_DURATION_SECS: u32 = 15;
pub const MAX_DURATION_SECS: u32 = 60;

/// Caller input for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Target length in seconds; the narration decides the real length
    pub duration: u32,
    pub voice_id: String,
}

impl GenerationRequest {
    /// Builds a request, rejecting it before any external call is made.
    pub fn new(prompt: impl Into<String>, duration: u32, voice_id: impl Into<String>) -> Result<Self> {
        let request = Self {
            prompt: prompt.into().trim().to_string(),
            duration,
            voice_id: voice_id.into().trim().to_string(),
        };
        request.validate()?;
        Ok(request)
    }

    pub fn validate(&self) -> Result<()> {
        validate_prompt(&self.prompt, self.duration)?;
        validate_voice_id(&self.voice_id)
    }
}

pub(crate) fn validate_prompt(prompt: &str, duration: u32) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(VideoError::InvalidRequest("prompt must not be empty".to_string()));
    }
    if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration) {
        return Err(VideoError::InvalidRequest(format!(
            "duration must be between {} and {} seconds, got {}",
            MIN_DURATION_SECS, MAX_DURATION_SECS, duration
        )));
    }
    Ok(())
}

/// Voice ids end up in a URL path segment.
pub(crate) fn validate_voice_id(voice_id: &str) -> Result<()> {
    if voice_id.is_empty() {
        return Err(VideoError::InvalidRequest("voice id must not be empty".to_string()));
    }
    if !voice_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(VideoError::InvalidRequest(format!(
            "voice id contains invalid characters: {}",
            voice_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_request_and_trims() {
        let request = GenerationRequest::new("  morning routine tips ", 30, "v1").unwrap();
        assert_eq!(request.prompt, "morning routine tips");
        assert_eq!(request.voice_id, "v1");
    }

    #[test]
    fn rejects_empty_prompt() {
        let err = GenerationRequest::new("   ", 30, "v1").unwrap_err();
        assert!(matches!(err, VideoError::InvalidRequest(_)));
    }

    #[test]
    fn rejects_out_of_range_duration() {
        assert!(GenerationRequest::new("tips", 14, "v1").is_err());
        assert!(GenerationRequest::new("tips", 61, "v1").is_err());
        assert!(GenerationRequest::new("tips", 15, "v1").is_ok());
        assert!(GenerationRequest::new("tips", 60, "v1").is_ok());
    }

    #[test]
    fn rejects_bad_voice_id() {
        assert!(GenerationRequest::new("tips", 30, "").is_err());
        assert!(GenerationRequest::new("tips", 30, "../voices").is_err());
        assert!(GenerationRequest::new("tips", 30, "21m00Tcm4TlvDq8ikWAM").is_ok());
    }
}

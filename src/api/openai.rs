use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::script::{parse_reply, system_instruction, user_message};
use super::{ImageBackend, ImageCallError, ScriptWriter};
use crate::config::OpenAiConfig;
use crate::error::{Result, VideoError};
use crate::scene::{ImageModel, SceneScript};

/// Client for the text and image generation endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    config: OpenAiConfig,
    max_scenes: usize,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    code: Option<String>,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig, max_scenes: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VideoError::EnvError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            max_scenes: max_scenes.max(1),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn model_for(&self, model: ImageModel) -> (&str, &str) {
        match model {
            ImageModel::Primary => (
                self.config.primary_image_model.as_str(),
                self.config.primary_image_size.as_str(),
            ),
            ImageModel::Fallback => (
                self.config.fallback_image_model.as_str(),
                self.config.fallback_image_size.as_str(),
            ),
        }
    }

    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, ImageCallError> {
        info!("Downloading image from: {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ImageCallError::Failed(format!("image download failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(ImageCallError::Failed(format!(
                "image download returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImageCallError::Failed(format!("image download failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Splits provider refusals for the account's tier from everything else.
fn classify_image_error(status: StatusCode, body: &str) -> ImageCallError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .unwrap_or_else(|| body.to_string());
    let code = parsed.and_then(|b| b.error.code);

    let rejected = status == StatusCode::FORBIDDEN
        || (status == StatusCode::NOT_FOUND && code.as_deref() == Some("model_not_found"))
        || (status.is_client_error() && mentions_verification(&message));

    let message = format!("HTTP {}: {}", status.as_u16(), message);
    if rejected {
        ImageCallError::Rejected(message)
    } else {
        ImageCallError::Failed(message)
    }
}

/// Tier gates are worded as "verification is required" or "must be verified".
fn mentions_verification(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("verification") || message.contains("verified")
}

#[async_trait]
impl ScriptWriter for OpenAiClient {
    async fn write_script(&self, prompt: &str, duration: u32) -> Result<SceneScript> {
        info!("Generating script with {}...", self.config.text_model);

        let request_body = json!({
            "model": self.config.text_model,
            "messages": [
                { "role": "system", "content": system_instruction(&self.config.language) },
                { "role": "user", "content": user_message(prompt, duration) }
            ]
        });

        let response = self
            .client
            .post(self.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| VideoError::Generation(format!("text API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(VideoError::Generation(format!(
                "text API error (HTTP {}): {}",
                status.as_u16(),
                error_text
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| VideoError::Generation(format!("unreadable text API response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| VideoError::Generation("text API returned no content".to_string()))?;

        debug!("Generated script text: {}", content);

        let parsed = parse_reply(&content, self.max_scenes)?;
        info!("Successfully generated script with {} scenes", parsed.scenes.len());

        Ok(SceneScript::new(
            prompt.to_string(),
            duration,
            parsed.script_text,
            parsed.scenes,
        ))
    }
}

#[async_trait]
impl ImageBackend for OpenAiClient {
    async fn render(&self, model: ImageModel, prompt: &str) -> std::result::Result<Vec<u8>, ImageCallError> {
        let (model_name, size) = self.model_for(model);
        info!("Generating image with {}", model_name);

        let mut request_body = json!({
            "model": model_name,
            "prompt": prompt,
            "n": 1,
            "size": size
        });
        // gpt-image-1 always answers in base64 and rejects the parameter
        if model_name.starts_with("dall-e") {
            request_body["response_format"] = json!("b64_json");
        }

        let response = self
            .client
            .post(self.url("images/generations"))
            .bearer_auth(&self.config.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| ImageCallError::Failed(format!("image API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_image_error(status, &error_text));
        }

        let body: ImageGenerationResponse = response
            .json()
            .await
            .map_err(|e| ImageCallError::Failed(format!("unreadable image API response: {}", e)))?;

        let first = body
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ImageCallError::Failed("image API returned no images".to_string()))?;

        match (first.b64_json, first.url) {
            (Some(encoded), _) => BASE64_STANDARD
                .decode(encoded.as_bytes())
                .map_err(|e| ImageCallError::Failed(format!("invalid base64 image: {}", e))),
            (None, Some(url)) => self.download(&url).await,
            (None, None) => Err(ImageCallError::Failed("image API returned an empty payload".to_string())),
        }
    }

    fn model_name(&self, model: ImageModel) -> String {
        self.model_for(model).0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_is_a_rejection() {
        let body = r#"{"error": {"message": "Your organization must be verified to use the model", "code": null}}"#;
        let err = classify_image_error(StatusCode::FORBIDDEN, body);
        assert!(matches!(err, ImageCallError::Rejected(ref m) if m.contains("verified")));
    }

    #[test]
    fn unknown_model_is_a_rejection() {
        let body = r#"{"error": {"message": "model does not exist", "code": "model_not_found"}}"#;
        assert!(matches!(
            classify_image_error(StatusCode::NOT_FOUND, body),
            ImageCallError::Rejected(_)
        ));
    }

    #[test]
    fn verification_required_on_bad_request_is_a_rejection() {
        let body = r#"{"error": {"message": "Your organization must be verified to use gpt-image-1."}}"#;
        assert!(matches!(
            classify_image_error(StatusCode::BAD_REQUEST, body),
            ImageCallError::Rejected(_)
        ));
    }

    #[test]
    fn verification_wording_is_matched_case_insensitively() {
        let body = r#"{"error": {"message": "Organization Verification is required to access gpt-image-1."}}"#;
        assert!(matches!(
            classify_image_error(StatusCode::BAD_REQUEST, body),
            ImageCallError::Rejected(_)
        ));
        assert!(matches!(
            classify_image_error(StatusCode::UNAUTHORIZED, "Organization not VERIFIED"),
            ImageCallError::Rejected(_)
        ));
        // Only client errors are tier gates
        assert!(matches!(
            classify_image_error(StatusCode::BAD_GATEWAY, "verification service unavailable"),
            ImageCallError::Failed(_)
        ));
    }

    #[test]
    fn server_errors_are_plain_failures() {
        assert!(matches!(
            classify_image_error(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            ImageCallError::Failed(ref m) if m.contains("500")
        ));
        assert!(matches!(
            classify_image_error(StatusCode::BAD_REQUEST, r#"{"error": {"message": "content policy"}}"#),
            ImageCallError::Failed(_)
        ));
    }
}

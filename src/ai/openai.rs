use super::extract::decode_base64_image;
use super::http::ProviderHttp;
use super::{ImageProvider, ProviderResult};
use crate::config::OpenAiConfig;
use crate::error::ProviderFailure;
use crate::models::SourceProvider;
use crate::validator::OutputValidator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request body for image generation.
#[derive(Debug, Serialize)]
struct ImageGenerationRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    data: Vec<ImageData>,
}

/// One generated image item (URL or base64).
#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Synchronous provider: one call to an OpenAI-compatible images endpoint.
pub struct OpenAiImageProvider {
    http: ProviderHttp,
    model: String,
    quality: Option<String>,
    validator: OutputValidator,
}

impl OpenAiImageProvider {
    pub fn new(config: &OpenAiConfig, client: reqwest::Client, validator: OutputValidator) -> Self {
        Self {
            http: ProviderHttp::new(
                client,
                "openai",
                config.api_key.clone(),
                config.base_url.clone(),
                config.timeout,
            ),
            model: config.model.clone(),
            quality: config.quality.clone(),
            validator,
        }
    }
}

#[async_trait]
impl ImageProvider for OpenAiImageProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn source(&self) -> SourceProvider {
        SourceProvider::OpenAiStyle
    }

    async fn attempt_generation(&self, prompt: &str) -> ProviderResult {
        let request = ImageGenerationRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            n: 1,
            size: "1024x1024".to_string(),
            quality: self.quality.clone(),
        };

        let response: ImageGenerationResponse = self
            .http
            .post_json("/v1/images/generations", &request)
            .await?;

        let image_data = response.data.first().ok_or_else(|| {
            ProviderFailure::MalformedResponse("no image data in OpenAI response".to_string())
        })?;

        let image_bytes = if let Some(b64_json) = &image_data.b64_json {
            decode_base64_image(b64_json)?
        } else if let Some(url) = &image_data.url {
            tracing::debug!("OpenAI returned an image URL, downloading");
            self.http.download(url).await?
        } else {
            return Err(ProviderFailure::MalformedResponse(
                "no image data (neither base64 nor URL) in response".to_string(),
            ));
        };

        if !self.validator.validate(&image_bytes) {
            return Err(ProviderFailure::Undersized {
                len: image_bytes.len(),
                min: self.validator.min_bytes(),
            });
        }

        Ok(image_bytes)
    }
}

use super::extract::{extract_image, DEFAULT_STRATEGIES};
use super::http::ProviderHttp;
use super::{ImageProvider, ProviderResult};
use crate::config::HuggingFaceConfig;
use crate::error::ProviderFailure;
use crate::mime::detect_image_mime;
use crate::models::SourceProvider;
use crate::validator::OutputValidator;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Serialize;
use std::time::Duration;
use tokio_retry::RetryIf;

#[derive(Debug, Serialize)]
struct InferenceRequest<'a> {
    inputs: &'a str,
}

/// Delays of `step`, `2 * step`, `3 * step`, ... between attempts.
fn linear_backoff(step: Duration) -> impl Iterator<Item = Duration> {
    (1u32..).map(move |n| step * n)
}

/// Retryable inference provider: tries each candidate model in turn, retrying
/// a model while it reports that it is still loading.
pub struct HuggingFaceProvider {
    http: ProviderHttp,
    models: Vec<String>,
    max_attempts: u32,
    backoff_step: Duration,
    validator: OutputValidator,
}

impl HuggingFaceProvider {
    pub fn new(
        config: &HuggingFaceConfig,
        client: reqwest::Client,
        validator: OutputValidator,
    ) -> Self {
        Self {
            http: ProviderHttp::new(
                client,
                "huggingface",
                config.api_token.clone(),
                config.base_url.clone(),
                config.timeout,
            ),
            models: config.models.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff_step: config.backoff_step,
            validator,
        }
    }

    async fn call_model(&self, model: &str, prompt: &str, attempt: u32) -> ProviderResult {
        tracing::debug!(
            "Calling inference model {} (attempt {}/{})",
            model,
            attempt,
            self.max_attempts
        );

        let response = self
            .http
            .post(&format!("/models/{}", model))
            .header(ACCEPT, "image/png")
            .json(&InferenceRequest { inputs: prompt })
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to model {}: {}", model, e);
                e
            })?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!("Model {} is loading or busy (status {})", model, status);
            return Err(ProviderFailure::ModelBusy {
                model: model.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let failure = ProviderFailure::from_response(response).await;
            tracing::warn!("Model {} rejected the request: {}", model, failure);
            return Err(failure);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response.bytes().await?.to_vec();

        let image = if content_type.starts_with("image/") || detect_image_mime(&body).is_some() {
            body
        } else {
            let document: serde_json::Value = serde_json::from_slice(&body).map_err(|e| {
                ProviderFailure::MalformedResponse(format!(
                    "model {} returned neither an image nor JSON ({}): {}",
                    model, content_type, e
                ))
            })?;
            extract_image(&document, DEFAULT_STRATEGIES)?
        };

        if !self.validator.validate(&image) {
            tracing::warn!(
                "Model {} returned an undersized image ({} bytes)",
                model,
                image.len()
            );
            return Err(ProviderFailure::Undersized {
                len: image.len(),
                min: self.validator.min_bytes(),
            });
        }

        Ok(image)
    }

    /// Runs the retry policy for a single model.
    ///
    /// Busy responses are retried until `max_attempts` calls have been made;
    /// an undersized image earns one extra retry on top of that budget;
    /// anything else ends this model's turn at once.
    async fn attempt_model(&self, model: &str, prompt: &str) -> ProviderResult {
        let busy_retries = self.max_attempts - 1;
        // One delay per busy retry plus one for the soft retry.
        let strategy = linear_backoff(self.backoff_step).take(busy_retries as usize + 1);
        let mut attempt = 0;
        let mut busy_retries_used = 0;
        let mut soft_retry_used = false;

        RetryIf::spawn(
            strategy,
            || {
                attempt += 1;
                self.call_model(model, prompt, attempt)
            },
            |failure: &ProviderFailure| match failure {
                ProviderFailure::ModelBusy { .. } if busy_retries_used < busy_retries => {
                    busy_retries_used += 1;
                    true
                }
                ProviderFailure::Undersized { .. } if !soft_retry_used => {
                    soft_retry_used = true;
                    true
                }
                _ => false,
            },
        )
        .await
    }
}

#[async_trait]
impl ImageProvider for HuggingFaceProvider {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn source(&self) -> SourceProvider {
        SourceProvider::RetryableInference
    }

    async fn attempt_generation(&self, prompt: &str) -> ProviderResult {
        let mut failures = Vec::with_capacity(self.models.len());

        for model in &self.models {
            match self.attempt_model(model, prompt).await {
                Ok(image) => {
                    tracing::info!("Model {} produced {} bytes", model, image.len());
                    return Ok(image);
                }
                Err(e) => {
                    tracing::warn!("Model {} failed, trying next candidate: {}", model, e);
                    failures.push(format!("{}: {}", model, e));
                }
            }
        }

        if failures.is_empty() {
            return Err(ProviderFailure::ModelsExhausted(
                "no candidate models configured".to_string(),
            ));
        }
        Err(ProviderFailure::ModelsExhausted(failures.join("; ")))
    }
}

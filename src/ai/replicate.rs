use super::extract::decode_base64_image;
use super::http::ProviderHttp;
use super::poll::{poll_until_terminal, JobPhase, JobStatus, PollPolicy, Sleeper, TokioSleeper};
use super::{ImageProvider, ProviderResult};
use crate::config::ReplicateConfig;
use crate::error::ProviderFailure;
use crate::models::SourceProvider;
use crate::validator::OutputValidator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct ModelInfo {
    latest_version: Option<VersionInfo>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    id: String,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: PredictionStatus,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn into_status(self) -> JobStatus<Value> {
        match self.status {
            PredictionStatus::Succeeded => JobStatus::Succeeded(self.output.unwrap_or(Value::Null)),
            PredictionStatus::Failed => JobStatus::Failed(match self.error {
                Some(Value::String(message)) => message,
                Some(other) => other.to_string(),
                None => "no error message".to_string(),
            }),
            PredictionStatus::Canceled => JobStatus::Canceled,
            PredictionStatus::Starting | PredictionStatus::Processing | PredictionStatus::Unknown => {
                JobStatus::Pending
            }
        }
    }
}

/// Asynchronous job provider: submit a prediction, then poll it to completion.
pub struct ReplicateProvider {
    http: ProviderHttp,
    model: String,
    version: Option<String>,
    policy: PollPolicy,
    sleeper: Arc<dyn Sleeper>,
    validator: OutputValidator,
}

impl ReplicateProvider {
    pub fn new(
        config: &ReplicateConfig,
        client: reqwest::Client,
        validator: OutputValidator,
    ) -> Self {
        Self {
            http: ProviderHttp::new(
                client,
                "replicate",
                config.api_token.clone(),
                config.base_url.clone(),
                config.timeout,
            ),
            model: config.model.clone(),
            version: config.version.clone(),
            policy: PollPolicy {
                interval: config.poll_interval,
                max_attempts: config.max_polls,
            },
            sleeper: Arc::new(TokioSleeper),
            validator,
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn resolve_version(&self) -> Result<String, ProviderFailure> {
        if let Some(version) = &self.version {
            return Ok(version.clone());
        }

        tracing::debug!("No Replicate version pinned, looking up {}", self.model);
        let info: ModelInfo = self
            .http
            .get_json(&format!("/v1/models/{}", self.model))
            .await
            .map_err(|e| {
                tracing::warn!("Replicate model lookup for {} failed: {}", self.model, e);
                ProviderFailure::VersionUnresolved(format!("{} ({})", self.model, e))
            })?;

        info.latest_version
            .map(|v| v.id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderFailure::VersionUnresolved(self.model.clone()))
    }

    async fn fetch_output(&self, output: &Value) -> Result<Vec<u8>, ProviderFailure> {
        let reference = match output {
            Value::String(reference) => Some(reference.as_str()),
            Value::Array(items) => items.iter().find_map(Value::as_str),
            _ => None,
        }
        .ok_or_else(|| {
            ProviderFailure::MalformedResponse(format!(
                "succeeded job has no output reference: {}",
                output
            ))
        })?;

        if reference.starts_with("data:") {
            decode_base64_image(reference)
        } else {
            self.http.download(reference).await
        }
    }
}

#[async_trait]
impl ImageProvider for ReplicateProvider {
    fn name(&self) -> &str {
        "replicate"
    }

    fn source(&self) -> SourceProvider {
        SourceProvider::AsyncJob
    }

    async fn attempt_generation(&self, prompt: &str) -> ProviderResult {
        tracing::debug!(phase = ?JobPhase::Submitting, "Submitting Replicate job");
        let version = self.resolve_version().await?;

        let submitted: Prediction = self
            .http
            .post_json(
                "/v1/predictions",
                &PredictionRequest {
                    version: &version,
                    input: PredictionInput { prompt },
                },
            )
            .await?;
        let job_id = submitted.id.clone();
        tracing::info!(
            "Replicate job {} submitted (status {:?})",
            job_id,
            submitted.status
        );

        let output = match submitted.into_status() {
            JobStatus::Pending => {
                let path = format!("/v1/predictions/{}", job_id);
                poll_until_terminal(&job_id, self.policy, self.sleeper.as_ref(), |_| {
                    let path = path.clone();
                    async move {
                        let prediction: Prediction = self.http.get_json(&path).await?;
                        Ok(prediction.into_status())
                    }
                })
                .await?
            }
            JobStatus::Succeeded(output) => output,
            JobStatus::Failed(reason) => {
                return Err(ProviderFailure::JobFailed { id: job_id, reason })
            }
            JobStatus::Canceled => return Err(ProviderFailure::JobCanceled { id: job_id }),
        };

        let image_bytes = self.fetch_output(&output).await?;
        if !self.validator.validate(&image_bytes) {
            return Err(ProviderFailure::Undersized {
                len: image_bytes.len(),
                min: self.validator.min_bytes(),
            });
        }

        Ok(image_bytes)
    }
}

//! Ordered provider fallback
//!
//! Providers are tried one at a time in configured order. The first attempt
//! that yields a decodable image passing the size gate wins, re-encoded as PNG
//! if needed; failures are logged and absorbed. When every provider has been
//! tried the offline placeholder is used, so resolution only fails when the
//! request is cancelled.

use crate::ai::{
    HuggingFaceProvider, ImageProvider, OpenAiImageProvider, ReplicateProvider,
};
use crate::config::{Config, ProviderKind};
use crate::error::ProviderFailure;
use crate::models::{GeneratedArtifact, GenerationRequest, SourceProvider};
use crate::placeholder::{PlaceholderGenerator, EMBEDDED_PLACEHOLDER};
use crate::transcode;
use crate::validator::OutputValidator;
use crate::{Error, Result};
use serde::Serialize;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PROVIDER_DEADLINE: Duration = Duration::from_secs(300);

/// A position in the chain. Unconfigured providers keep their place so the
/// attempt log shows them as skipped.
pub enum ProviderSlot {
    Configured(Box<dyn ImageProvider>),
    Unconfigured { name: String },
}

impl ProviderSlot {
    pub fn name(&self) -> &str {
        match self {
            ProviderSlot::Configured(provider) => provider.name(),
            ProviderSlot::Unconfigured { name } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    Failed { reason: String },
    Rejected { len: usize },
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptRecord {
    pub provider: String,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    pub artifact: GeneratedArtifact,
    pub attempts: Vec<AttemptRecord>,
}

pub struct FallbackChain {
    slots: Vec<ProviderSlot>,
    validator: OutputValidator,
    placeholder: PlaceholderGenerator,
    deadline: Duration,
}

impl FallbackChain {
    pub fn new(
        slots: Vec<ProviderSlot>,
        validator: OutputValidator,
        placeholder: PlaceholderGenerator,
    ) -> Self {
        Self {
            slots,
            validator,
            placeholder,
            deadline: DEFAULT_PROVIDER_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Builds one slot per entry of the configured provider order, sharing a
    /// single HTTP connection pool between the adapters.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Self {
        let validator = OutputValidator::new(config.min_image_bytes);

        let slots = config
            .provider_order
            .iter()
            .map(|kind| {
                let provider: Option<Box<dyn ImageProvider>> = match kind {
                    ProviderKind::OpenAi => config.openai.as_ref().map(|c| {
                        Box::new(OpenAiImageProvider::new(c, client.clone(), validator))
                            as Box<dyn ImageProvider>
                    }),
                    ProviderKind::Replicate => config.replicate.as_ref().map(|c| {
                        Box::new(ReplicateProvider::new(c, client.clone(), validator))
                            as Box<dyn ImageProvider>
                    }),
                    ProviderKind::HuggingFace => config.huggingface.as_ref().map(|c| {
                        Box::new(HuggingFaceProvider::new(c, client.clone(), validator))
                            as Box<dyn ImageProvider>
                    }),
                };
                match provider {
                    Some(provider) => ProviderSlot::Configured(provider),
                    None => {
                        info!("Provider {} has no credentials, it will be skipped", kind.name());
                        ProviderSlot::Unconfigured {
                            name: kind.name().to_string(),
                        }
                    }
                }
            })
            .collect();

        Self::new(slots, validator, PlaceholderGenerator::new())
            .with_deadline(config.provider_deadline)
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.slots.iter().map(ProviderSlot::name).collect()
    }

    pub async fn resolve(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Resolution> {
        let prompt = request.provider_prompt();
        let mut attempts = Vec::with_capacity(self.slots.len() + 1);

        for slot in &self.slots {
            let provider = match slot {
                ProviderSlot::Configured(provider) => provider,
                ProviderSlot::Unconfigured { name } => {
                    debug!(provider = %name, "Skipping unconfigured provider");
                    attempts.push(AttemptRecord {
                        provider: name.clone(),
                        outcome: AttemptOutcome::Skipped,
                        latency_ms: 0,
                    });
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let started = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(provider = provider.name(), "Request cancelled during provider attempt");
                    return Err(Error::Cancelled);
                }
                result = tokio::time::timeout(self.deadline, provider.attempt_generation(&prompt)) => {
                    result.unwrap_or_else(|_| Err(ProviderFailure::DeadlineExceeded(self.deadline)))
                }
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let outcome = match result {
                Ok(bytes) if self.validator.validate(&bytes) => {
                    match transcode::to_png(bytes).await {
                        Ok(png) => {
                            info!(
                                provider = provider.name(),
                                outcome = "succeeded",
                                latency_ms,
                                bytes = png.len(),
                                "Provider attempt finished"
                            );
                            attempts.push(AttemptRecord {
                                provider: provider.name().to_string(),
                                outcome: AttemptOutcome::Succeeded,
                                latency_ms,
                            });
                            return Ok(Resolution {
                                artifact: GeneratedArtifact::new(png, provider.source()),
                                attempts,
                            });
                        }
                        Err(failure) => AttemptOutcome::Failed {
                            reason: failure.to_string(),
                        },
                    }
                }
                Ok(bytes) => AttemptOutcome::Rejected { len: bytes.len() },
                Err(failure) => AttemptOutcome::Failed {
                    reason: failure.to_string(),
                },
            };

            warn!(
                provider = provider.name(),
                ?outcome,
                latency_ms,
                "Provider attempt finished without a usable image"
            );
            attempts.push(AttemptRecord {
                provider: provider.name().to_string(),
                outcome,
                latency_ms,
            });
        }

        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        info!("All providers exhausted, using placeholder image");
        let started = Instant::now();
        let bytes = self.render_placeholder().await;
        attempts.push(AttemptRecord {
            provider: "placeholder".to_string(),
            outcome: AttemptOutcome::Succeeded,
            latency_ms: started.elapsed().as_millis() as u64,
        });

        Ok(Resolution {
            artifact: GeneratedArtifact::new(bytes, SourceProvider::Placeholder),
            attempts,
        })
    }

    async fn render_placeholder(&self) -> Vec<u8> {
        let placeholder = self.placeholder;
        match tokio::task::spawn_blocking(move || placeholder.generate()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Placeholder task failed, using embedded image: {}", e);
                EMBEDDED_PLACEHOLDER.to_vec()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockImageProvider;
    use crate::models::{Fragment, DEFAULT_MAX_FRAGMENT_BYTES};
    use image::ImageFormat;
    use pretty_assertions::assert_eq;

    const MIN: usize = 16;

    fn image(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(len, 0x11);
        bytes
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            Some("a cracked amphora".to_string()),
            vec![Fragment::new("image/png", vec![1, 2, 3])],
            DEFAULT_MAX_FRAGMENT_BYTES,
        )
        .unwrap()
    }

    fn chain(slots: Vec<ProviderSlot>) -> FallbackChain {
        FallbackChain::new(slots, OutputValidator::new(MIN), PlaceholderGenerator::new())
    }

    fn slot(provider: &MockImageProvider) -> ProviderSlot {
        ProviderSlot::Configured(Box::new(provider.clone()))
    }

    #[tokio::test]
    async fn test_first_success_wins_and_later_providers_are_not_called() {
        let p1 = MockImageProvider::new("p1").with_failure("boom");
        let p2 = MockImageProvider::new("p2")
            .with_source(SourceProvider::AsyncJob)
            .with_image_response(image(64));
        let p3 = MockImageProvider::new("p3").with_image_response(image(64));

        let resolution = chain(vec![slot(&p1), slot(&p2), slot(&p3)])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolution.artifact.source, SourceProvider::AsyncJob);
        assert_eq!(resolution.artifact.bytes, image(64));
        assert_eq!(p1.get_call_count(), 1);
        assert_eq!(p2.get_call_count(), 1);
        assert_eq!(p3.get_call_count(), 0);

        let outcomes: Vec<_> = resolution
            .attempts
            .iter()
            .map(|a| (a.provider.as_str(), a.outcome.clone()))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                (
                    "p1",
                    AttemptOutcome::Failed {
                        reason: "malformed response: boom".to_string()
                    }
                ),
                ("p2", AttemptOutcome::Succeeded),
            ]
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_placeholder() {
        let p1 = MockImageProvider::new("p1").with_failure("down");
        let p2 = MockImageProvider::new("p2").with_failure("down");

        let resolution = chain(vec![slot(&p1), slot(&p2)])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolution.artifact.source, SourceProvider::Placeholder);
        assert_eq!(resolution.artifact.mime_type, "image/png");
        assert_eq!(resolution.artifact.bytes, PlaceholderGenerator::new().generate());
        assert_eq!(resolution.attempts.len(), 3);
        assert_eq!(resolution.attempts[2].provider, "placeholder");
    }

    #[tokio::test]
    async fn test_empty_chain_goes_straight_to_placeholder() {
        let resolution = chain(vec![])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resolution.artifact.source, SourceProvider::Placeholder);
        assert!(!resolution.artifact.bytes.is_empty());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_is_skipped_not_failed() {
        let p2 = MockImageProvider::new("p2").with_image_response(image(32));

        let resolution = chain(vec![
            ProviderSlot::Unconfigured {
                name: "openai".to_string(),
            },
            slot(&p2),
        ])
        .resolve(&request(), &CancellationToken::new())
        .await
        .unwrap();

        assert_eq!(resolution.attempts[0].outcome, AttemptOutcome::Skipped);
        assert_eq!(resolution.attempts[1].outcome, AttemptOutcome::Succeeded);
        assert_eq!(p2.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_undersized_output_is_rejected_and_chain_continues() {
        let p1 = MockImageProvider::new("p1").with_image_response(image(MIN - 1));
        let p2 = MockImageProvider::new("p2").with_image_response(image(MIN));

        let resolution = chain(vec![slot(&p1), slot(&p2)])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            resolution.attempts[0].outcome,
            AttemptOutcome::Rejected { len: MIN - 1 }
        );
        assert_eq!(resolution.artifact.bytes, image(MIN));
    }

    #[tokio::test]
    async fn test_jpeg_output_becomes_png_artifact() {
        let mut jpeg = Vec::new();
        image::RgbImage::from_pixel(32, 32, image::Rgb([200, 160, 120]))
            .write_to(&mut std::io::Cursor::new(&mut jpeg), ImageFormat::Jpeg)
            .unwrap();
        let p1 = MockImageProvider::new("p1").with_image_response(jpeg);

        let resolution = chain(vec![slot(&p1)])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(resolution.artifact.mime_type, "image/png");
        assert_eq!(
            crate::mime::detect_image_mime(&resolution.artifact.bytes),
            Some("image/png")
        );
        let decoded = image::load_from_memory(&resolution.artifact.bytes).unwrap();
        assert_eq!(decoded.width(), 32);
    }

    #[tokio::test]
    async fn test_undecodable_output_counts_as_failure() {
        let mut garbage = vec![0xFF, 0xD8, 0xFF, 0xE0];
        garbage.resize(64, 0x00);
        let p1 = MockImageProvider::new("p1").with_image_response(garbage);
        let p2 = MockImageProvider::new("p2").with_image_response(image(32));

        let resolution = chain(vec![slot(&p1), slot(&p2)])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        match &resolution.attempts[0].outcome {
            AttemptOutcome::Failed { reason } => assert!(reason.contains("decoded")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(resolution.artifact.bytes, image(32));
        assert_eq!(p2.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_deadline_moves_on_from_hanging_provider() {
        let p1 = MockImageProvider::new("p1").hanging();
        let p2 = MockImageProvider::new("p2").with_image_response(image(32));

        let resolution = chain(vec![slot(&p1), slot(&p2)])
            .with_deadline(Duration::from_millis(50))
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        match &resolution.attempts[0].outcome {
            AttemptOutcome::Failed { reason } => assert!(reason.contains("deadline")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(p2.get_call_count(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_attempt() {
        let p1 = MockImageProvider::new("p1").hanging();
        let p2 = MockImageProvider::new("p2").with_image_response(image(32));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = chain(vec![slot(&p1), slot(&p2)])
            .resolve(&request(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(p1.get_call_count(), 1);
        assert_eq!(p2.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_contacts_nobody() {
        let p1 = MockImageProvider::new("p1").with_image_response(image(32));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = chain(vec![slot(&p1)])
            .resolve(&request(), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(p1.get_call_count(), 0);
    }

    #[tokio::test]
    async fn test_providers_receive_rendered_prompt() {
        let p1 = MockImageProvider::new("p1").with_image_response(image(32));

        chain(vec![slot(&p1)])
            .resolve(&request(), &CancellationToken::new())
            .await
            .unwrap();

        let prompts = p1.get_prompts();
        assert!(prompts[0].contains("a cracked amphora"));
        assert!(prompts[0].contains("1 broken fragment"));
    }

    #[test]
    fn test_from_config_keeps_order_and_marks_missing_credentials() {
        let config = Config::from_lookup(|key| match key {
            "HF_API_TOKEN" => Some("hf".to_string()),
            "PROVIDER_ORDER" => Some("huggingface,openai".to_string()),
            _ => None,
        })
        .unwrap();

        let chain = FallbackChain::from_config(&config, reqwest::Client::new());
        assert_eq!(chain.provider_names(), vec!["huggingface", "openai"]);
        assert!(matches!(chain.slots[1], ProviderSlot::Unconfigured { .. }));
    }
}

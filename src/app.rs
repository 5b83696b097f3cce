//! Application orchestration for a single reconstruction request.

use crate::chain::{AttemptRecord, FallbackChain};
use crate::config::Config;
use crate::models::{Fragment, GenerationRequest, StoredArtifact, DEFAULT_MAX_FRAGMENT_BYTES};
use crate::sink::{ArtifactSink, FileSink};
use crate::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};

/// What a caller gets back: where the image went and how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct Reconstruction {
    pub stored: StoredArtifact,
    pub attempts: Vec<AttemptRecord>,
}

/// Validates input, runs the provider chain, and persists the winner.
pub struct App {
    chain: FallbackChain,
    sink: Box<dyn ArtifactSink>,
    max_fragment_bytes: usize,
}

/// Injectable service bundle used to construct [`App`] in tests/harnesses.
pub struct AppServices {
    pub chain: FallbackChain,
    pub sink: Box<dyn ArtifactSink>,
}

impl App {
    pub fn with_services(services: AppServices) -> Self {
        Self {
            chain: services.chain,
            sink: services.sink,
            max_fragment_bytes: DEFAULT_MAX_FRAGMENT_BYTES,
        }
    }

    pub fn with_max_fragment_bytes(mut self, max_fragment_bytes: usize) -> Self {
        self.max_fragment_bytes = max_fragment_bytes;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        // Reuse one HTTP connection pool across provider adapters.
        let http_client = reqwest::Client::new();

        let chain = FallbackChain::from_config(config, http_client);
        info!("Provider order: {}", chain.provider_names().join(" -> "));

        let sink = FileSink::new(&config.output_dir)?;
        info!("Writing artifacts to {}", config.output_dir.display());

        Ok(Self {
            chain,
            sink: Box::new(sink),
            max_fragment_bytes: config.max_fragment_bytes,
        })
    }

    pub async fn reconstruct(
        &self,
        prompt: Option<String>,
        fragments: Vec<Fragment>,
        cancel: &CancellationToken,
    ) -> Result<Reconstruction> {
        let request = GenerationRequest::new(prompt, fragments, self.max_fragment_bytes)?;
        let span = tracing::info_span!("reconstruct", request_id = %request.id());
        self.run(&request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
    ) -> Result<Reconstruction> {
        info!(
            "Reconstructing from {} fragment(s)",
            request.fragments().len()
        );

        let resolution = self.chain.resolve(request, cancel).await?;
        let stored = self.sink.persist(request.id(), &resolution.artifact).await?;

        info!(
            "Reconstruction complete via {:?} ({} attempts)",
            stored.source,
            resolution.attempts.len()
        );
        Ok(Reconstruction {
            stored,
            attempts: resolution.attempts,
        })
    }
}

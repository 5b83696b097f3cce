//! Data models and structures
//!
//! Defines the validated inbound request, the artifact produced by the
//! fallback chain, and the receipts handed back to callers.

use crate::{prompts, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Largest accepted fragment upload (10 MiB).
pub const DEFAULT_MAX_FRAGMENT_BYTES: usize = 10 * 1024 * 1024;

/// One uploaded piece of the broken object.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub file_name: Option<String>,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Fragment {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: None,
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    fn label(&self, index: usize) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| format!("fragment #{}", index + 1))
    }
}

/// Validated input for a single reconstruction.
///
/// Construction is the only place the inbound rules are checked, so holding a
/// `GenerationRequest` means no provider will ever see malformed input.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    id: Uuid,
    prompt: String,
    fragments: Vec<Fragment>,
}

impl GenerationRequest {
    pub fn new(
        prompt: Option<String>,
        fragments: Vec<Fragment>,
        max_fragment_bytes: usize,
    ) -> Result<Self> {
        if fragments.is_empty() {
            return Err(Error::Validation(
                "at least one fragment image is required".to_string(),
            ));
        }

        for (index, fragment) in fragments.iter().enumerate() {
            if !fragment.mime_type.starts_with("image/") {
                return Err(Error::Validation(format!(
                    "{} has content type '{}', expected an image",
                    fragment.label(index),
                    fragment.mime_type
                )));
            }
            if fragment.bytes.len() > max_fragment_bytes {
                return Err(Error::Validation(format!(
                    "{} is {} bytes, larger than the {} byte limit",
                    fragment.label(index),
                    fragment.bytes.len(),
                    max_fragment_bytes
                )));
            }
        }

        let prompt = prompt
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| prompts::RECONSTRUCT_DEFAULT.trim().to_string());

        Ok(Self {
            id: Uuid::new_v4(),
            prompt,
            fragments,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Prompt text as sent to the external providers.
    pub fn provider_prompt(&self) -> String {
        prompts::provider_prompt(&self.prompt, self.fragments.len())
    }
}

/// Which stage of the chain produced an artifact.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceProvider {
    OpenAiStyle,
    AsyncJob,
    RetryableInference,
    Placeholder,
}

/// The image that ends a chain run. Bytes are always PNG-encoded.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub source: SourceProvider,
}

impl GeneratedArtifact {
    pub fn new(png: Vec<u8>, source: SourceProvider) -> Self {
        Self {
            bytes: png,
            mime_type: crate::mime::PNG,
            source,
        }
    }
}

/// Receipt returned by a sink once an artifact has been written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub request_id: Uuid,
    pub path: PathBuf,
    pub latest_path: PathBuf,
    pub source: SourceProvider,
    pub mime_type: String,
    pub bytes_written: usize,
    pub written_at: DateTime<Utc>,
}

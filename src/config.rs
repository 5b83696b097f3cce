//! Process-wide configuration, read once from the environment at startup.

use crate::models::DEFAULT_MAX_FRAGMENT_BYTES;
use crate::validator::DEFAULT_MIN_IMAGE_BYTES;
use crate::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_REPLICATE_BASE_URL: &str = "https://api.replicate.com";
pub const DEFAULT_HF_BASE_URL: &str = "https://api-inference.huggingface.co";

pub const DEFAULT_HF_MODELS: &[&str] = &[
    "stabilityai/stable-diffusion-xl-base-1.0",
    "runwayml/stable-diffusion-v1-5",
    "CompVis/stable-diffusion-v1-4",
];

/// The external backends the chain knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Replicate,
    HuggingFace,
}

impl ProviderKind {
    pub const DEFAULT_ORDER: [ProviderKind; 3] = [
        ProviderKind::OpenAi,
        ProviderKind::Replicate,
        ProviderKind::HuggingFace,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Replicate => "replicate",
            ProviderKind::HuggingFace => "huggingface",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "replicate" => Ok(ProviderKind::Replicate),
            "huggingface" | "hf" => Ok(ProviderKind::HuggingFace),
            other => Err(Error::Config(format!("unknown provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub quality: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ReplicateConfig {
    pub api_token: String,
    /// `owner/name` of the model whose latest version is used when no
    /// explicit version is pinned.
    pub model: String,
    pub version: Option<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub max_polls: u32,
}

#[derive(Debug, Clone)]
pub struct HuggingFaceConfig {
    pub api_token: String,
    pub models: Vec<String>,
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub openai: Option<OpenAiConfig>,
    pub replicate: Option<ReplicateConfig>,
    pub huggingface: Option<HuggingFaceConfig>,
    pub provider_order: Vec<ProviderKind>,
    pub output_dir: PathBuf,
    pub min_image_bytes: usize,
    pub max_fragment_bytes: usize,
    pub provider_deadline: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let openai = get("OPENAI_API_KEY").map(|api_key| OpenAiConfig {
            api_key,
            model: get("OPENAI_IMAGE_MODEL").unwrap_or_else(|| "gpt-image-1".to_string()),
            quality: get("OPENAI_IMAGE_QUALITY"),
            base_url: get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            timeout: Duration::from_secs(120),
        });

        let replicate = get("REPLICATE_API_TOKEN").map(|api_token| ReplicateConfig {
            api_token,
            model: get("REPLICATE_MODEL").unwrap_or_else(|| "stability-ai/sdxl".to_string()),
            version: get("REPLICATE_VERSION"),
            base_url: get("REPLICATE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_REPLICATE_BASE_URL.to_string()),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
            max_polls: 60,
        });

        let huggingface = get("HF_API_TOKEN")
            .or_else(|| get("HUGGINGFACE_API_TOKEN"))
            .map(|api_token| HuggingFaceConfig {
                api_token,
                models: get("HF_MODELS")
                    .map(|list| parse_list(&list))
                    .filter(|models| !models.is_empty())
                    .unwrap_or_else(|| DEFAULT_HF_MODELS.iter().map(|m| m.to_string()).collect()),
                base_url: get("HF_BASE_URL").unwrap_or_else(|| DEFAULT_HF_BASE_URL.to_string()),
                timeout: Duration::from_secs(120),
                max_attempts: 3,
                backoff_step: Duration::from_secs(2),
            });

        let provider_order = match get("PROVIDER_ORDER") {
            Some(list) => parse_provider_order(&list)?,
            None => ProviderKind::DEFAULT_ORDER.to_vec(),
        };

        let max_fragment_bytes = match get("MAX_FILE_SIZE") {
            Some(value) => value
                .parse()
                .map_err(|_| Error::Config(format!("MAX_FILE_SIZE is not a number: {}", value)))?,
            None => DEFAULT_MAX_FRAGMENT_BYTES,
        };

        let min_image_bytes = match get("MIN_IMAGE_BYTES") {
            Some(value) => value
                .parse()
                .map_err(|_| Error::Config(format!("MIN_IMAGE_BYTES is not a number: {}", value)))?,
            None => DEFAULT_MIN_IMAGE_BYTES,
        };

        let provider_deadline = match get("PROVIDER_DEADLINE_SECS") {
            Some(value) => Duration::from_secs(value.parse().map_err(|_| {
                Error::Config(format!("PROVIDER_DEADLINE_SECS is not a number: {}", value))
            })?),
            None => Duration::from_secs(300),
        };

        Ok(Self {
            openai,
            replicate,
            huggingface,
            provider_order,
            output_dir: PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| "uploads".to_string())),
            min_image_bytes,
            max_fragment_bytes,
            provider_deadline,
        })
    }
}

/// Each provider may appear at most once; the chain never retries a provider.
fn parse_provider_order(list: &str) -> Result<Vec<ProviderKind>> {
    let mut order: Vec<ProviderKind> = Vec::new();
    for name in parse_list(list) {
        let kind: ProviderKind = name.parse()?;
        if order.contains(&kind) {
            return Err(Error::Config(format!(
                "PROVIDER_ORDER lists {} more than once",
                kind.name()
            )));
        }
        order.push(kind);
    }
    Ok(order)
}

fn parse_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

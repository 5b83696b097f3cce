//! External image-generation backends
//!
//! Each backend speaks its own protocol (one-shot call, submit-then-poll job,
//! retried inference) but exposes the same [`ImageProvider`] capability, so the
//! fallback chain never needs to know which one it is driving.

pub mod extract;
pub mod http;
pub mod huggingface;
pub mod mock;
pub mod openai;
pub mod poll;
pub mod replicate;

pub use huggingface::HuggingFaceProvider;
pub use mock::MockImageProvider;
pub use openai::OpenAiImageProvider;
pub use poll::{PollPolicy, Sleeper, TokioSleeper};
pub use replicate::ReplicateProvider;

use crate::error::ProviderFailure;
use crate::models::SourceProvider;
use async_trait::async_trait;

/// Outcome of one provider attempt: image bytes, or why there are none.
pub type ProviderResult = std::result::Result<Vec<u8>, ProviderFailure>;

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Short identifier used in logs and attempt records.
    fn name(&self) -> &str;

    fn source(&self) -> SourceProvider;

    async fn attempt_generation(&self, prompt: &str) -> ProviderResult;
}

//! Error handling and custom error types
//!
//! [`Error`] is what the library surfaces to callers. [`ProviderFailure`] is the
//! reason a single generation backend gave up; the fallback chain logs and
//! absorbs it, so it never reaches a caller.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Why one provider attempt did not produce a usable image.
#[derive(Error, Debug)]
pub enum ProviderFailure {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model {model} is loading or busy (status {status})")]
    ModelBusy { model: String, status: u16 },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("image payload too small ({len} bytes, minimum {min})")]
    Undersized { len: usize, min: usize },

    #[error("image payload could not be decoded: {0}")]
    Undecodable(String),

    #[error("could not resolve a job version for {0}")]
    VersionUnresolved(String),

    #[error("job {id} failed: {reason}")]
    JobFailed { id: String, reason: String },

    #[error("job {id} was canceled by the provider")]
    JobCanceled { id: String },

    #[error("job {id} still running after {attempts} polls")]
    PollTimedOut { id: String, attempts: u32 },

    #[error("all candidate models failed: {0}")]
    ModelsExhausted(String),

    #[error("provider deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),
}

impl ProviderFailure {
    /// Reads a non-success response into a [`ProviderFailure::Status`].
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Status {
            status,
            body: truncate(&body, 500),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

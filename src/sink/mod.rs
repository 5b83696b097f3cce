//! Persistence of the final artifact
//!
//! Every request gets its own output file, and the shared `latest.png` slot is
//! replaced atomically, so concurrent requests never write to the same path.

pub mod file;
pub mod mock;

pub use file::FileSink;
pub use mock::MemorySink;

use crate::models::{GeneratedArtifact, StoredArtifact};
use crate::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn persist(&self, request_id: Uuid, artifact: &GeneratedArtifact)
        -> Result<StoredArtifact>;
}

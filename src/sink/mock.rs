use super::ArtifactSink;
use crate::models::{GeneratedArtifact, SourceProvider, StoredArtifact};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Keeps artifacts in memory; can be told to fail like a full disk.
#[derive(Clone, Default)]
pub struct MemorySink {
    artifacts: Arc<Mutex<HashMap<Uuid, (SourceProvider, Vec<u8>)>>>,
    latest: Arc<Mutex<Option<Vec<u8>>>>,
    should_fail: Arc<Mutex<bool>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure(self, should_fail: bool) -> Self {
        *self.should_fail.lock().unwrap() = should_fail;
        self
    }

    pub fn get_artifact(&self, request_id: Uuid) -> Option<(SourceProvider, Vec<u8>)> {
        self.artifacts.lock().unwrap().get(&request_id).cloned()
    }

    pub fn get_latest(&self) -> Option<Vec<u8>> {
        self.latest.lock().unwrap().clone()
    }

    pub fn get_write_count(&self) -> usize {
        self.artifacts.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactSink for MemorySink {
    async fn persist(
        &self,
        request_id: Uuid,
        artifact: &GeneratedArtifact,
    ) -> Result<StoredArtifact> {
        if *self.should_fail.lock().unwrap() {
            return Err(Error::Io(std::io::Error::other("Mock failure")));
        }

        self.artifacts
            .lock()
            .unwrap()
            .insert(request_id, (artifact.source, artifact.bytes.clone()));
        *self.latest.lock().unwrap() = Some(artifact.bytes.clone());

        Ok(StoredArtifact {
            request_id,
            path: PathBuf::from(format!("memory://reconstructed-{}", request_id)),
            latest_path: PathBuf::from("memory://latest"),
            source: artifact.source,
            mime_type: artifact.mime_type.to_string(),
            bytes_written: artifact.bytes.len(),
            written_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_sink_stores_by_request() {
        let sink = MemorySink::new();
        let id = Uuid::new_v4();
        let artifact = GeneratedArtifact::new(vec![1, 2, 3], SourceProvider::AsyncJob);

        let stored = sink.persist(id, &artifact).await.unwrap();

        assert_eq!(stored.bytes_written, 3);
        assert_eq!(
            sink.get_artifact(id),
            Some((SourceProvider::AsyncJob, vec![1, 2, 3]))
        );
        assert_eq!(sink.get_latest(), Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_memory_sink_failure() {
        let sink = MemorySink::new().with_failure(true);
        let artifact = GeneratedArtifact::new(vec![1], SourceProvider::Placeholder);

        let err = sink.persist(Uuid::new_v4(), &artifact).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(sink.get_write_count(), 0);
    }
}

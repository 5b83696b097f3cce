use super::ArtifactSink;
use crate::models::{GeneratedArtifact, StoredArtifact};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

const LATEST_FILE: &str = "latest.png";

/// Writes artifacts under a local output directory.
pub struct FileSink {
    output_dir: PathBuf,
}

impl FileSink {
    pub fn new(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)?;
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
        })
    }

    /// Writes through a temp file in the same directory and renames it into
    /// place, so readers never observe a partially written file.
    fn write_atomic(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    fn persist_sync(
        output_dir: PathBuf,
        request_id: Uuid,
        bytes: Vec<u8>,
    ) -> Result<(PathBuf, PathBuf)> {
        fs::create_dir_all(&output_dir)?;

        let path = output_dir.join(format!("reconstructed-{}.png", request_id));
        Self::write_atomic(&output_dir, &path, &bytes)?;

        let latest_path = output_dir.join(LATEST_FILE);
        Self::write_atomic(&output_dir, &latest_path, &bytes)?;

        Ok((path, latest_path))
    }
}

#[async_trait]
impl ArtifactSink for FileSink {
    async fn persist(
        &self,
        request_id: Uuid,
        artifact: &GeneratedArtifact,
    ) -> Result<StoredArtifact> {
        let (path, latest_path) = tokio::task::spawn_blocking({
            let output_dir = self.output_dir.clone();
            let bytes = artifact.bytes.clone();
            move || Self::persist_sync(output_dir, request_id, bytes)
        })
        .await
        .map_err(|e| Error::Invariant(format!("Artifact write task join error: {}", e)))??;

        tracing::info!(
            "Saved {} bytes from {:?} at {}",
            artifact.bytes.len(),
            artifact.source,
            path.display()
        );

        Ok(StoredArtifact {
            request_id,
            path,
            latest_path,
            source: artifact.source,
            mime_type: artifact.mime_type.to_string(),
            bytes_written: artifact.bytes.len(),
            written_at: Utc::now(),
        })
    }
}

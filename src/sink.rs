//! Atomic persistence of fetched documents
//!
//! The SinkWriter commits one blob per successfully fetched document, keyed
//! by identifier. Writes are atomic from the perspective of readers: content
//! is staged to a `.part` file, flushed to disk, and only then renamed into
//! its final addressed location. A partially written document is never
//! observable under the document directory.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::types::DocumentDescriptor;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

/// Extension used for staged, not-yet-committed files
const STAGING_EXTENSION: &str = "part";

/// Location and content hash of a committed blob
#[derive(Clone, Debug)]
pub struct StoredBlob {
    /// Final path of the blob under the document directory
    pub path: PathBuf,
    /// Hex-encoded SHA-256 hash of the content
    pub content_hash: String,
}

/// Identifier-addressed blob store with atomic commit
///
/// Blobs live at `<document_dir>/<year>/<identifier>`; the staging directory
/// must share a filesystem with the document directory so the final rename
/// is atomic.
pub struct SinkWriter {
    document_dir: PathBuf,
    staging_dir: PathBuf,
}

impl SinkWriter {
    /// Create a writer over the configured storage locations
    #[must_use]
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            document_dir: config.document_dir.clone(),
            staging_dir: config.staging_dir.clone(),
        }
    }

    /// Create the storage directories and discard stale staged files
    ///
    /// Leftover `.part` files come from a cancelled or crashed run; their
    /// documents were never recorded in the ledger, so they will be fetched
    /// again and can be dropped here.
    pub async fn init(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.document_dir).await?;
        tokio::fs::create_dir_all(&self.staging_dir).await?;

        let mut entries = tokio::fs::read_dir(&self.staging_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == STAGING_EXTENSION) {
                tracing::warn!(path = %path.display(), "Discarding stale staged file");
                tokio::fs::remove_file(&path).await?;
            }
        }

        Ok(())
    }

    /// Persist `bytes` for `descriptor`, atomically
    ///
    /// Stages the full content, syncs it to disk, then renames it into the
    /// final location. Any failure along the way surfaces as
    /// [`Error::WriteFailed`], which the scheduler treats as transient.
    pub async fn write(&self, descriptor: &DocumentDescriptor, bytes: &[u8]) -> Result<StoredBlob> {
        let identifier = &descriptor.identifier;
        validate_identifier(identifier)?;

        let content_hash = hash_bytes(bytes);
        let staging_path = self
            .staging_dir
            .join(format!("{identifier}.{STAGING_EXTENSION}"));
        let final_dir = self.document_dir.join(descriptor.year.to_string());
        let final_path = final_dir.join(identifier);

        let staged = async {
            let mut file = tokio::fs::File::create(&staging_path).await?;
            file.write_all(bytes).await?;
            file.sync_all().await?;
            tokio::fs::create_dir_all(&final_dir).await?;
            tokio::fs::rename(&staging_path, &final_path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = staged {
            // Best effort: do not leave a half-written staged file behind
            let _ = tokio::fs::remove_file(&staging_path).await;
            return Err(Error::WriteFailed {
                identifier: identifier.clone(),
                reason: e.to_string(),
            });
        }

        tracing::debug!(
            identifier = %identifier,
            path = %final_path.display(),
            bytes = bytes.len(),
            "Document committed"
        );

        Ok(StoredBlob {
            path: final_path,
            content_hash,
        })
    }

    /// Final path a blob for this identifier and year would occupy
    #[must_use]
    pub fn blob_path(&self, identifier: &str, year: i32) -> PathBuf {
        self.document_dir.join(year.to_string()).join(identifier)
    }

    /// Whether a committed blob exists for this identifier and year
    pub async fn contains(&self, identifier: &str, year: i32) -> bool {
        tokio::fs::try_exists(self.blob_path(identifier, year))
            .await
            .unwrap_or(false)
    }
}

/// Hex-encoded SHA-256 of `bytes`
fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reject identifiers that would escape the blob layout
fn validate_identifier(identifier: &str) -> Result<()> {
    if identifier.is_empty()
        || identifier.contains(['/', '\\'])
        || identifier.contains("..")
        || identifier.starts_with('.')
    {
        return Err(Error::WriteFailed {
            identifier: identifier.to_string(),
            reason: "identifier is not a safe file name".to_string(),
        });
    }
    Ok(())
}

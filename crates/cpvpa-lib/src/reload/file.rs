//! Config file source with cheap change detection
//!
//! Change detection compares a metadata fingerprint (device, inode,
//! modification time, length) instead of re-reading the file. Metadata is
//! taken through symlinks, so a ConfigMap volume swapping its `..data` link
//! shows up as a new inode.

use super::ConfigSource;
use crate::error::ConfigError;
use async_trait::async_trait;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint {
    device: u64,
    inode: u64,
    modified: Option<SystemTime>,
    len: u64,
}

impl Fingerprint {
    #[cfg(unix)]
    fn of(meta: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            device: meta.dev(),
            inode: meta.ino(),
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }

    #[cfg(not(unix))]
    fn of(meta: &Metadata) -> Self {
        Self {
            device: 0,
            inode: 0,
            modified: meta.modified().ok(),
            len: meta.len(),
        }
    }
}

/// A JSON config file on local disk
#[derive(Debug)]
pub struct FileConfigSource {
    path: PathBuf,
    loaded: Option<Fingerprint>,
    pending: Option<Fingerprint>,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: None,
            pending: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn fingerprint(&self) -> Result<Fingerprint, ConfigError> {
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ConfigError::io(self.describe(), "can't stat file", e))?;
        Ok(Fingerprint::of(&meta))
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn has_changed(&self) -> Result<bool, ConfigError> {
        let current = self.fingerprint().await?;
        Ok(self.loaded.as_ref() != Some(&current))
    }

    async fn read(&mut self) -> Result<Vec<u8>, ConfigError> {
        let fingerprint = self.fingerprint().await?;
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ConfigError::io(self.describe(), "can't read file", e))?;
        self.pending = Some(fingerprint);
        Ok(bytes)
    }

    fn mark_loaded(&mut self) {
        if let Some(fingerprint) = self.pending.take() {
            self.loaded = Some(fingerprint);
        }
    }
}

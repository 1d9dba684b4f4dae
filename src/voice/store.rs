//! On-disk store for synthesized clips, served at `/audio/{id}`

use super::SpeechError;
use crate::turn::AudioHandle;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Clips kept on disk; older ones are pruned after each save
pub const KEEP_CLIPS: usize = 32;

#[derive(Debug, Clone)]
pub struct AudioStore {
    dir: PathBuf,
    keep: usize,
}

impl AudioStore {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            keep: KEEP_CLIPS,
        })
    }

    #[must_use]
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write a clip and return a handle to it
    pub async fn save(&self, bytes: &[u8], extension: &str) -> Result<AudioHandle, SpeechError> {
        let id = format!("{}.{extension}", uuid::Uuid::new_v4().simple());
        let path = self.dir.join(&id);
        tokio::fs::write(&path, bytes).await?;
        if let Err(e) = self.prune(&path).await {
            tracing::warn!(error = %e, "Failed to prune audio store");
        }

        let mime = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        tracing::debug!(%id, size = bytes.len(), "Stored clip");
        Ok(AudioHandle {
            url: format!("/audio/{id}"),
            id,
            path,
            mime,
        })
    }

    /// Resolve a clip id from a URL. Ids are generated here, so anything that
    /// isn't a plain `name.ext` is rejected rather than joined onto the path.
    pub fn path_for(&self, id: &str) -> Option<PathBuf> {
        let valid = !id.is_empty()
            && !id.starts_with('.')
            && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '.')
            && id.matches('.').count() == 1;
        if !valid {
            return None;
        }
        let path = self.dir.join(id);
        path.is_file().then_some(path)
    }

    /// Drop the oldest clips beyond the limit, never the one just written
    async fn prune(&self, latest: &Path) -> std::io::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut clips: Vec<(SystemTime, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() && entry.path() != latest {
                clips.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), entry.path()));
            }
        }
        let others = self.keep - 1;
        if clips.len() <= others {
            return Ok(());
        }

        clips.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, path) in clips.into_iter().skip(others) {
            tokio::fs::remove_file(&path).await?;
        }
        Ok(())
    }
}

//! Artifact storage - screenshots written under the run's artifact directory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::debug;
use uiv_core::{Result, UivError};

/// Metadata for a stored artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Path including the artifact directory
    pub path: PathBuf,
    /// Size in bytes
    pub size_bytes: u64,
    /// When written
    pub created_at: DateTime<Utc>,
}

/// Writes artifacts, never outside its base directory
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    base_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the base directory if absent
    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    /// Reject names that would land outside the base directory.
    ///
    /// Names without an extension get `.png`.
    pub fn validate_name(file_name: &str) -> Result<PathBuf> {
        let relative = Path::new(file_name);
        if file_name.trim().is_empty() {
            return Err(UivError::config(file_name, "artifact name is empty"));
        }
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(UivError::config(
                file_name,
                "artifact names must be relative paths without '..'",
            ));
        }

        let mut relative = relative.to_path_buf();
        if relative.extension().is_none() {
            relative.set_extension("png");
        }
        Ok(relative)
    }

    /// Write `data` to `<base_dir>/<file_name>`
    pub async fn store(&self, file_name: &str, data: &[u8]) -> Result<StoredArtifact> {
        let relative = Self::validate_name(file_name)?;
        let path = self.base_dir.join(relative);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        debug!("Stored artifact {} ({} bytes)", path.display(), data.len());

        Ok(StoredArtifact {
            path,
            size_bytes: data.len() as u64,
            created_at: Utc::now(),
        })
    }
}

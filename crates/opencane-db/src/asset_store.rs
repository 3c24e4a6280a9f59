//! `AssetStore`: writes/reads lifelog image bytes to the filesystem layout
//! in `opencane_core::paths::lifelog_image_path` (spec §6.3). The SQLite
//! `lifelog_images` row records `asset_uri`; this is the thing that
//! produces and resolves that URI.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use opencane_core::paths::{lifelog_image_path, PathError};

#[derive(Debug, thiserror::Error)]
pub enum AssetStoreError {
    #[error("path resolution failed: {0}")]
    Path(#[from] PathError),
    #[error("filesystem error writing {path}: {reason}")]
    Write { path: PathBuf, reason: String },
    #[error("filesystem error reading {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

pub struct AssetStore {
    data_root: PathBuf,
}

impl AssetStore {
    #[must_use]
    pub fn new(data_root: PathBuf) -> Self {
        Self { data_root }
    }

    /// Writes `bytes` for one lifelog image, returning a `file://` URI
    /// pointing at the written path for storage in `lifelog_images.asset_uri`.
    pub fn write_image(
        &self,
        session_id: &str,
        recorded_at: DateTime<Utc>,
        content_hash: &str,
        ext: &str,
        bytes: &[u8],
    ) -> Result<String, AssetStoreError> {
        let yyyymmdd = recorded_at.format("%Y%m%d").to_string();
        let path = lifelog_image_path(&self.data_root, session_id, &yyyymmdd, content_hash, ext);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AssetStoreError::Write {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }
        std::fs::write(&path, bytes).map_err(|e| AssetStoreError::Write {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        Ok(format!("file://{}", path.display()))
    }

    pub fn read_image(&self, asset_uri: &str) -> Result<Vec<u8>, AssetStoreError> {
        let path = asset_uri.strip_prefix("file://").unwrap_or(asset_uri);
        std::fs::read(path).map_err(|e| AssetStoreError::Read {
            path: PathBuf::from(path),
            reason: e.to_string(),
        })
    }
}

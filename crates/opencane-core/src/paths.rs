//! Data-root resolution for on-disk state (SQLite file, lifelog image assets).
//!
//! Simplified relative to a desktop application's path module: there is no
//! local-repo detection or resource root, only a single data root a headless
//! service needs.

use std::env;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("no system data directory available on this platform")]
    NoDataDir,

    #[error("failed to create directory {path}: {reason}")]
    CreateFailed { path: PathBuf, reason: String },
}

/// Root directory for application data (SQLite database, lifelog images).
///
/// Resolution order:
/// 1. `OPENCANE_DATA_DIR` environment variable.
/// 2. System data directory (e.g. `~/.local/share/opencane`), created if
///    missing.
pub fn data_root() -> Result<PathBuf, PathError> {
    if let Ok(path) = env::var("OPENCANE_DATA_DIR") {
        let root = PathBuf::from(path);
        ensure_exists(&root)?;
        return Ok(root);
    }

    let base = dirs::data_local_dir().ok_or(PathError::NoDataDir)?;
    let root = base.join("opencane");
    ensure_exists(&root)?;
    Ok(root)
}

fn ensure_exists(path: &std::path::Path) -> Result<(), PathError> {
    if !path.exists() {
        fs::create_dir_all(path).map_err(|e| PathError::CreateFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

/// Path to the SQLite database file under the data root.
pub fn database_path() -> Result<PathBuf, PathError> {
    Ok(data_root()?.join("opencane.sqlite3"))
}

/// Path under which a lifelog image's bytes should be written:
/// `{data_root}/lifelog/images/{session}/{yyyymmdd}/{hash}.{ext}` (spec §6.3).
pub fn lifelog_image_path(
    data_root: &std::path::Path,
    session_id: &str,
    yyyymmdd: &str,
    content_hash: &str,
    ext: &str,
) -> PathBuf {
    data_root
        .join("lifelog")
        .join("images")
        .join(session_id)
        .join(yyyymmdd)
        .join(format!("{content_hash}.{ext}"))
}

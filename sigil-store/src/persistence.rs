//! Settings file I/O.
//!
//! The settings file can name a consumer key and token, so it is written
//! owner-only (0600, directory 0700 on Unix) and replaced atomically through
//! a `.partial` sibling.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::StoreError;

// ============================================================================
// Locations
// ============================================================================

/// Returns the directory Sigil keeps its settings in.
///
/// This is `sigil` under the platform config directory, or under the
/// working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sigil")
}

/// Returns the default settings file.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join("settings.json")
}

// ============================================================================
// Reading and Writing
// ============================================================================

/// Reads and decodes a JSON file.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the file cannot be read and
/// [`StoreError::Serialization`] if it is not valid JSON for `T`.
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let bytes = tokio::fs::read(path).await?;
    let value = serde_json::from_slice(&bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Read JSON");
    Ok(value)
}

/// Encodes `value` as pretty JSON and replaces `path` with it.
///
/// Missing parent directories are created owner-only. Readers see either
/// the old file or the new one, never a partial write.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if `value` cannot be encoded, or
/// [`StoreError::Io`] if a directory or file cannot be written.
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        create_private_dir(dir).await?;
    }

    let partial = partial_path(path);
    write_private(&partial, &bytes).await?;
    tokio::fs::rename(&partial, path).await?;

    debug!(path = %path.display(), bytes = bytes.len(), "Wrote JSON");
    Ok(())
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

async fn create_private_dir(dir: &Path) -> Result<(), StoreError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(dir).await?;
    Ok(())
}

/// Writes a fresh file; on Unix it is created 0600 rather than narrowed later.
async fn write_private(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    // A leftover from an interrupted save would keep its old mode.
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_path_layout() {
        assert!(default_settings_path().ends_with("sigil/settings.json"));
        assert_eq!(
            partial_path(Path::new("/x/settings.json")),
            PathBuf::from("/x/settings.json.partial")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("sigil");
        let path = dir.join("settings.json");

        save_json(&path, &serde_json::json!({"profile": "work"}))
            .await
            .unwrap();

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        let dir_mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        assert_eq!(dir_mode, 0o700);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stale_partial_replaced() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("settings.json");
        let partial = partial_path(&path);
        std::fs::write(&partial, "garbage").unwrap();
        std::fs::set_permissions(&partial, std::fs::Permissions::from_mode(0o644)).unwrap();

        save_json(&path, &serde_json::json!({"retry_count": 1}))
            .await
            .unwrap();

        assert!(!partial.exists());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        let value: serde_json::Value = load_json(&path).await.unwrap();
        assert_eq!(value["retry_count"], 1);
    }
}

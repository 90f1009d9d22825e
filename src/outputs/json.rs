//! JSON table persistence.
//!
//! Every dataset (price series, news corpus, combined rows) is stored as a
//! single JSON array and always written as a full overwrite. Writes go to a
//! temporary sibling first and are renamed over the target, so an interrupted
//! write leaves the previous table intact.

use crate::error::CrawlError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serialize `rows` and atomically replace the file at `path`.
///
/// Missing parent directories are created. The JSON is written to a `.tmp`
/// sibling and renamed over `path`.
///
/// # Arguments
///
/// * `rows` - The table to persist
/// * `path` - Destination file
///
/// # Errors
///
/// [`CrawlError::Serialization`] if `rows` cannot be encoded, and
/// [`CrawlError::Storage`] if a directory, the temporary file or the rename
/// fails. On error the previous contents of `path` are untouched.
#[instrument(level = "debug", skip_all, fields(path = %path.display(), rows = rows.len()))]
pub async fn write_table<T: Serialize>(rows: &[T], path: &Path) -> Result<(), CrawlError> {
    let json = serde_json::to_vec(rows)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| CrawlError::storage(parent, e))?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, &json)
        .await
        .map_err(|e| CrawlError::storage(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| CrawlError::storage(path, e))?;

    debug!(bytes = json.len(), "Wrote JSON table");
    Ok(())
}

/// Read a table written by [`write_table`].
///
/// # Returns
///
/// `Ok(None)` when `path` does not exist, otherwise the decoded rows.
///
/// # Errors
///
/// [`CrawlError::Storage`] if the file exists but cannot be read, and
/// [`CrawlError::Serialization`] if its contents are not a JSON array of `T`.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Option<Vec<T>>, CrawlError> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No existing table");
            return Ok(None);
        }
        Err(e) => return Err(CrawlError::storage(path, e)),
    };
    let rows: Vec<T> = serde_json::from_slice(&bytes)?;
    debug!(rows = rows.len(), "Read JSON table");
    Ok(Some(rows))
}

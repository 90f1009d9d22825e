//! Utility functions for text cleanup, HTTP client construction and file system checks.

use crate::config::CrawlConfig;
use crate::error::CrawlError;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use std::borrow::Cow;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Collapse every run of whitespace into a single space and trim the ends.
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}

/// Decode a response body, replacing undecodable bytes instead of failing.
pub fn decode_lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at `max` bytes (backing off to a char boundary) with
/// `"…(+N bytes)"` appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// HTTP client shared by every upstream endpoint of a run.
///
/// Uses the configured user agent and request timeout and follows up to ten
/// redirects.
///
/// # Errors
///
/// [`CrawlError::Config`] if the TLS backend cannot be initialized.
pub fn build_client(config: &CrawlConfig) -> Result<Client, CrawlError> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.request_timeout())
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| CrawlError::Config(format!("cannot build HTTP client: {e}")))
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Arguments
///
/// * `path` - Directory to check, typically the configured data directory
///
/// # Errors
///
/// [`CrawlError::Storage`] if the directory cannot be created or the probe
/// file cannot be written.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), CrawlError> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| CrawlError::storage(path, e))?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Data directory is writable");
            Ok(())
        }
        Err(e) => Err(CrawlError::storage(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \n\t b  c "), "a b c");
        assert_eq!(collapse_whitespace("\n\n"), "");
    }

    #[test]
    fn test_decode_lossy_replaces_invalid_bytes() {
        assert_eq!(decode_lossy(b"caf\xff!"), "caf\u{FFFD}!");
        assert_eq!(decode_lossy("café".as_bytes()), "café");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("ééé", 3), "é…(+4 bytes)");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("a/b");
        ensure_writable_dir(&target).await.unwrap();
        assert!(target.is_dir());
        assert!(!target.join("..__probe_write__").exists());
    }

    #[test]
    fn test_build_client_from_defaults() {
        assert!(build_client(&CrawlConfig::default()).is_ok());
    }
}

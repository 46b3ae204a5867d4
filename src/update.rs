//! Background check for a newer release.
//!
//! The check runs on its own thread with a private runtime and reports
//! through a callback. Any failure is logged and reported as no update.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

/// Version of this build.
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Update check errors.
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("Update server returned {0}")]
    BadStatus(reqwest::StatusCode),
    #[error("Failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Release manifest served at the update URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpdateInfo {
    pub version: String,
    #[serde(default)]
    pub url: String,
}

/// Whether `candidate` is a strictly newer dotted version than `current`.
///
/// A leading `v` is ignored, missing components count as zero and anything
/// after a `-` or `+` is dropped. Unparseable candidates are never newer.
pub fn is_newer(current: &str, candidate: &str) -> bool {
    match (parse_version(current), parse_version(candidate)) {
        (Some(current), Some(candidate)) => {
            let len = current.len().max(candidate.len());
            let pad = |v: &[u64]| {
                let mut v = v.to_vec();
                v.resize(len, 0);
                v
            };
            pad(&candidate) > pad(&current)
        }
        _ => false,
    }
}

fn parse_version(version: &str) -> Option<Vec<u64>> {
    let version = version.trim().trim_start_matches(['v', 'V']);
    let core = version.split(['-', '+']).next()?;
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse().ok()).collect()
}

/// Fetch the manifest and compare it with `current_version`.
pub async fn fetch_update(url: &str, current_version: &str) -> Result<Option<UpdateInfo>, UpdateError> {
    let client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()?;

    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(UpdateError::BadStatus(response.status()));
    }

    let info: UpdateInfo = response.json().await?;
    tracing::debug!("Latest published version: {}", info.version);
    Ok(is_newer(current_version, &info.version).then_some(info))
}

fn check_blocking(url: &str, current_version: &str) -> Result<Option<UpdateInfo>, UpdateError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(fetch_update(url, current_version))
}

/// Run the check on a background thread and hand the outcome to `callback`.
///
/// An empty `url` reports `None` without touching the network.
pub fn spawn_update_check<F>(url: impl Into<String>, current_version: impl Into<String>, callback: F) -> JoinHandle<()>
where
    F: FnOnce(Option<UpdateInfo>) + Send + 'static,
{
    let url = url.into();
    let current_version = current_version.into();

    thread::spawn(move || {
        if url.trim().is_empty() {
            tracing::debug!("No update URL configured, skipping update check");
            callback(None);
            return;
        }

        let outcome = match check_blocking(&url, &current_version) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("Update check failed: {}", e);
                None
            }
        };
        callback(outcome);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_is_newer() {
        assert!(is_newer("0.1.0", "0.2.0"));
        assert!(is_newer("0.1.0", "v0.1.1"));
        assert!(is_newer("1.9.9", "1.10.0"));
        assert!(is_newer("1.2", "1.2.1"));
        assert!(!is_newer("1.2.0", "1.2"));
        assert!(!is_newer("0.2.0", "0.1.9"));
        assert!(!is_newer("0.1.0", "0.1.0"));
    }

    #[test]
    fn test_unparseable_is_never_newer() {
        assert!(!is_newer("0.1.0", ""));
        assert!(!is_newer("0.1.0", "latest"));
        assert!(!is_newer("0.1.0", "1.x"));
    }

    #[test]
    fn test_prerelease_suffix_ignored() {
        assert!(is_newer("0.1.0", "0.2.0-rc1"));
        assert!(!is_newer("0.2.0", "0.2.0+build5"));
    }

    #[test]
    fn test_manifest_deserialize() {
        let info: UpdateInfo = serde_json::from_str(r#"{"version":"1.0.0"}"#).unwrap();
        assert_eq!(info.version, "1.0.0");
        assert!(info.url.is_empty());
    }

    #[test]
    fn test_empty_url_reports_none() {
        let (tx, rx) = mpsc::channel();
        spawn_update_check("", CURRENT_VERSION, move |info| {
            tx.send(info).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap(), None);
    }

    #[test]
    fn test_unreachable_url_reports_none() {
        let (tx, rx) = mpsc::channel();
        spawn_update_check("http://127.0.0.1:9/manifest.json", "0.0.1", move |info| {
            tx.send(info).unwrap();
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv().unwrap(), None);
    }
}

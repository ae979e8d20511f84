//! Input resolution: load a story document from a local path or a URL.
//!
//! ## Why read everything up front?
//!
//! The splitter needs the whole document as one `&str`: a data URL can sit
//! anywhere and run for megabytes, so there is no useful streaming boundary.
//! Reading fully also lets us reject non-UTF-8 input before any worker is
//! busy, with the byte offset of the first bad sequence in the error.

use crate::error::CompressError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// File name used when a URL path does not end in one.
pub const FALLBACK_FILE_NAME: &str = "project.json";

/// A loaded story document.
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub text: String,
    /// Suggested output name; the input's own file name.
    pub file_name: String,
    /// Path or URL the document came from.
    pub origin: String,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Load the document at `input`, downloading it if it is a URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<InputDocument, CompressError> {
    if input.trim().is_empty() {
        return Err(CompressError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<InputDocument, CompressError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => CompressError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => CompressError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let text = into_text(bytes, path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string());

    debug!("Read local document: {} ({} bytes)", path.display(), text.len());
    Ok(InputDocument {
        text,
        file_name,
        origin: path.display().to_string(),
    })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<InputDocument, CompressError> {
    info!("Downloading story file from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| CompressError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_err = |e: reqwest::Error| {
        if e.is_timeout() {
            CompressError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            CompressError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_err)?;

    if !response.status().is_success() {
        return Err(CompressError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_err)?;
    let text = into_text(bytes.to_vec(), Path::new(url))?;

    info!("Downloaded {} bytes", text.len());
    Ok(InputDocument {
        text,
        file_name: file_name_from_url(url),
        origin: url.to_string(),
    })
}

fn into_text(bytes: Vec<u8>, origin: &Path) -> Result<String, CompressError> {
    String::from_utf8(bytes).map_err(|e| CompressError::NotText {
        path: PathBuf::from(origin),
        offset: e.utf8_error().valid_up_to(),
    })
}

/// Last path segment of the URL if it looks like a file name.
pub fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    FALLBACK_FILE_NAME.to_string()
}

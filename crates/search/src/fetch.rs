//! Byte acquisition and scratch files

use crate::error::FetchError;
use crate::types::ImageRef;
use lensbot_core::AppState;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Clone)]
pub struct Fetcher {
    http: reqwest::Client,
    max_bytes: u64,
    scratch_dir: PathBuf,
}

impl Fetcher {
    pub fn new(http: reqwest::Client, max_bytes: u64, scratch_dir: PathBuf) -> Self {
        Self {
            http,
            max_bytes,
            scratch_dir,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(state.http.clone(), state.config.max_image_bytes, state.scratch_dir.clone())
    }

    /// Resolves any `ImageRef` into `ImageRef::Bytes`.
    /// URLs get exactly one GET under the client timeout; nothing is retried.
    pub async fn acquire(&self, image: ImageRef) -> Result<ImageRef, FetchError> {
        match image {
            ImageRef::Bytes { data, content_type } => {
                self.check_size(data.len() as u64)?;
                Ok(ImageRef::Bytes { data, content_type })
            }
            ImageRef::Url(url) => {
                info!("🌐 Fetching image: {}", url);
                let mut response = self.http.get(&url).send().await.map_err(FetchError::from_reqwest)?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::Status(status.as_u16()));
                }
                if let Some(len) = response.content_length() {
                    self.check_size(len)?;
                }

                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| FALLBACK_CONTENT_TYPE.to_string());

                // Content-Length can lie or be absent; bound the body as it streams in.
                let mut data = Vec::new();
                while let Some(chunk) = response.chunk().await.map_err(FetchError::from_reqwest)? {
                    self.check_size((data.len() + chunk.len()) as u64)?;
                    data.extend_from_slice(&chunk);
                }

                debug!("Fetched {} bytes ({}) from {}", data.len(), content_type, url);
                Ok(ImageRef::Bytes { data, content_type })
            }
        }
    }

    /// Writes `data` to a fresh file in the scratch directory, named after the request.
    pub async fn scratch_copy(&self, request_id: &str, data: &[u8]) -> Result<ScratchFile, FetchError> {
        let dir = self.scratch_dir.clone();
        let prefix = format!("{}-", scratch_prefix(request_id));
        let data = data.to_vec();

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<tempfile::NamedTempFile> {
            std::fs::create_dir_all(&dir)?;
            let mut file = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".img")
                .tempfile_in(&dir)?;
            file.write_all(&data)?;
            file.flush()?;
            Ok(file)
        })
        .await
        .map_err(std::io::Error::other)??;

        debug!("📝 Scratch file created: {}", file.path().display());
        Ok(ScratchFile { file })
    }

    fn check_size(&self, len: u64) -> Result<(), FetchError> {
        if len > self.max_bytes {
            Err(FetchError::TooLarge { limit: self.max_bytes })
        } else {
            Ok(())
        }
    }
}

/// Request-owned temporary file. Deleted when dropped, whichever way the request ends.
#[derive(Debug)]
pub struct ScratchFile {
    file: tempfile::NamedTempFile,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        debug!("🧹 Releasing scratch file: {}", self.file.path().display());
    }
}

/// Keeps file names portable whatever the platform uses as message ids.
fn scratch_prefix(request_id: &str) -> String {
    let cleaned: String = request_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(48)
        .collect();
    if cleaned.is_empty() {
        "request".to_string()
    } else {
        cleaned
    }
}

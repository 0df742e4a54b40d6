//! Maps request descriptors onto concrete HTTP requests.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use serde_json::json;
use tokio_util::io::ReaderStream;

use super::{RequestDescriptor, StartError};

const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Byte counter shared between an upload body and progress queries.
#[derive(Debug, Default)]
pub struct TransferProgress {
    sent: AtomicU64,
    total: AtomicU64,
}

impl TransferProgress {
    pub fn new(total: u64) -> Self {
        Self {
            sent: AtomicU64::new(0),
            total: AtomicU64::new(total),
        }
    }

    pub fn add(&self, bytes: u64) {
        self.sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Fraction sent, or `None` when the total is unknown.
    pub fn fraction(&self) -> Option<f64> {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return None;
        }
        Some((self.sent() as f64 / total as f64).min(1.0))
    }
}

/// Builds requests against the video API.
#[derive(Clone)]
pub struct RequestBuilder {
    client: Client,
    base_url: Url,
}

impl RequestBuilder {
    pub fn new(client: Client, base_url: &str) -> Result<Self, StartError> {
        let base_url = Url::parse(base_url.trim_end_matches('/')).map_err(|e| {
            StartError::InvalidUrl {
                url: base_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Resolves a URI returned by the API. Absolute URLs are used as-is,
    /// paths are appended to the base URL.
    pub fn resolve(&self, uri: &str) -> Result<Url, StartError> {
        let invalid = |reason: String| StartError::InvalidUrl {
            url: uri.to_string(),
            reason,
        };

        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Url::parse(uri).map_err(|e| invalid(e.to_string()));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = uri.trim_start_matches('/');
        Url::parse(&format!("{}/{}", base, path)).map_err(|e| invalid(e.to_string()))
    }

    /// Builds the request for `descriptor`. Upload bodies report sent bytes
    /// into `progress`.
    pub fn build(
        &self,
        descriptor: &RequestDescriptor,
        progress: &Arc<TransferProgress>,
    ) -> Result<reqwest::Request, StartError> {
        let builder = match descriptor {
            RequestDescriptor::Create { file } => {
                let size = file_size(file)?;
                self.client
                    .request(Method::POST, self.resolve("/me/videos")?)
                    .json(&json!({ "type": "streaming", "size": size }))
            }
            RequestDescriptor::Upload { file, destination } => {
                let url = self.resolve(destination)?;
                let size = file_size(file)?;
                progress.total.store(size, Ordering::Relaxed);

                let handle = std::fs::File::open(file).map_err(|e| unreadable(file, e))?;
                let counter = Arc::clone(progress);
                let stream = ReaderStream::new(tokio::fs::File::from_std(handle))
                    .inspect_ok(move |chunk| counter.add(chunk.len() as u64));

                self.client
                    .request(Method::PUT, url)
                    .header(CONTENT_TYPE, video_mime(file))
                    .header(reqwest::header::CONTENT_LENGTH, size)
                    .body(reqwest::Body::wrap_stream(stream))
            }
            RequestDescriptor::Activate { activation_uri } => self
                .client
                .request(Method::DELETE, self.resolve(activation_uri)?),
            RequestDescriptor::Settings {
                video_uri,
                settings,
            } => self
                .client
                .request(Method::PATCH, self.resolve(video_uri)?)
                .json(&settings.to_request_body()),
        };

        builder
            .build()
            .map_err(|e| StartError::InvalidRequest(e.to_string()))
    }
}

fn file_size(file: &Path) -> Result<u64, StartError> {
    let metadata = std::fs::metadata(file).map_err(|e| unreadable(file, e))?;
    if !metadata.is_file() {
        return Err(StartError::UnreadableFile {
            path: file.to_path_buf(),
            reason: "not a regular file".to_string(),
        });
    }
    Ok(metadata.len())
}

fn unreadable(file: &Path, err: std::io::Error) -> StartError {
    StartError::UnreadableFile {
        path: file.to_path_buf(),
        reason: err.to_string(),
    }
}

fn video_mime(file: &Path) -> String {
    mime_guess::from_path(file)
        .first()
        .filter(|mime| mime.type_() == mime_guess::mime::VIDEO)
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_VIDEO_MIME.to_string())
}

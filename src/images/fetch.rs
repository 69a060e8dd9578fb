//! Remote image download cache

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use derive_debug::Dbg;
use tracing::{debug, warn};

use crate::{config::ImportConfig, warn_row};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid image url ({url}): {error}")]
    InvalidUrl { url: String, error: url::ParseError },
    #[error("failed to fetch image ({url}): {error}")]
    Transport { url: String, error: reqwest::Error },
    #[error("failed to fetch image ({url}): status {code}")]
    Status {
        url: String,
        code: reqwest::StatusCode,
    },
    #[error("failed to write image ({path:?}): {error}")]
    Write {
        path: PathBuf,
        error: std::io::Error,
    },
}

/// Local cache file name for an image url: the last path segment, decoded,
/// restricted to `[A-Za-z0-9._-]` and prefixed with the code unless it
/// already contains it.
pub fn cache_file_name(code: &str, url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(segment)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| segment.to_owned());
    let name: String = decoded
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let name = name.trim_matches('.');
    if name.is_empty() {
        return None;
    }
    if name.contains(code) {
        Some(name.to_owned())
    } else {
        Some(format!("{code}_{name}"))
    }
}

async fn is_readable_image(path: &Path) -> bool {
    let path = path.to_owned();
    tokio::task::spawn_blocking(move || {
        image::ImageReader::open(&path)
            .and_then(|reader| reader.with_guessed_format())
            .is_ok_and(|reader| reader.into_dimensions().is_ok())
    })
    .await
    .unwrap_or(false)
}

#[derive(Dbg, Clone)]
pub struct RemoteImageFetcher {
    #[dbg(skip)]
    client: reqwest::Client,
    download_dir: Option<PathBuf>,
    timeout: Duration,
}

impl RemoteImageFetcher {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            download_dir: config.images_download_dir.clone(),
            timeout: config.fetch_timeout(),
        }
    }

    /// Local copy of a remote image, `None` when it cannot be had.
    ///
    /// A cached copy that does not decode is removed and fetched again.
    pub async fn fetch(&self, code: &str, url: &str) -> Option<PathBuf> {
        let Some(dir) = &self.download_dir else {
            warn!(code, url, "No download directory configured, skip remote image");
            warn_row!("no download directory configured for {url}");
            return None;
        };
        let Some(name) = cache_file_name(code, url) else {
            warn!(code, url, "No file name in image url");
            warn_row!("no file name in image url {url}");
            return None;
        };
        let path = dir.join(name);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if is_readable_image(&path).await {
                debug!(code, url, path = %path.display(), "use cached image");
                return Some(path);
            }
            warn!(code, url, path = %path.display(), "Cached image is unreadable, fetch again");
            if let Err(error) = tokio::fs::remove_file(&path).await {
                warn!(%error, path = %path.display(), "Failed to remove cached image");
            }
        }
        match self.download(url, &path).await {
            Ok(()) => {
                debug!(code, url, path = %path.display(), "fetched image");
                Some(path)
            }
            Err(error) => {
                warn!(%error, code, url, "Failed to fetch image");
                warn_row!("{error}");
                None
            }
        }
    }

    async fn download(&self, url: &str, path: &Path) -> Result<(), Error> {
        let parsed = url::Url::parse(url).map_err(|error| Error::InvalidUrl {
            url: url.to_owned(),
            error,
        })?;
        let response = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|error| Error::Transport {
                url: url.to_owned(),
                error,
            })?;
        if !response.status().is_success() {
            return Err(Error::Status {
                url: url.to_owned(),
                code: response.status(),
            });
        }
        let body = response.bytes().await.map_err(|error| Error::Transport {
            url: url.to_owned(),
            error,
        })?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| Error::Write {
                    path: parent.to_owned(),
                    error,
                })?;
        }
        tokio::fs::write(path, &body)
            .await
            .map_err(|error| Error::Write {
                path: path.to_owned(),
                error,
            })
    }
}

//! WebDAV storage backend.
//!
//! Talks to a Nextcloud-style DAV endpoint: PROPFIND for listings, GET for
//! downloads, PUT for uploads. Certificate verification can be switched off
//! for self-signed deployments.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::domain::{MediaItem, MediaKind};

use super::{Storage, StorageError};

/// WebDAV client bound to one user's file root.
pub struct WebdavStorage {
    base_url: Url,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl WebdavStorage {
    /// Create a client for `base_url` (e.g. `https://cloud.example.org`).
    ///
    /// `insecure_tls` disables certificate verification.
    pub fn new(
        base_url: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        insecure_tls: bool,
    ) -> Result<Self, StorageError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url =
            Url::parse(&normalized).map_err(|e| StorageError::Transport(e.to_string()))?;

        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        Ok(Self {
            base_url,
            username: username.into(),
            password: password.into(),
            client,
        })
    }

    /// Full DAV URL for a remote path under the user's file root.
    fn dav_url(&self, remote: &str) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StorageError::Transport("base URL cannot be a base".into()))?;
            segments.pop_if_empty();
            segments.extend(["remote.php", "dav", "files", self.username.as_str()]);
            segments.extend(remote.trim_matches('/').split('/').filter(|s| !s.is_empty()));
        }
        Ok(url)
    }

    fn method(name: &'static str) -> Method {
        // Known-good token, cannot fail.
        Method::from_bytes(name.as_bytes()).unwrap_or(Method::GET)
    }

    async fn propfind(&self, remote: &str, depth: &str) -> Result<reqwest::Response, StorageError> {
        let url = self.dav_url(remote)?;
        let response = self
            .client
            .request(Self::method("PROPFIND"), url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", depth)
            .send()
            .await?;
        Ok(response)
    }
}

/// Decode %XX escapes in an href segment; server responses carry encoded
/// names, while [`WebdavStorage::dav_url`] re-encodes on the way out.
fn percent_decode(raw: &str) -> String {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(byte) = u8::from_str_radix(
                std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""),
                16,
            ) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Extract the href entries of a DAV multistatus body.
fn parse_hrefs(body: &str) -> Result<Vec<String>, StorageError> {
    let doc = roxmltree::Document::parse(body)
        .map_err(|e| StorageError::Transport(format!("bad multistatus response: {e}")))?;

    Ok(doc
        .descendants()
        .filter(|n| n.tag_name().name() == "href")
        .filter_map(|n| n.text())
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl Storage for WebdavStorage {
    fn name(&self) -> &str {
        "webdav"
    }

    async fn list(
        &self,
        folder: &str,
        kind: MediaKind,
        extensions: &[&str],
    ) -> Result<Vec<MediaItem>, StorageError> {
        let response = self.propfind(folder, "1").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(folder.to_string()));
        }
        let response = response.error_for_status()?;
        let body = response.text().await?;

        let folder_trimmed = folder.trim_matches('/');
        let mut items = Vec::new();
        for href in parse_hrefs(&body)? {
            let trimmed = href.trim_matches('/');
            // Skip the collection entry for the folder itself.
            if trimmed.ends_with(folder_trimmed) {
                continue;
            }

            let name = percent_decode(trimmed.rsplit('/').next().unwrap_or_default());
            let lower = name.to_ascii_lowercase();
            if !extensions.iter().any(|ext| lower.ends_with(&format!(".{ext}"))) {
                continue;
            }

            let remote = format!("{}/{}", folder_trimmed, name);
            items.push(MediaItem::new(remote, kind));
        }

        debug!(folder, count = items.len(), "Listed WebDAV folder");
        Ok(items)
    }

    async fn fetch(&self, item: &MediaItem, dest_dir: &Path) -> Result<PathBuf, StorageError> {
        let remote = item.path.to_string_lossy();
        let url = self.dav_url(&remote)?;

        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(remote.into_owned()));
        }
        let mut response = response.error_for_status()?;

        let local = dest_dir.join(item.file_name());
        let mut file = tokio::fs::File::create(&local).await?;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(remote = %remote, local = %local.display(), "Fetched file");
        Ok(local)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), StorageError> {
        let url = self.dav_url(remote)?;
        let bytes = tokio::fs::read(local).await?;

        let response = self
            .client
            .put(url)
            .basic_auth(&self.username, Some(&self.password))
            .body(bytes)
            .send()
            .await?;
        response.error_for_status()?;

        debug!(remote, "Uploaded file");
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let response = self.propfind(path, "0").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        response.error_for_status()?;
        Ok(true)
    }
}

//! Adapter interfaces for external collaborators.
//!
//! Adapters isolate the orchestration core from storage, compositing,
//! chat, and push-notification backends so the executor can be driven
//! against mocks in tests.

pub mod ffmpeg;
pub mod local;
pub mod matrix;
pub mod ntfy;
pub mod webdav;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AssemblyPlan, MediaItem, MediaKind};

pub use ffmpeg::FfmpegCompositor;
pub use local::LocalStorage;
pub use matrix::{DisabledChat, InboundMessage, MatrixClient};
pub use ntfy::{DisabledNotifier, Notice, NtfyNotifier, Priority};
pub use webdav::WebdavStorage;

/// Storage failures: a missing resource is distinguishable from a transport
/// problem so pre-flight can enumerate what is absent.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// File store the build reads media from and writes output to.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// List items under a folder, filtered by extension, tagged with `kind`
    async fn list(
        &self,
        folder: &str,
        kind: MediaKind,
        extensions: &[&str],
    ) -> Result<Vec<MediaItem>, StorageError>;

    /// Copy one item into `dest_dir`, returning the local path
    async fn fetch(&self, item: &MediaItem, dest_dir: &Path) -> Result<PathBuf, StorageError>;

    /// Upload a local file to a destination path
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), StorageError>;

    /// Whether a path (file or folder) exists
    async fn exists(&self, path: &str) -> Result<bool, StorageError>;
}

/// Local copies of fetched media, keyed by their source path.
#[derive(Debug, Default)]
pub struct FetchedMedia {
    paths: HashMap<PathBuf, PathBuf>,
}

impl FetchedMedia {
    pub fn insert(&mut self, item: &MediaItem, local: PathBuf) {
        self.paths.insert(item.path.clone(), local);
    }

    pub fn local_path(&self, item: &MediaItem) -> Option<&Path> {
        self.paths.get(&item.path).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Video compositing backend. Opaque, slow, CPU-bound from the executor's
/// point of view.
#[async_trait]
pub trait Compositor: Send + Sync {
    /// Duration of a video file in seconds
    async fn probe_duration(&self, video: &Path) -> Result<f64>;

    /// Render the plan into `output` using the fetched media
    async fn render(&self, plan: &AssemblyPlan, media: &FetchedMedia, output: &Path) -> Result<()>;
}

/// Outbound chat channel for acknowledgements and build reports.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Send a plain-text message; `html` is an optional formatted variant
    async fn send(&self, text: &str, html: Option<&str>) -> Result<()>;

    /// Whether the channel is configured at all
    fn is_configured(&self) -> bool;
}

/// Fire-and-forget push notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notice: &Notice) -> Result<()>;
}

//! Build execution.
//!
//! Runs one accepted build to completion through the staged lifecycle:
//! `Validating → Fetching → Assembling → Encoding → Uploading → Notifying`.
//! Pre-flight resolves every referenced resource and fails fast with the
//! complete list of missing items before any rendering work starts. A
//! failure at any later stage still attempts a best-effort failure
//! notification without masking the original error.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::adapters::{
    ChatSender, Compositor, FetchedMedia, Notice, Notifier, Priority, Storage, StorageError,
};
use crate::config::{EffectiveConfig, MediaSource};
use crate::domain::{AssemblyPlan, BuildOutcome, BuildStage, MediaItem, MediaKind, ProgressState};

use super::planner::{self, PlanError};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3"];

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing resources: {}", .0.join(", "))]
    ResourceNotFound(Vec<String>),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StorageError> for BuildError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(path) => Self::ResourceNotFound(vec![path]),
            StorageError::Transport(msg) => Self::Transport(msg),
        }
    }
}

/// Shared live-progress cell. The executor is the sole writer; readers take
/// cloned snapshots, ordered by the monotonic `seq`.
#[derive(Clone, Default)]
pub struct ProgressHandle {
    inner: Arc<RwLock<Option<ProgressState>>>,
}

impl ProgressHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current progress, if a build is running.
    pub fn snapshot(&self) -> Option<ProgressState> {
        self.inner.read().expect("progress lock poisoned").clone()
    }

    fn update(&self, stage: BuildStage, fraction: f64, detail: impl Into<String>) {
        let mut guard = self.inner.write().expect("progress lock poisoned");
        let seq = guard.as_ref().map_or(0, |p| p.seq) + 1;
        *guard = Some(ProgressState {
            stage,
            fraction,
            detail: detail.into(),
            seq,
        });
    }

    fn clear(&self) {
        *self.inner.write().expect("progress lock poisoned") = None;
    }
}

/// Executes one build against the external collaborators.
///
/// Media concerns pick their backend independently: images can come from
/// WebDAV while music stays on the local disk. The remote backend is
/// optional; source selectors pointing at it fall back to local storage
/// with a warning when it is absent.
pub struct BuildExecutor {
    local: Arc<dyn Storage>,
    remote: Option<Arc<dyn Storage>>,
    compositor: Arc<dyn Compositor>,
    chat: Arc<dyn ChatSender>,
    notifier: Arc<dyn Notifier>,
    progress: ProgressHandle,

    /// Fixed local output path; when unset the build renders into a scratch
    /// file and relies on the configured upload destination.
    output_filepath: Option<PathBuf>,
}

impl BuildExecutor {
    pub fn new(
        local: Arc<dyn Storage>,
        remote: Option<Arc<dyn Storage>>,
        compositor: Arc<dyn Compositor>,
        chat: Arc<dyn ChatSender>,
        notifier: Arc<dyn Notifier>,
        progress: ProgressHandle,
        output_filepath: Option<PathBuf>,
    ) -> Self {
        Self {
            local,
            remote,
            compositor,
            chat,
            notifier,
            progress,
            output_filepath,
        }
    }

    pub fn progress(&self) -> ProgressHandle {
        self.progress.clone()
    }

    fn storage_for(&self, source: MediaSource) -> &Arc<dyn Storage> {
        match source {
            MediaSource::Webdav => match &self.remote {
                Some(remote) => remote,
                None => {
                    warn!("WebDAV source selected but no remote storage configured, using local");
                    &self.local
                }
            },
            MediaSource::Local => &self.local,
        }
    }

    /// Uploads go to the remote store when one is configured.
    fn upload_storage(&self) -> &Arc<dyn Storage> {
        self.remote.as_ref().unwrap_or(&self.local)
    }

    /// Run one build to its terminal outcome. Never panics and never leaves
    /// the progress cell populated.
    #[instrument(skip(self, config))]
    pub async fn execute(&self, config: &EffectiveConfig) -> BuildOutcome {
        if config.enable_ntfy() {
            self.publish_best_effort(
                Notice::new("Build Started", "Starting slideshow production...")
                    .topic(config.ntfy_topic())
                    .priority(Priority::Low)
                    .tags(&["rocket"]),
            )
            .await;
        }

        let outcome = match self.run_stages(config).await {
            Ok((output, slides)) => {
                info!(output = %output, slides = slides.len(), "Build succeeded");
                BuildOutcome::Success { output, slides }
            }
            Err((stage, err)) => {
                error!(%stage, error = %err, "Build failed");
                BuildOutcome::Failure {
                    stage,
                    reason: err.to_string(),
                }
            }
        };

        self.progress.update(BuildStage::Notifying, 0.5, "Reporting outcome");
        self.notify_outcome(config, &outcome).await;
        self.progress.clear();

        outcome
    }

    async fn run_stages(
        &self,
        config: &EffectiveConfig,
    ) -> Result<(String, Vec<String>), (BuildStage, BuildError)> {
        let stage = BuildStage::Validating;
        self.progress.update(stage, 0.0, "Checking resources");
        let output_path = self
            .preflight(config)
            .await
            .map_err(|e| (stage, e))?;

        self.progress.update(stage, 0.5, "Listing media inventory");
        let inventory = self.gather_inventory(config).await.map_err(|e| (stage, e))?;

        let stage = BuildStage::Fetching;
        let workdir = tempfile::tempdir()
            .map_err(|e| (stage, BuildError::Transport(e.to_string())))?;
        let media = self
            .fetch_inventory(config, &inventory, workdir.path())
            .await
            .map_err(|e| (stage, e))?;

        let stage = BuildStage::Assembling;
        self.progress.update(stage, 0.0, "Computing assembly plan");
        let plan = self
            .assemble(config, &inventory, &media)
            .await
            .map_err(|e| (stage, e))?;
        let slides = plan.slide_names();

        let stage = BuildStage::Encoding;
        self.progress.update(
            stage,
            0.0,
            format!("Rendering {:.0}s video", plan.total_seconds),
        );
        self.compositor
            .render(&plan, &media, &output_path)
            .await
            .map_err(|e| (stage, BuildError::Other(e)))?;

        let stage = BuildStage::Uploading;
        let destination = if let Some(remote) = config.upload_path() {
            self.progress.update(stage, 0.0, format!("Uploading to {remote}"));
            self.upload_storage()
                .upload(&output_path, &remote)
                .await
                .map_err(|e| (stage, e.into()))?;
            remote
        } else {
            output_path.display().to_string()
        };

        Ok((destination, slides))
    }

    /// Compute the plan a build would run with right now, without rendering
    /// or uploading anything. Backs the `plan` CLI subcommand.
    pub async fn plan_preview(&self, config: &EffectiveConfig) -> Result<AssemblyPlan, BuildError> {
        let inventory = self.gather_inventory(config).await?;

        let append_seconds = match inventory.iter().find(|i| i.kind == MediaKind::AppendVideo) {
            Some(item) => {
                let workdir = tempfile::tempdir()
                    .map_err(|e| BuildError::Transport(e.to_string()))?;
                let local = self
                    .storage_for(config.append_video_source())
                    .fetch(item, workdir.path())
                    .await?;
                Some(self.compositor.probe_duration(&local).await?)
            }
            None => None,
        };

        let mut rng = StdRng::from_entropy();
        Ok(planner::plan(&inventory, config, append_seconds, &mut rng)?)
    }

    /// Resolve every externally referenced path before doing expensive work.
    /// All missing resources are reported together.
    async fn preflight(&self, config: &EffectiveConfig) -> Result<PathBuf, BuildError> {
        let mut missing = Vec::new();

        let image_path = config.image_path();
        if !self
            .storage_for(config.image_source())
            .exists(&image_path)
            .await?
        {
            missing.push(format!("image folder '{image_path}'"));
        }

        if let Some(append) = config.append_video_path() {
            if !self
                .storage_for(config.append_video_source())
                .exists(&append)
                .await?
            {
                missing.push(format!("append video '{append}'"));
            }
        }

        let upload = config.upload_path();
        if let Some(remote) = &upload {
            let parent = match remote.trim_end_matches('/').rsplit_once('/') {
                Some((parent, _)) if !parent.is_empty() => parent.to_string(),
                _ => "/".to_string(),
            };
            if !self.upload_storage().exists(&parent).await? {
                missing.push(format!("upload destination folder '{parent}'"));
            }
        }

        if !missing.is_empty() {
            return Err(BuildError::ResourceNotFound(missing));
        }

        match (&self.output_filepath, upload) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(_)) => {
                // Scratch output, discarded after the upload.
                let dir = std::env::temp_dir();
                Ok(dir.join(format!("slidecast-{}.mp4", uuid::Uuid::new_v4())))
            }
            (None, None) => Err(BuildError::Other(anyhow::anyhow!(
                "no OUTPUT_FILEPATH and no UPLOAD_PATH configured"
            ))),
        }
    }

    async fn gather_inventory(
        &self,
        config: &EffectiveConfig,
    ) -> Result<Vec<MediaItem>, BuildError> {
        let mut inventory = self
            .storage_for(config.image_source())
            .list(&config.image_path(), MediaKind::Image, IMAGE_EXTENSIONS)
            .await?;

        // Background music is optional: a missing folder just means silence.
        match self
            .storage_for(config.music_source())
            .list(&config.music_path(), MediaKind::Audio, AUDIO_EXTENSIONS)
            .await
        {
            Ok(audio) => inventory.extend(audio),
            Err(StorageError::NotFound(path)) => {
                warn!(path = %path, "Music folder not found, building without audio")
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(append) = config.append_video_path() {
            inventory.push(MediaItem::new(append, MediaKind::AppendVideo));
        }

        Ok(inventory)
    }

    async fn fetch_inventory(
        &self,
        config: &EffectiveConfig,
        inventory: &[MediaItem],
        workdir: &std::path::Path,
    ) -> Result<FetchedMedia, BuildError> {
        let mut media = FetchedMedia::default();
        let total = inventory.len().max(1);

        for (index, item) in inventory.iter().enumerate() {
            self.progress.update(
                BuildStage::Fetching,
                index as f64 / total as f64,
                format!("Fetching {}", item.file_name()),
            );
            let storage = match item.kind {
                MediaKind::Image => self.storage_for(config.image_source()),
                MediaKind::Audio => self.storage_for(config.music_source()),
                MediaKind::AppendVideo => self.storage_for(config.append_video_source()),
            };
            let local = storage.fetch(item, workdir).await?;
            media.insert(item, local);
        }

        Ok(media)
    }

    async fn assemble(
        &self,
        config: &EffectiveConfig,
        inventory: &[MediaItem],
        media: &FetchedMedia,
    ) -> Result<AssemblyPlan, BuildError> {
        let append_seconds = match inventory.iter().find(|i| i.kind == MediaKind::AppendVideo) {
            Some(item) => {
                let local = media
                    .local_path(item)
                    .ok_or_else(|| BuildError::ResourceNotFound(vec![item.file_name()]))?;
                Some(self.compositor.probe_duration(local).await?)
            }
            None => None,
        };

        let mut rng = StdRng::from_entropy();
        Ok(planner::plan(inventory, config, append_seconds, &mut rng)?)
    }

    /// Report the terminal outcome over chat and push. Both channels are
    /// best-effort; a send failure is logged and swallowed.
    async fn notify_outcome(&self, config: &EffectiveConfig, outcome: &BuildOutcome) {
        match outcome {
            BuildOutcome::Success { output, slides } => {
                if self.chat.is_configured() {
                    let list = slides
                        .iter()
                        .map(|s| format!("- {s}"))
                        .collect::<Vec<_>>()
                        .join("\n");
                    let text = format!(
                        "✅ Slideshow produced successfully!\nVideo: {output}\nIncluded slides:\n{list}"
                    );
                    let items: String = slides.iter().map(|s| format!("<li>{s}</li>")).collect();
                    let html = format!(
                        "<h3>✅ Slideshow produced successfully!</h3>\
                         <p><b>Video:</b> {output}</p><ul>{items}</ul>"
                    );
                    if let Err(e) = self.chat.send(&text, Some(&html)).await {
                        warn!(error = %e, "Success message could not be sent");
                    }
                }
                if config.enable_ntfy() {
                    self.publish_best_effort(
                        Notice::new(
                            "Production Complete",
                            format!("Slideshow complete. {} slides included.", slides.len()),
                        )
                        .topic(config.ntfy_topic())
                        .tags(&["trophy"]),
                    )
                    .await;
                }
            }
            BuildOutcome::Failure { stage, reason } => {
                if self.chat.is_configured() {
                    let text =
                        format!("❌ Slideshow production failed!\nStage: {stage}\nError: {reason}");
                    if let Err(e) = self.chat.send(&text, None).await {
                        warn!(error = %e, "Failure message could not be sent");
                    }
                }
                if config.enable_ntfy() {
                    self.publish_best_effort(
                        Notice::new("Build Failed", format!("{stage}: {reason}"))
                            .topic(config.ntfy_topic())
                            .priority(Priority::High)
                            .tags(&["x", "boom"]),
                    )
                    .await;
                }
            }
        }
    }

    async fn publish_best_effort(&self, notice: Notice) {
        if let Err(e) = self.notifier.publish(&notice).await {
            warn!(error = %e, title = %notice.title, "Notification publish failed");
        }
    }
}

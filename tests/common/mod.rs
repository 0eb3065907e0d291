//! Shared fixtures and mock collaborators for integration tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use slidecast::adapters::{
    ChatSender, Compositor, FetchedMedia, LocalStorage, Notice, Notifier, Storage,
};
use slidecast::config::{ConfigResolver, EnvSource, OverrideStore};
use slidecast::core::{BuildExecutor, Orchestrator, ProgressHandle};
use slidecast::domain::AssemblyPlan;
use slidecast::health::HealthMonitor;

/// Compositor mock counting calls; `render` can be gated on a semaphore so
/// tests can hold a build mid-flight.
pub struct MockCompositor {
    pub probe_calls: AtomicUsize,
    pub render_calls: AtomicUsize,
    pub probe_result: f64,
    pub gate: Option<Arc<Semaphore>>,
}

impl MockCompositor {
    pub fn new() -> Self {
        Self {
            probe_calls: AtomicUsize::new(0),
            render_calls: AtomicUsize::new(0),
            probe_result: 30.0,
            gate: None,
        }
    }

    /// Gated variant: `render` blocks until the test releases a permit.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn renders(&self) -> usize {
        self.render_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compositor for MockCompositor {
    async fn probe_duration(&self, _video: &Path) -> Result<f64> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.probe_result)
    }

    async fn render(&self, _plan: &AssemblyPlan, _media: &FetchedMedia, output: &Path) -> Result<()> {
        self.render_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await?;
            permit.forget();
        }
        tokio::fs::write(output, b"rendered").await?;
        Ok(())
    }
}

/// Chat mock recording every outbound message.
pub struct RecordingChat {
    pub sent: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSender for RecordingChat {
    async fn send(&self, text: &str, _html: Option<&str>) -> Result<()> {
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Notifier mock recording published notices.
pub struct RecordingNotifier {
    pub published: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, notice: &Notice) -> Result<()> {
        self.published.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// A wired-up service against a temp directory with three numbered images.
pub struct Fixture {
    pub dir: TempDir,
    pub resolver: Arc<ConfigResolver>,
    pub compositor: Arc<MockCompositor>,
    pub chat: Arc<RecordingChat>,
    pub notifier: Arc<RecordingNotifier>,
    pub executor: Arc<BuildExecutor>,
    pub orchestrator: Arc<Orchestrator>,
}

pub fn fixture(extra_env: &[(&str, &str)], compositor: MockCompositor) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("images");
    std::fs::create_dir_all(&images).unwrap();
    for name in ["1.jpg", "2.jpg", "3.jpg"] {
        std::fs::write(images.join(name), b"jpeg").unwrap();
    }

    let mut env: Vec<(String, String)> = vec![
        ("TARGET_VIDEO_DURATION".into(), "60".into()),
        ("IMAGE_DURATION".into(), "5".into()),
        ("MIN_SLIDE_SECONDS".into(), "1".into()),
    ];
    env.extend(
        extra_env
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string())),
    );

    let resolver = Arc::new(ConfigResolver::new(
        OverrideStore::open_in_memory().unwrap(),
        EnvSource::from_map(env.into_iter().collect()),
    ));

    let compositor = Arc::new(compositor);
    let chat = Arc::new(RecordingChat::new());
    let notifier = Arc::new(RecordingNotifier::new());

    let executor = Arc::new(BuildExecutor::new(
        Arc::new(LocalStorage::new(dir.path())),
        None,
        compositor.clone(),
        chat.clone(),
        notifier.clone(),
        ProgressHandle::new(),
        Some(dir.path().join("out.mp4")),
    ));

    let health = Arc::new(HealthMonitor::new(dir.path().join("heartbeat")));
    let orchestrator = Arc::new(Orchestrator::new(
        executor.clone(),
        resolver.clone(),
        health,
    ));

    Fixture {
        dir,
        resolver,
        compositor,
        chat,
        notifier,
        executor,
        orchestrator,
    }
}

/// Poll until the orchestrator goes idle or the timeout elapses.
pub async fn wait_until_idle(orchestrator: &Orchestrator, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while orchestrator.is_running() {
        if tokio::time::Instant::now() > deadline {
            panic!("orchestrator still running after {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

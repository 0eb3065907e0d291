//! Command-line interface for slidecast.
//!
//! `daemon` runs the long-lived service (scheduler, chat listener,
//! heartbeat); `build` and `plan` are one-shot operator tools; `config`,
//! `set`, and `defaults` manage the override store without going through
//! chat.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::adapters::{
    ChatSender, DisabledChat, DisabledNotifier, FfmpegCompositor, LocalStorage, MatrixClient,
    Notifier, NtfyNotifier, Storage, WebdavStorage,
};
use crate::bot::CommandDispatcher;
use crate::config::{
    data_dir, ConfigKey, ConfigResolver, Endpoints, EnvSource, OverrideStore,
};
use crate::core::{BuildExecutor, Orchestrator, ProgressHandle};
use crate::domain::BuildOutcome;
use crate::health::HealthMonitor;

/// slidecast - scheduled slideshow build orchestrator
#[derive(Parser, Debug)]
#[command(name = "slidecast")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the long-lived daemon: scheduler, chat listener, heartbeat
    Daemon,

    /// Run a single build right now and exit
    Build,

    /// Print the assembly plan a build would use, without rendering
    Plan,

    /// Show the resolved configuration with value origins
    Config,

    /// Set a configuration override (same surface as the chat `!set`)
    Set {
        /// Setting name, e.g. IMAGE_DURATION
        key: String,

        /// New value
        value: Vec<String>,
    },

    /// Clear every configuration override
    Defaults,
}

/// Everything a build needs, wired from environment and the override store.
struct Runtime {
    resolver: Arc<ConfigResolver>,
    endpoints: Endpoints,
    executor: Arc<BuildExecutor>,
    matrix: Option<Arc<MatrixClient>>,
    chat: Arc<dyn ChatSender>,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Daemon => run_daemon().await,
            Commands::Build => run_build().await,
            Commands::Plan => run_plan().await,
            Commands::Config => show_config(),
            Commands::Set { key, value } => set_override(&key, &value.join(" ")),
            Commands::Defaults => clear_overrides(),
        }
    }
}

fn open_resolver() -> Result<Arc<ConfigResolver>> {
    let store = OverrideStore::open(&data_dir().join("settings.db"))?;
    Ok(Arc::new(ConfigResolver::new(
        store,
        EnvSource::from_process(),
    )))
}

fn build_runtime() -> Result<Runtime> {
    let env = EnvSource::from_process();
    let endpoints = Endpoints::from_env(&env);
    let resolver = open_resolver()?;

    let local: Arc<dyn Storage> = Arc::new(LocalStorage::new(
        std::env::current_dir().context("Cannot determine working directory")?,
    ));

    let remote: Option<Arc<dyn Storage>> = match (&endpoints.storage_url, &endpoints.storage_username)
    {
        (Some(url), Some(user)) => {
            let webdav = WebdavStorage::new(
                url,
                user.clone(),
                endpoints.storage_password.clone().unwrap_or_default(),
                endpoints.storage_insecure_tls,
            )
            .context("Bad storage endpoint configuration")?;
            Some(Arc::new(webdav))
        }
        _ => None,
    };

    let matrix = match (
        &endpoints.matrix_homeserver,
        &endpoints.matrix_token,
        &endpoints.matrix_room,
    ) {
        (Some(homeserver), Some(token), Some(room)) => Some(Arc::new(MatrixClient::new(
            homeserver.clone(),
            token.clone(),
            room.clone(),
            endpoints.matrix_user_id.clone(),
        ))),
        _ => None,
    };
    let chat: Arc<dyn ChatSender> = match &matrix {
        Some(client) => client.clone(),
        None => Arc::new(DisabledChat),
    };

    let notifier: Arc<dyn Notifier> = match &endpoints.ntfy_url {
        Some(url) => Arc::new(NtfyNotifier::new(url.clone(), endpoints.ntfy_token.clone())),
        None => Arc::new(DisabledNotifier),
    };

    let executor = Arc::new(BuildExecutor::new(
        local,
        remote,
        Arc::new(FfmpegCompositor::new()),
        chat.clone(),
        notifier,
        ProgressHandle::new(),
        endpoints.output_filepath.clone(),
    ));

    Ok(Runtime {
        resolver,
        endpoints,
        executor,
        matrix,
        chat,
    })
}

fn heartbeat_path() -> PathBuf {
    std::env::var("HEARTBEAT_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| HealthMonitor::default_path())
}

async fn run_daemon() -> Result<()> {
    let runtime = build_runtime()?;
    let health = Arc::new(HealthMonitor::new(heartbeat_path()));
    health.touch();

    let orchestrator = Arc::new(Orchestrator::new(
        runtime.executor.clone(),
        runtime.resolver.clone(),
        health,
    ));

    tokio::spawn(Arc::clone(&orchestrator).run_timer());
    tokio::spawn(Arc::clone(&orchestrator).run_heartbeat());

    match &runtime.matrix {
        Some(matrix) => {
            let (tx, rx) = mpsc::channel(64);
            let listener = Arc::clone(matrix);
            tokio::spawn(async move { listener.listen(tx).await });

            let dispatcher = CommandDispatcher::new(
                orchestrator,
                runtime.resolver,
                runtime.chat.clone(),
                runtime.endpoints.allowed_senders.clone(),
            );
            tokio::spawn(dispatcher.run(rx));

            if let Err(e) = runtime
                .chat
                .send("🤖 Slideshow bot is starting and listening for commands...", None)
                .await
            {
                warn!(error = %e, "Startup announcement failed");
            }
        }
        None => info!("Chat not configured, running in scheduler-only mode"),
    }

    info!("Daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for shutdown signal")?;
    info!("Shutting down");
    Ok(())
}

async fn run_build() -> Result<()> {
    let runtime = build_runtime()?;
    let config = runtime.resolver.resolve_all()?;

    match runtime.executor.execute(&config).await {
        BuildOutcome::Success { output, slides } => {
            println!("Build succeeded: {output} ({} slides)", slides.len());
            Ok(())
        }
        BuildOutcome::Failure { stage, reason } => {
            anyhow::bail!("build failed at {stage}: {reason}")
        }
    }
}

async fn run_plan() -> Result<()> {
    let runtime = build_runtime()?;
    let config = runtime.resolver.resolve_all()?;

    let plan = runtime.executor.plan_preview(&config).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);

    eprintln!(
        "\n{} slides x {} repeats, {:.1}s planned of {:.1}s target",
        plan.slides.len(),
        plan.repeat_count,
        plan.planned_seconds(),
        plan.total_seconds,
    );
    Ok(())
}

fn show_config() -> Result<()> {
    let resolver = open_resolver()?;
    for key in ConfigKey::ALL {
        let (value, source) = resolver.resolve(key)?;
        let shown = if value.is_empty() { "(unset)" } else { value.as_str() };
        println!("{:<26} = {:<24} [{}]", key.name(), shown, source);
    }
    Ok(())
}

fn set_override(key: &str, value: &str) -> Result<()> {
    let resolver = open_resolver()?;
    let key = resolver.set_override(key, value)?;
    println!("Set {key} = {value} (takes effect on the next build)");
    Ok(())
}

fn clear_overrides() -> Result<()> {
    let resolver = open_resolver()?;
    let count = resolver.clear_all()?;
    println!("Cleared {count} override(s)");
    Ok(())
}

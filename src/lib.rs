//! slidecast - Scheduled slideshow build orchestrator
//!
//! Turns a folder of still images and a music track into a single video on a
//! cron schedule, controllable from a chat room while it runs.
//!
//! # Architecture
//!
//! The control plane does the heavy lifting:
//! - Configuration resolves through three layers (override store,
//!   environment, defaults) into one immutable snapshot per build
//! - A pure planner turns the media inventory into an exact-duration
//!   timeline
//! - Builds are single-flight: one at a time, extra triggers rejected
//! - Progress streams out through snapshots so `!status` answers mid-build
//!
//! # Modules
//!
//! - `adapters`: External collaborators (storage, ffmpeg, Matrix, ntfy)
//! - `core`: Orchestration logic (Planner, Executor, Orchestrator)
//! - `config`: Layered configuration and the override store
//! - `bot`: Chat command dispatch and formatting
//! - `domain`: Data structures (MediaItem, AssemblyPlan, BuildRecord)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the daemon (scheduler + chat listener)
//! slidecast daemon
//!
//! # One-shot build
//! slidecast build
//!
//! # Inspect the plan a build would use
//! slidecast plan
//! ```

pub mod adapters;
pub mod bot;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod health;
pub mod schedule;

// Re-export main types at crate root for convenience
pub use config::{ConfigKey, ConfigResolver, EffectiveConfig, EnvSource, OverrideStore, Source};
pub use core::{BuildExecutor, Orchestrator, PlanError, ProgressHandle, Submission};
pub use domain::{AssemblyPlan, BuildOutcome, BuildRecord, BuildStage, MediaItem, MediaKind};
pub use health::HealthMonitor;

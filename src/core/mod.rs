//! Core orchestration logic.
//!
//! This module contains:
//! - Planner: Pure assembly-plan computation
//! - Executor: Staged build execution against the collaborators
//! - Orchestrator: Single-flight scheduling, timer, and liveness

pub mod executor;
pub mod orchestrator;
pub mod planner;

// Re-export commonly used types
pub use executor::{BuildError, BuildExecutor, ProgressHandle};
pub use orchestrator::{Orchestrator, RejectReason, StatusSnapshot, Submission};
pub use planner::{plan, PlanError, DEFAULT_FPS};

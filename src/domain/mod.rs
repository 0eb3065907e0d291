//! Domain types for the slidecast orchestrator.
//!
//! This module contains the core data structures:
//! - Media: Inventory items and their ordering
//! - Plan: The computed timeline for one build
//! - Build: Build records, stages, and live progress

pub mod build;
pub mod media;
pub mod plan;

// Re-export commonly used types
pub use build::{BuildOutcome, BuildRecord, BuildStage, ProgressState, TriggerSource};
pub use media::{sort_items, sort_key, MediaItem, MediaKind};
pub use plan::{AppendPlan, AssemblyPlan, AudioPlan, OverlayPlan, OverlayPosition, Slide};

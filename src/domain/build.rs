//! Build lifecycle state: records, stages, and live progress.
//!
//! A `BuildRecord` covers one build attempt from acceptance to outcome. The
//! orchestrator owns the record for its lifetime and retains only the most
//! recent one for status reporting. `ProgressState` is the executor's live
//! view into the running build, read by the command dispatcher as snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What caused a build to be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Stages a build moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
    Validating,
    Fetching,
    Assembling,
    Encoding,
    Uploading,
    Notifying,
}

impl std::fmt::Display for BuildStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validating => write!(f, "Validating"),
            Self::Fetching => write!(f, "Fetching"),
            Self::Assembling => write!(f, "Assembling"),
            Self::Encoding => write!(f, "Encoding"),
            Self::Uploading => write!(f, "Uploading"),
            Self::Notifying => write!(f, "Notifying"),
        }
    }
}

/// Terminal outcome of a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum BuildOutcome {
    Success {
        /// Where the finished video ended up
        output: String,

        /// Slide file names included, in play order
        slides: Vec<String>,
    },
    Failure {
        /// Stage the build failed in
        stage: BuildStage,

        reason: String,
    },
}

/// One build attempt's lifecycle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub id: Uuid,

    pub trigger: TriggerSource,

    pub started_at: DateTime<Utc>,

    pub ended_at: Option<DateTime<Utc>>,

    /// Outcome once the build has finished
    pub outcome: Option<BuildOutcome>,
}

impl BuildRecord {
    /// Create a record for a freshly accepted build.
    pub fn accepted(trigger: TriggerSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger,
            started_at: Utc::now(),
            ended_at: None,
            outcome: None,
        }
    }

    /// Fold a terminal outcome into the record.
    pub fn finish(&mut self, outcome: BuildOutcome) {
        self.ended_at = Some(Utc::now());
        self.outcome = Some(outcome);
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, Some(BuildOutcome::Success { .. }))
    }
}

/// Live progress of the running build.
///
/// Written only by the executor; everyone else reads cloned snapshots. The
/// `seq` counter increases with every update so a reader can tell which of
/// two snapshots is newer regardless of stage ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub stage: BuildStage,

    /// Fractional completion within the stage, 0.0..=1.0
    pub fraction: f64,

    /// Human-readable detail line
    pub detail: String,

    /// Monotonic update counter
    pub seq: u64,
}

impl ProgressState {
    /// Completion as a 0..=100 percentage, for display.
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_finish_sets_outcome_and_end() {
        let mut record = BuildRecord::accepted(TriggerSource::Manual);
        assert!(record.outcome.is_none());

        record.finish(BuildOutcome::Success {
            output: "Videos/week.mp4".into(),
            slides: vec!["1.jpg".into()],
        });

        assert!(record.succeeded());
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn test_stage_order_matches_lifecycle() {
        assert!(BuildStage::Validating < BuildStage::Fetching);
        assert!(BuildStage::Encoding < BuildStage::Uploading);
        assert!(BuildStage::Uploading < BuildStage::Notifying);
    }

    #[test]
    fn test_progress_percent_clamps() {
        let progress = ProgressState {
            stage: BuildStage::Encoding,
            fraction: 1.7,
            detail: String::new(),
            seq: 3,
        };
        assert_eq!(progress.percent(), 100);
    }
}

//! Single-flight build orchestration.
//!
//! The orchestrator owns the only piece of mutual-exclusion state in the
//! system: whether a build is running. Triggers from the timer and the
//! command channel funnel through [`Orchestrator::submit`]; a second trigger
//! while a build is in flight is rejected immediately, never queued. The
//! accepted build runs on its own task so the command channel stays
//! responsive, and its outcome folds back into `Idle` with the record
//! retained for status reporting.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::ConfigResolver;
use crate::domain::{BuildOutcome, BuildRecord, ProgressState, TriggerSource};
use crate::health::{HealthMonitor, HEARTBEAT_INTERVAL_SECS};
use crate::schedule;

use super::executor::BuildExecutor;

/// Result of a trigger submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Accepted(Uuid),
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    AlreadyRunning,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyRunning => write!(f, "a build is already running"),
        }
    }
}

/// Flight state: at most one build may be `Running` process-wide.
enum FlightState {
    Idle,
    Running(BuildRecord),
}

/// Point-in-time view for status rendering. Copies, never aliases.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub running: Option<BuildRecord>,
    pub progress: Option<ProgressState>,
    pub last_build: Option<BuildRecord>,
    pub next_scheduled: Option<DateTime<Utc>>,
}

/// Serializes build execution and owns the timer and liveness tasks.
pub struct Orchestrator {
    executor: Arc<BuildExecutor>,
    resolver: Arc<ConfigResolver>,
    health: Arc<HealthMonitor>,
    state: Mutex<FlightState>,
    last_build: Mutex<Option<BuildRecord>>,
}

impl Orchestrator {
    pub fn new(
        executor: Arc<BuildExecutor>,
        resolver: Arc<ConfigResolver>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            executor,
            resolver,
            health,
            state: Mutex::new(FlightState::Idle),
            last_build: Mutex::new(None),
        }
    }

    /// Submit a build trigger. Non-blocking: either the build is accepted
    /// and spawned, or the caller learns immediately that one is running.
    #[instrument(skip(self))]
    pub fn submit(self: &Arc<Self>, trigger: TriggerSource) -> Submission {
        let record = {
            let mut state = self.state.lock().expect("flight state poisoned");
            if let FlightState::Running(active) = &*state {
                info!(active = %active.id, %trigger, "Trigger rejected, build in flight");
                return Submission::Rejected(RejectReason::AlreadyRunning);
            }
            let record = BuildRecord::accepted(trigger);
            *state = FlightState::Running(record.clone());
            record
        };

        let id = record.id;
        info!(build = %id, %trigger, "Build accepted");

        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator.run_build(record).await;
        });

        Submission::Accepted(id)
    }

    /// Execute the accepted build and fold the outcome back into `Idle`.
    async fn run_build(&self, mut record: BuildRecord) {
        let outcome = match self.resolver.resolve_all() {
            Ok(config) => self.executor.execute(&config).await,
            Err(e) => {
                error!(error = %e, "Configuration could not be resolved");
                BuildOutcome::Failure {
                    stage: crate::domain::BuildStage::Validating,
                    reason: format!("configuration error: {e}"),
                }
            }
        };

        if matches!(outcome, BuildOutcome::Success { .. }) {
            self.health.mark_success();
        }
        record.finish(outcome);

        *self.last_build.lock().expect("last build poisoned") = Some(record);
        *self.state.lock().expect("flight state poisoned") = FlightState::Idle;
    }

    /// Whether a build is currently running.
    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().expect("flight state poisoned"),
            FlightState::Running(_)
        )
    }

    /// Copy out the current state for rendering.
    pub fn status(&self) -> StatusSnapshot {
        let running = match &*self.state.lock().expect("flight state poisoned") {
            FlightState::Running(record) => Some(record.clone()),
            FlightState::Idle => None,
        };

        let next_scheduled = self
            .resolver
            .resolve_all()
            .ok()
            .and_then(|config| schedule::next_fire(config.cron_schedule(), Utc::now()).ok());

        StatusSnapshot {
            running,
            progress: self.executor.progress().snapshot(),
            last_build: self.last_build.lock().expect("last build poisoned").clone(),
            next_scheduled,
        }
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    /// Timer task: fire `submit(Scheduled)` per the configured cron
    /// expression. The expression is re-resolved every cycle so a runtime
    /// override takes effect without a restart; an unparseable expression
    /// falls back to the default schedule.
    pub async fn run_timer(self: Arc<Self>) {
        info!("Scheduler timer active");
        loop {
            let expr = match self.resolver.resolve_all() {
                Ok(config) => config.cron_schedule().to_string(),
                Err(e) => {
                    error!(error = %e, "Cannot resolve schedule, retrying shortly");
                    tokio::time::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
                    continue;
                }
            };

            let now = Utc::now();
            let next = match schedule::next_fire(&expr, now) {
                Ok(next) => next,
                Err(e) => {
                    warn!(expr = %expr, error = %e, "Bad schedule expression, using fallback");
                    match schedule::next_fire(schedule::FALLBACK_SCHEDULE, now) {
                        Ok(next) => next,
                        Err(e) => {
                            error!(error = %e, "Fallback schedule unusable");
                            tokio::time::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
                            continue;
                        }
                    }
                }
            };

            let wait = (next - now).num_seconds().max(0) as u64;
            if wait > HEARTBEAT_INTERVAL_SECS {
                // Nap in short stretches so schedule overrides apply soon.
                tokio::time::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS)).await;
                continue;
            }

            tokio::time::sleep(Duration::from_secs(wait)).await;
            info!(fired_at = %next, "Schedule fired");
            self.submit(TriggerSource::Scheduled);

            // Step past the fire time before recomputing.
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Liveness task: touch the heartbeat file on a fixed interval,
    /// independent of build activity. Honors the ENABLE_HEARTBEAT toggle on
    /// every tick.
    pub async fn run_heartbeat(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let enabled = self
                .resolver
                .resolve_all()
                .map(|config| config.enable_heartbeat())
                .unwrap_or(true);
            if enabled {
                self.health.touch();
            }
        }
    }
}

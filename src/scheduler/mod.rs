//! Periodic evaluation scheduling
//!
//! A single periodic job exists exactly while at least one geofence is armed.
//! The host decides when the job actually runs; ticks may be late or
//! coalesced, which is fine because every tick re-reads the store.

pub mod tokio_scheduler;

pub use tokio_scheduler::TokioScheduler;

use crate::models::Geofence;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Identifier of the geofence evaluation job
pub const EVALUATION_JOB_ID: &str = "geofence-evaluation";

/// Shortest interval hosts allow for periodic background work
pub const MIN_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Work run on every tick
pub type TickTask = Arc<dyn Fn() + Send + Sync>;

/// Errors that can occur while talking to the scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Scheduler lock poisoned")]
    Poisoned,
}

/// Trait for host schedulers
pub trait PeriodicScheduler: Send + Sync {
    /// Register a periodic job, replacing any job with the same id
    fn register_periodic(
        &self,
        job_id: &str,
        interval: Duration,
        task: TickTask,
    ) -> Result<(), SchedulerError>;

    /// Cancel a job; cancelling an unknown job is not an error
    fn cancel(&self, job_id: &str) -> Result<(), SchedulerError>;

    fn is_registered(&self, job_id: &str) -> bool;
}

/// What a sync call changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Registered,
    Cancelled,
    Unchanged,
}

/// Keeps the evaluation job in step with the armed geofences
pub struct SchedulerAdapter {
    scheduler: Arc<dyn PeriodicScheduler>,
    interval: Duration,
    task: TickTask,
}

impl SchedulerAdapter {
    /// Create an adapter; intervals below [`MIN_INTERVAL`] are raised to it
    pub fn new(scheduler: Arc<dyn PeriodicScheduler>, interval: Duration, task: TickTask) -> Self {
        let interval = if interval < MIN_INTERVAL {
            log::warn!(
                "Evaluation interval {:?} is below the {:?} floor, using the floor",
                interval,
                MIN_INTERVAL
            );
            MIN_INTERVAL
        } else {
            interval
        };

        SchedulerAdapter {
            scheduler,
            interval,
            task,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Register or cancel the job to match the current geofence set
    pub fn sync(&self, geofences: &[Geofence]) -> Result<SyncAction, SchedulerError> {
        let has_armed = geofences.iter().any(|g| g.armed);
        let registered = self.scheduler.is_registered(EVALUATION_JOB_ID);

        match (has_armed, registered) {
            (true, false) => {
                self.scheduler.register_periodic(
                    EVALUATION_JOB_ID,
                    self.interval,
                    Arc::clone(&self.task),
                )?;
                log::info!(
                    "Registered periodic evaluation every {} min",
                    self.interval.as_secs() / 60
                );
                Ok(SyncAction::Registered)
            }
            (false, true) => {
                self.scheduler.cancel(EVALUATION_JOB_ID)?;
                log::info!("No armed geofences, cancelled periodic evaluation");
                Ok(SyncAction::Cancelled)
            }
            _ => Ok(SyncAction::Unchanged),
        }
    }

    /// Cancel the job regardless of geofence state
    pub fn shutdown(&self) -> Result<(), SchedulerError> {
        self.scheduler.cancel(EVALUATION_JOB_ID)
    }
}

//! In-process scheduler backed by tokio timers

use super::{PeriodicScheduler, SchedulerError, TickTask};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs periodic jobs as tokio tasks
///
/// Each tick runs on the blocking pool since evaluation does file and
/// database I/O. A tick that panics is logged and the job keeps going.
pub struct TokioScheduler {
    handle: Handle,
    jobs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TokioScheduler {
    /// Create a scheduler on the current tokio runtime
    pub fn new() -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|e| SchedulerError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(handle))
    }

    pub fn with_handle(handle: Handle) -> Self {
        TokioScheduler {
            handle,
            jobs: Mutex::new(HashMap::new()),
        }
    }
}

impl PeriodicScheduler for TokioScheduler {
    fn register_periodic(
        &self,
        job_id: &str,
        interval: Duration,
        task: TickTask,
    ) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().map_err(|_| SchedulerError::Poisoned)?;
        if let Some(previous) = jobs.remove(job_id) {
            log::debug!("Replacing job {}", job_id);
            previous.abort();
        }

        let name = job_id.to_string();
        let join = self.handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Late ticks run once, then the cadence restarts from there
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                log::debug!("Job {} firing", name);
                let task = task.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || task()).await {
                    log::error!("Job {} tick failed: {}", name, e);
                }
            }
        });

        jobs.insert(job_id.to_string(), join);
        Ok(())
    }

    fn cancel(&self, job_id: &str) -> Result<(), SchedulerError> {
        let mut jobs = self.jobs.lock().map_err(|_| SchedulerError::Poisoned)?;
        if let Some(job) = jobs.remove(job_id) {
            job.abort();
            log::debug!("Cancelled job {}", job_id);
        }
        Ok(())
    }

    fn is_registered(&self, job_id: &str) -> bool {
        self.jobs
            .lock()
            .map(|jobs| jobs.get(job_id).is_some_and(|job| !job.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        if let Ok(jobs) = self.jobs.get_mut() {
            for (_, job) in jobs.drain() {
                job.abort();
            }
        }
    }
}

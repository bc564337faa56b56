pub mod memory;
pub mod queue;
pub mod worker;

use crate::error::AppError;
use crate::model::{JobHandle, ReminderPayload, Task, TaskUpdate};
use crate::storage::TaskStore;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

pub use memory::MemoryJobRunner;
pub use queue::FileJobQueue;
pub use worker::{FireOutcome, ReminderWorker};

pub const DEFAULT_REMINDER_LEAD: Duration = Duration::days(1);

/// A delayed job as seen by whoever executes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub handle: JobHandle,
    pub payload: ReminderPayload,
    #[serde(with = "time::serde::rfc3339")]
    pub fire_at: OffsetDateTime,
}

pub trait JobRunner: Send + Sync {
    fn submit(
        &self,
        payload: ReminderPayload,
        fire_at: OffsetDateTime,
    ) -> Result<JobHandle, AppError>;

    /// Requests the job be dropped. Returns once the request is recorded,
    /// not once a running job has stopped.
    fn abort(&self, handle: &JobHandle) -> Result<(), AppError>;
}

/// Where a worker pulls jobs that are ready to run.
pub trait JobSource: Send + Sync {
    fn take_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledJob>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireTime {
    At(OffsetDateTime),
    Immediately,
}

impl FireTime {
    pub fn instant(&self, now: OffsetDateTime) -> OffsetDateTime {
        match self {
            Self::At(at) => *at,
            Self::Immediately => now,
        }
    }
}

/// `due_date - lead` when that is still ahead of `now`; otherwise right away,
/// so short-notice tasks still get one reminder. A lead reaching past the
/// representable range also fires right away.
pub fn fire_time(due_date: OffsetDateTime, now: OffsetDateTime, lead: Duration) -> FireTime {
    match due_date.checked_sub(lead) {
        Some(candidate) if candidate > now => FireTime::At(candidate),
        _ => FireTime::Immediately,
    }
}

pub struct ReminderScheduler<'a> {
    store: &'a dyn TaskStore,
    runner: &'a dyn JobRunner,
    lead: Duration,
}

impl<'a> ReminderScheduler<'a> {
    pub fn new(store: &'a dyn TaskStore, runner: &'a dyn JobRunner, lead: Duration) -> Self {
        Self {
            store,
            runner,
            lead,
        }
    }

    /// Submits a reminder job for `task` and stores its handle.
    ///
    /// A handle already on the task is aborted once the new one is stored.
    pub fn arm(&self, task: &Task, now: OffsetDateTime) -> Result<JobHandle, AppError> {
        let fire = fire_time(task.due_date, now, self.lead);
        let payload = ReminderPayload {
            task_id: task.id,
            owner_id: task.owner_id.clone(),
        };
        let handle = self.runner.submit(payload, fire.instant(now))?;

        let update = TaskUpdate::default().job_handle(handle.clone());
        if let Err(err) = self.store.update(task.id, &update, now) {
            self.abort_logged(task.id, &handle);
            return Err(err);
        }

        // The previous job stays live until its replacement is stored.
        if let Some(previous) = task.job_handle.as_ref() {
            self.abort_logged(task.id, previous);
        }

        info!(
            task_id = task.id,
            job = %handle,
            fire_at = %fire.instant(now),
            immediate = matches!(fire, FireTime::Immediately),
            "reminder armed"
        );
        Ok(handle)
    }

    /// Aborts the task's job, if any, and clears the stored handle whether or
    /// not the abort went through.
    pub fn cancel(&self, task: &Task, now: OffsetDateTime) -> Result<Task, AppError> {
        let Some(handle) = task.job_handle.as_ref() else {
            return Ok(task.clone());
        };

        self.abort_logged(task.id, handle);
        let cleared = self
            .store
            .update(task.id, &TaskUpdate::default().clear_job_handle(), now)?;
        info!(task_id = task.id, job = %handle, "reminder cancelled");
        Ok(cleared)
    }

    pub fn rearm(&self, task: &Task, now: OffsetDateTime) -> Result<JobHandle, AppError> {
        let cleared = self.cancel(task, now)?;
        self.arm(&cleared, now)
    }

    fn abort_logged(&self, task_id: u64, handle: &JobHandle) {
        if let Err(err) = self.runner.abort(handle) {
            warn!(task_id, job = %handle, error = %err, "failed to abort reminder job");
        }
    }
}

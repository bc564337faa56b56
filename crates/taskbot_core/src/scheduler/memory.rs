use crate::error::AppError;
use crate::model::{JobHandle, ReminderPayload};
use crate::scheduler::{JobRunner, JobSource, ScheduledJob};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct MemoryJobs {
    next_id: u64,
    live: Vec<ScheduledJob>,
    aborted: Vec<JobHandle>,
}

/// In-process job runner that records every submit and abort.
#[derive(Debug, Default)]
pub struct MemoryJobRunner {
    jobs: Mutex<MemoryJobs>,
    fail_submits: AtomicBool,
    fail_aborts: AtomicBool,
}

impl MemoryJobRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submits(&self, fail: bool) {
        self.fail_submits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_aborts(&self, fail: bool) {
        self.fail_aborts.store(fail, Ordering::SeqCst);
    }

    /// Jobs submitted and neither aborted nor taken yet, in fire order.
    pub fn live_jobs(&self) -> Vec<ScheduledJob> {
        let mut live = self
            .lock()
            .map(|jobs| jobs.live.clone())
            .unwrap_or_default();
        live.sort_by_key(|job| job.fire_at);
        live
    }

    /// Every handle passed to `abort`, in call order.
    pub fn aborted(&self) -> Vec<JobHandle> {
        self.lock()
            .map(|jobs| jobs.aborted.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryJobs>, AppError> {
        self.jobs
            .lock()
            .map_err(|_| AppError::scheduler("job runner lock poisoned"))
    }
}

impl JobRunner for MemoryJobRunner {
    fn submit(
        &self,
        payload: ReminderPayload,
        fire_at: OffsetDateTime,
    ) -> Result<JobHandle, AppError> {
        if self.fail_submits.load(Ordering::SeqCst) {
            return Err(AppError::scheduler("job runner unavailable"));
        }

        let mut jobs = self.lock()?;
        jobs.next_id += 1;
        let handle = JobHandle::new(format!("mem-job-{}", jobs.next_id));
        jobs.live.push(ScheduledJob {
            handle: handle.clone(),
            payload,
            fire_at,
        });
        Ok(handle)
    }

    fn abort(&self, handle: &JobHandle) -> Result<(), AppError> {
        let mut jobs = self.lock()?;
        jobs.aborted.push(handle.clone());
        if self.fail_aborts.load(Ordering::SeqCst) {
            return Err(AppError::scheduler("job runner unavailable"));
        }
        jobs.live.retain(|job| &job.handle != handle);
        Ok(())
    }
}

impl JobSource for MemoryJobRunner {
    fn take_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledJob>, AppError> {
        let mut jobs = self.lock()?;
        let (mut due, pending): (Vec<ScheduledJob>, Vec<ScheduledJob>) =
            jobs.live.drain(..).partition(|job| job.fire_at <= now);
        jobs.live = pending;
        due.sort_by_key(|job| job.fire_at);
        Ok(due)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryJobRunner;
    use crate::model::ReminderPayload;
    use crate::scheduler::{JobRunner, JobSource};
    use time::Duration;
    use time::macros::datetime;

    fn payload(task_id: u64) -> ReminderPayload {
        ReminderPayload {
            task_id,
            owner_id: "chat-1".to_string(),
        }
    }

    #[test]
    fn take_due_drains_only_ready_jobs() {
        let runner = MemoryJobRunner::new();
        let now = datetime!(2025-01-01 09:00 UTC);

        runner.submit(payload(1), now + Duration::hours(1)).unwrap();
        let ready = runner.submit(payload(2), now).unwrap();

        let due = runner.take_due(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].handle, ready);
        assert_eq!(runner.live_jobs().len(), 1);
        assert!(runner.take_due(now).unwrap().is_empty());
    }

    #[test]
    fn abort_of_unknown_handle_is_recorded() {
        let runner = MemoryJobRunner::new();
        let handle = runner
            .submit(payload(1), datetime!(2025-01-01 09:00 UTC))
            .unwrap();

        runner.abort(&handle).unwrap();
        runner.abort(&handle).unwrap();

        assert_eq!(runner.aborted().len(), 2);
        assert!(runner.live_jobs().is_empty());
    }
}

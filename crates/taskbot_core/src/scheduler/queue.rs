use crate::error::AppError;
use crate::model::{JobHandle, ReminderPayload};
use crate::scheduler::{JobRunner, JobSource, ScheduledJob};
use crate::storage::lock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

pub const QUEUE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredJobs {
    schema_version: u32,
    jobs: Vec<ScheduledJob>,
}

/// Delayed-job queue persisted as JSON and drained by `taskbot worker`.
#[derive(Debug, Clone)]
pub struct FileJobQueue {
    path: PathBuf,
}

impl FileJobQueue {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Jobs still waiting, earliest first.
    pub fn pending(&self) -> Result<Vec<ScheduledJob>, AppError> {
        let mut jobs = load_jobs(&self.path)?.jobs;
        jobs.sort_by_key(|job| job.fire_at);
        Ok(jobs)
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoredJobs) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let _guard = lock::acquire(&self.path)?;
        let mut stored = load_jobs(&self.path)?;
        let result = apply(&mut stored)?;
        let content = serde_json::to_string_pretty(&stored)
            .map_err(|err| AppError::invalid_data(err.to_string()))?;
        lock::write_atomic(&self.path, &content)?;
        Ok(result)
    }
}

fn load_jobs(path: &Path) -> Result<StoredJobs, AppError> {
    if !path.exists() {
        return Ok(StoredJobs {
            schema_version: QUEUE_SCHEMA_VERSION,
            jobs: Vec::new(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|err| AppError::io(err.to_string()))?;
    let stored: StoredJobs =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;
    if stored.schema_version != QUEUE_SCHEMA_VERSION {
        return Err(AppError::invalid_data("job queue schema_version mismatch"));
    }
    Ok(stored)
}

impl JobRunner for FileJobQueue {
    fn submit(
        &self,
        payload: ReminderPayload,
        fire_at: OffsetDateTime,
    ) -> Result<JobHandle, AppError> {
        let handle = JobHandle::new(Uuid::new_v4().to_string());
        let job = ScheduledJob {
            handle: handle.clone(),
            payload,
            fire_at,
        };
        self.mutate(|stored| {
            stored.jobs.push(job);
            Ok(())
        })
        .map_err(|err| AppError::scheduler(format!("submit failed: {}", err.message())))?;
        Ok(handle)
    }

    fn abort(&self, handle: &JobHandle) -> Result<(), AppError> {
        let removed = self
            .mutate(|stored| {
                let before = stored.jobs.len();
                stored.jobs.retain(|job| &job.handle != handle);
                Ok(before - stored.jobs.len())
            })
            .map_err(|err| AppError::scheduler(format!("abort failed: {}", err.message())))?;
        if removed == 0 {
            debug!(job = %handle, "abort requested for a job that is no longer queued");
        }
        Ok(())
    }
}

impl JobSource for FileJobQueue {
    fn take_due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledJob>, AppError> {
        let mut due = self.mutate(|stored| {
            let (due, pending): (Vec<ScheduledJob>, Vec<ScheduledJob>) =
                stored.jobs.drain(..).partition(|job| job.fire_at <= now);
            stored.jobs = pending;
            Ok(due)
        })?;
        due.sort_by_key(|job| job.fire_at);
        Ok(due)
    }
}

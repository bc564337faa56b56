pub mod json_store;
pub mod lock;
pub mod memory;

use crate::clock::validate_future;
use crate::error::AppError;
use crate::model::{Task, TaskStatus, TaskUpdate};
use time::OffsetDateTime;

pub use json_store::JsonTaskStore;
pub use memory::MemoryTaskStore;

pub trait TaskStore: Send + Sync {
    fn create(
        &self,
        owner_id: &str,
        description: &str,
        due_date: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Task, AppError>;

    fn get(&self, task_id: u64) -> Result<Task, AppError>;

    /// Tasks of one owner in creation order.
    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Task>, AppError>;

    fn update(
        &self,
        task_id: u64,
        update: &TaskUpdate,
        now: OffsetDateTime,
    ) -> Result<Task, AppError>;

    fn delete(&self, task_id: u64) -> Result<Task, AppError>;
}

pub(crate) fn normalize_description(description: &str) -> Result<String, AppError> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_input("description is required"));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn new_task(
    id: u64,
    owner_id: &str,
    description: &str,
    due_date: OffsetDateTime,
    now: OffsetDateTime,
) -> Result<Task, AppError> {
    let owner_id = owner_id.trim();
    if owner_id.is_empty() {
        return Err(AppError::invalid_input("owner id is required"));
    }
    let description = normalize_description(description)?;
    validate_future(due_date, now)?;

    Ok(Task {
        id,
        owner_id: owner_id.to_string(),
        description,
        due_date,
        status: TaskStatus::Pending,
        job_handle: None,
        created_at: now,
    })
}

/// Computes the updated record without touching storage.
pub(crate) fn apply_update(
    task: &Task,
    update: &TaskUpdate,
    now: OffsetDateTime,
) -> Result<Task, AppError> {
    let mut updated = task.clone();

    if let Some(due_date) = update.due_date {
        validate_future(due_date, now)?;
        updated.due_date = due_date;
    }

    if let Some(description) = update.description.as_deref() {
        updated.description = normalize_description(description)?;
    }

    if let Some(status) = update.status {
        if task.status == TaskStatus::Done && status == TaskStatus::Pending {
            return Err(AppError::invalid_input("a done task cannot be reopened"));
        }
        updated.status = status;
    }

    if let Some(job_handle) = update.job_handle.as_ref() {
        updated.job_handle = job_handle.clone();
    }

    Ok(updated)
}

use crate::clock::Clock;
use crate::error::AppError;
use crate::model::{Task, TaskEdit, TaskStatus, TaskUpdate};
use crate::pagination::{PageView, page_of};
use crate::scheduler::{DEFAULT_REMINDER_LEAD, JobRunner, ReminderScheduler};
use crate::storage::TaskStore;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};

/// Keeps each task's reminder job in step with the store. Scheduler failures
/// are logged and never roll back a store mutation.
pub struct TaskController {
    store: Arc<dyn TaskStore>,
    runner: Arc<dyn JobRunner>,
    clock: Arc<dyn Clock>,
    reminder_lead: Duration,
}

impl TaskController {
    pub fn new(
        store: Arc<dyn TaskStore>,
        runner: Arc<dyn JobRunner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            runner,
            clock,
            reminder_lead: DEFAULT_REMINDER_LEAD,
        }
    }

    pub fn with_reminder_lead(mut self, lead: Duration) -> Self {
        self.reminder_lead = lead;
        self
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    fn scheduler(&self) -> ReminderScheduler<'_> {
        ReminderScheduler::new(
            self.store.as_ref(),
            self.runner.as_ref(),
            self.reminder_lead,
        )
    }

    /// Fetches a task, hiding tasks that belong to someone else.
    fn owned_task(&self, owner_id: &str, task_id: u64) -> Result<Task, AppError> {
        let task = self.store.get(task_id)?;
        if task.owner_id != owner_id {
            return Err(AppError::task_not_found(task_id));
        }
        Ok(task)
    }

    pub fn add_task(
        &self,
        owner_id: &str,
        description: &str,
        due_date: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let now = self.clock.now();
        let mut task = self.store.create(owner_id, description, due_date, now)?;
        info!(task_id = task.id, owner_id, "task added");

        match self.scheduler().arm(&task, now) {
            Ok(handle) => task.job_handle = Some(handle),
            Err(err) => {
                warn!(task_id = task.id, error = %err, "task added without a reminder");
            }
        }

        Ok(task)
    }

    pub fn get_task(&self, owner_id: &str, task_id: u64) -> Result<Task, AppError> {
        self.owned_task(owner_id, task_id)
    }

    pub fn list_tasks(&self, owner_id: &str) -> Result<Vec<Task>, AppError> {
        self.store.list_for_owner(owner_id)
    }

    /// Applies an edit; a supplied due date re-arms the reminder.
    pub fn update_task(
        &self,
        owner_id: &str,
        task_id: u64,
        edit: TaskEdit,
    ) -> Result<Task, AppError> {
        if edit.is_empty() {
            return Err(AppError::invalid_input("nothing to update"));
        }

        self.owned_task(owner_id, task_id)?;
        let now = self.clock.now();
        let due_changed = edit.due_date.is_some();
        let mut task = self.store.update(task_id, &TaskUpdate::from(edit), now)?;
        info!(task_id, owner_id, due_changed, "task updated");

        if due_changed {
            match self.scheduler().rearm(&task, now) {
                Ok(handle) => task.job_handle = Some(handle),
                Err(err) => {
                    warn!(task_id, error = %err, "reminder not re-armed after update");
                    task = self.store.get(task_id)?;
                }
            }
        }

        Ok(task)
    }

    pub fn update_description(
        &self,
        owner_id: &str,
        task_id: u64,
        description: &str,
    ) -> Result<Task, AppError> {
        self.update_task(
            owner_id,
            task_id,
            TaskEdit {
                description: Some(description.to_string()),
                due_date: None,
            },
        )
    }

    pub fn update_due_date(
        &self,
        owner_id: &str,
        task_id: u64,
        due_date: OffsetDateTime,
    ) -> Result<Task, AppError> {
        self.update_task(
            owner_id,
            task_id,
            TaskEdit {
                description: None,
                due_date: Some(due_date),
            },
        )
    }

    /// Marks a task done. The reminder job is left as is.
    pub fn mark_done(&self, owner_id: &str, task_id: u64) -> Result<Task, AppError> {
        let task = self.owned_task(owner_id, task_id)?;
        if task.status == TaskStatus::Done {
            return Ok(task);
        }

        let done = self.store.update(
            task_id,
            &TaskUpdate::default().status(TaskStatus::Done),
            self.clock.now(),
        )?;
        info!(task_id, owner_id, "task marked done");
        Ok(done)
    }

    /// Cancels the reminder, then removes the record.
    pub fn delete_task(&self, owner_id: &str, task_id: u64) -> Result<Task, AppError> {
        let task = self.owned_task(owner_id, task_id)?;

        if let Err(err) = self.scheduler().cancel(&task, self.clock.now()) {
            warn!(task_id, error = %err, "could not clear reminder before delete");
        }

        let removed = self.store.delete(task_id)?;
        info!(task_id, owner_id, "task deleted");
        Ok(removed)
    }

    /// One task per page; `page` wraps modulo the current task count.
    pub fn view_page(&self, owner_id: &str, page: i64) -> Result<PageView, AppError> {
        Ok(page_of(self.store.list_for_owner(owner_id)?, page))
    }
}

use crate::model::JobHandle;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub owner_id: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub due_date: OffsetDateTime,
    pub status: TaskStatus,
    #[serde(default)]
    pub job_handle: Option<JobHandle>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
        }
    }
}

/// User-facing edit: the fields a task owner may change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
}

impl TaskEdit {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.due_date.is_none()
    }
}

/// Partial record update applied by a store.
///
/// `job_handle` distinguishes "leave alone" (`None`) from "clear"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub description: Option<String>,
    pub due_date: Option<OffsetDateTime>,
    pub status: Option<TaskStatus>,
    pub job_handle: Option<Option<JobHandle>>,
}

impl TaskUpdate {
    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due_date(mut self, due_date: OffsetDateTime) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn job_handle(mut self, handle: JobHandle) -> Self {
        self.job_handle = Some(Some(handle));
        self
    }

    pub fn clear_job_handle(mut self) -> Self {
        self.job_handle = Some(None);
        self
    }
}

impl From<TaskEdit> for TaskUpdate {
    fn from(edit: TaskEdit) -> Self {
        Self {
            description: edit.description,
            due_date: edit.due_date,
            ..Self::default()
        }
    }
}

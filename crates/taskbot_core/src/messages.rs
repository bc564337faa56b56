use crate::clock::format_due_date;
use crate::error::AppError;
use crate::model::{Task, TaskStatus};
use handlebars::Handlebars;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Welcome,
    ChooseAction,
    EnterTaskDescription,
    EnterDueDate,
    TaskAdded,
    EnterNewTaskDescription,
    EnterNewDueDate,
    TaskUpdated,
    TaskView,
    TaskDone,
    TaskDeleted,
    Reminder,
    NoTasks,
    PastDate,
    InvalidDateFormat,
    TaskListWarning,
    IncorrectData,
    NotFound,
    OperationFailed,
    Cancelled,
}

impl MessageKind {
    pub const ALL: [MessageKind; 20] = [
        Self::Welcome,
        Self::ChooseAction,
        Self::EnterTaskDescription,
        Self::EnterDueDate,
        Self::TaskAdded,
        Self::EnterNewTaskDescription,
        Self::EnterNewDueDate,
        Self::TaskUpdated,
        Self::TaskView,
        Self::TaskDone,
        Self::TaskDeleted,
        Self::Reminder,
        Self::NoTasks,
        Self::PastDate,
        Self::InvalidDateFormat,
        Self::TaskListWarning,
        Self::IncorrectData,
        Self::NotFound,
        Self::OperationFailed,
        Self::Cancelled,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::ChooseAction => "choose_action",
            Self::EnterTaskDescription => "enter_task_desc",
            Self::EnterDueDate => "enter_due_date",
            Self::TaskAdded => "task_added",
            Self::EnterNewTaskDescription => "enter_new_task_desc",
            Self::EnterNewDueDate => "enter_new_due_date",
            Self::TaskUpdated => "task_updated",
            Self::TaskView => "task_view",
            Self::TaskDone => "task_done",
            Self::TaskDeleted => "task_deleted",
            Self::Reminder => "reminder",
            Self::NoTasks => "no_tasks",
            Self::PastDate => "past_date",
            Self::InvalidDateFormat => "invalid_date_format",
            Self::TaskListWarning => "task_list_warning",
            Self::IncorrectData => "incorrect_data",
            Self::NotFound => "not_found",
            Self::OperationFailed => "operation_failed",
            Self::Cancelled => "cancelled",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            Self::Welcome => "Hi! I keep track of your tasks and remind you a day before they are due.",
            Self::ChooseAction => "Choose an action: add a task or view your tasks.",
            Self::EnterTaskDescription => "Enter the task description.",
            Self::EnterDueDate => "Enter the due date as YYYY-MM-DD-HH (for example 2025-01-10-09).",
            Self::TaskAdded => "Task added: {{description}}\nDue: {{due_date}}",
            Self::EnterNewTaskDescription => "Enter the new task description.",
            Self::EnterNewDueDate => "Enter the new due date as YYYY-MM-DD-HH.",
            Self::TaskUpdated => "Task updated: {{description}}\nDue: {{due_date}}",
            Self::TaskView => {
                "{{#if total}}Task {{page}} of {{total}}\n{{/if}}Task: {{description}}\nDue: {{due_date}}\nStatus: {{#if done}}done{{else}}not done{{/if}}"
            }
            Self::TaskDone => "Task marked as done: {{description}}",
            Self::TaskDeleted => "Task deleted: {{description}}",
            Self::Reminder => "Reminder: \"{{description}}\" is due {{due_date}}.",
            Self::NoTasks => "You have no tasks.",
            Self::PastDate => "The due date cannot be in the past.",
            Self::InvalidDateFormat => "Invalid date format. Use YYYY-MM-DD-HH.",
            Self::TaskListWarning => "There is only one task in the list.",
            Self::IncorrectData => "Incorrect data, please try again.",
            Self::NotFound => "That task no longer exists.",
            Self::OperationFailed => "Something went wrong, please try again later.",
            Self::Cancelled => "Cancelled.",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl MessageParams {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_task(task: &Task) -> Self {
        Self {
            description: Some(task.description.clone()),
            due_date: Some(format_due_date(task.due_date)),
            done: task.status == TaskStatus::Done,
            page: None,
            total: None,
        }
    }

    /// `index` is zero-based; templates see the 1-based page number.
    pub fn for_page(task: &Task, index: usize, total: usize) -> Self {
        Self {
            page: Some(index + 1),
            total: Some(total),
            ..Self::for_task(task)
        }
    }
}

/// Each [`MessageKind`] is one embedded Handlebars template.
pub struct Messages {
    handlebars: Handlebars<'static>,
}

impl Messages {
    pub fn new() -> Result<Self, AppError> {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);

        for kind in MessageKind::ALL {
            handlebars
                .register_template_string(kind.name(), kind.template())
                .map_err(|err| {
                    AppError::invalid_data(format!("invalid template {}: {err}", kind.name()))
                })?;
        }

        Ok(Self { handlebars })
    }

    pub fn render(&self, kind: MessageKind, params: &MessageParams) -> Result<String, AppError> {
        self.handlebars.render(kind.name(), params).map_err(|err| {
            AppError::invalid_data(format!("failed to render {}: {err}", kind.name()))
        })
    }
}

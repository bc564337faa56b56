use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("past_date - due date must be in the future")]
    PastDate,
    #[error("not_found - {0}")]
    NotFound(String),
    #[error("invalid_input - {0}")]
    InvalidInput(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("io_error - {0}")]
    Io(String),
    #[error("scheduler_error - {0}")]
    Scheduler(String),
    #[error("delivery_error - {0}")]
    Delivery(String),
}

const PAST_DATE_MESSAGE: &str = "due date must be in the future";

impl AppError {
    pub fn not_found<M: Into<String>>(message: M) -> Self {
        Self::NotFound(message.into())
    }

    pub fn invalid_input<M: Into<String>>(message: M) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn scheduler<M: Into<String>>(message: M) -> Self {
        Self::Scheduler(message.into())
    }

    pub fn delivery<M: Into<String>>(message: M) -> Self {
        Self::Delivery(message.into())
    }

    pub fn task_not_found(task_id: u64) -> Self {
        Self::NotFound(format!("task {task_id} not found"))
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::PastDate => "past_date",
            Self::NotFound(_) => "not_found",
            Self::InvalidInput(_) => "invalid_input",
            Self::InvalidData(_) => "invalid_data",
            Self::Io(_) => "io_error",
            Self::Scheduler(_) => "scheduler_error",
            Self::Delivery(_) => "delivery_error",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::PastDate => PAST_DATE_MESSAGE,
            Self::NotFound(message)
            | Self::InvalidInput(message)
            | Self::InvalidData(message)
            | Self::Io(message)
            | Self::Scheduler(message)
            | Self::Delivery(message) => message,
        }
    }
}

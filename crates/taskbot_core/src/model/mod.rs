mod job;
mod task;

pub use job::{JobHandle, ReminderPayload};
pub use task::{Task, TaskEdit, TaskStatus, TaskUpdate};

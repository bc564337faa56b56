use crate::error::AppError;
use crate::model::{Task, TaskUpdate};
use crate::storage::{TaskStore, apply_update, new_task};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    tasks: BTreeMap<u64, Task>,
}

/// Isolated in-process store, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    state: Mutex<MemoryState>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|state| state.tasks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, AppError> {
        self.state
            .lock()
            .map_err(|_| AppError::io("task store lock poisoned"))
    }
}

impl TaskStore for MemoryTaskStore {
    fn create(
        &self,
        owner_id: &str,
        description: &str,
        due_date: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let mut state = self.lock()?;
        let id = state.next_id + 1;
        let task = new_task(id, owner_id, description, due_date, now)?;
        state.next_id = id;
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    fn get(&self, task_id: u64) -> Result<Task, AppError> {
        self.lock()?
            .tasks
            .get(&task_id)
            .cloned()
            .ok_or_else(|| AppError::task_not_found(task_id))
    }

    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Task>, AppError> {
        Ok(self
            .lock()?
            .tasks
            .values()
            .filter(|task| task.owner_id == owner_id)
            .cloned()
            .collect())
    }

    fn update(
        &self,
        task_id: u64,
        update: &TaskUpdate,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        let mut state = self.lock()?;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| AppError::task_not_found(task_id))?;
        let updated = apply_update(task, update, now)?;
        *task = updated.clone();
        Ok(updated)
    }

    fn delete(&self, task_id: u64) -> Result<Task, AppError> {
        self.lock()?
            .tasks
            .remove(&task_id)
            .ok_or_else(|| AppError::task_not_found(task_id))
    }
}

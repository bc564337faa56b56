use crate::error::AppError;
use crate::model::{Task, TaskUpdate};
use crate::storage::{TaskStore, apply_update, lock, new_task};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTasks {
    schema_version: u32,
    #[serde(default)]
    next_id: u64,
    tasks: Vec<Task>,
}

/// Task store backed by a single JSON document.
///
/// Every mutation runs under the document's lock file and replaces the
/// document atomically, so concurrent processes never lose a record update.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<StoredTasks, AppError> {
        load_document(&self.path)
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut StoredTasks) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let _guard = lock::acquire(&self.path)?;
        let mut stored = load_document(&self.path)?;
        let result = apply(&mut stored)?;
        save_document(&self.path, &stored)?;
        Ok(result)
    }
}

fn load_document(path: &Path) -> Result<StoredTasks, AppError> {
    if !path.exists() {
        return Ok(StoredTasks {
            schema_version: SCHEMA_VERSION,
            next_id: 1,
            tasks: Vec::new(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|err| AppError::io(err.to_string()))?;
    let mut stored: StoredTasks =
        serde_json::from_str(&content).map_err(|err| AppError::invalid_data(err.to_string()))?;

    if stored.schema_version != SCHEMA_VERSION {
        return Err(AppError::invalid_data("schema_version mismatch"));
    }

    // Documents written by hand may omit next_id.
    let highest = stored.tasks.iter().map(|task| task.id).max().unwrap_or(0);
    if stored.next_id <= highest {
        stored.next_id = highest + 1;
    }

    Ok(stored)
}

fn save_document(path: &Path, stored: &StoredTasks) -> Result<(), AppError> {
    let content = serde_json::to_string_pretty(stored)
        .map_err(|err| AppError::invalid_data(err.to_string()))?;
    lock::write_atomic(path, &content)
}

impl TaskStore for JsonTaskStore {
    fn create(
        &self,
        owner_id: &str,
        description: &str,
        due_date: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        self.mutate(|stored| {
            let task = new_task(stored.next_id, owner_id, description, due_date, now)?;
            stored.next_id += 1;
            stored.tasks.push(task.clone());
            Ok(task)
        })
    }

    fn get(&self, task_id: u64) -> Result<Task, AppError> {
        self.read()?
            .tasks
            .into_iter()
            .find(|task| task.id == task_id)
            .ok_or_else(|| AppError::task_not_found(task_id))
    }

    fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Task>, AppError> {
        let mut tasks: Vec<Task> = self
            .read()?
            .tasks
            .into_iter()
            .filter(|task| task.owner_id == owner_id)
            .collect();
        tasks.sort_by_key(|task| task.id);
        Ok(tasks)
    }

    fn update(
        &self,
        task_id: u64,
        update: &TaskUpdate,
        now: OffsetDateTime,
    ) -> Result<Task, AppError> {
        self.mutate(|stored| {
            let task = stored
                .tasks
                .iter_mut()
                .find(|task| task.id == task_id)
                .ok_or_else(|| AppError::task_not_found(task_id))?;
            let updated = apply_update(task, update, now)?;
            *task = updated.clone();
            Ok(updated)
        })
    }

    fn delete(&self, task_id: u64) -> Result<Task, AppError> {
        self.mutate(|stored| {
            let index = stored
                .tasks
                .iter()
                .position(|task| task.id == task_id)
                .ok_or_else(|| AppError::task_not_found(task_id))?;
            Ok(stored.tasks.remove(index))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonTaskStore, SCHEMA_VERSION};
    use crate::error::AppError;
    use crate::model::{JobHandle, TaskStatus, TaskUpdate};
    use crate::storage::TaskStore;
    use std::collections::HashSet;
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::Duration;
    use time::macros::datetime;

    fn temp_path(file_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("taskbot-{nanos}-{file_name}"))
    }

    #[test]
    fn create_persists_and_assigns_increasing_ids() {
        let path = temp_path("create.json");
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);

        let first = store
            .create("chat-1", "Pay bills", datetime!(2025-01-10 09:00 UTC), now)
            .unwrap();
        let second = store
            .create("chat-1", "Call mom", datetime!(2025-01-03 18:00 UTC), now)
            .unwrap();

        let reopened = JsonTaskStore::new(&path);
        let listed = reopened.list_for_owner("chat-1").unwrap();
        fs::remove_file(&path).ok();

        assert!(second.id > first.id);
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0], first);
        assert_eq!(listed[1], second);
    }

    #[test]
    fn create_with_past_date_leaves_document_untouched() {
        let path = temp_path("past.json");
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);

        let err = store
            .create("chat-1", "late", datetime!(2025-01-01 08:00 UTC), now)
            .unwrap_err();

        assert_eq!(err, AppError::PastDate);
        assert!(!path.exists());
    }

    #[test]
    fn list_for_owner_is_scoped() {
        let path = temp_path("scoped.json");
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);
        let due = now + Duration::days(3);

        store.create("chat-1", "mine", due, now).unwrap();
        store.create("chat-2", "theirs", due, now).unwrap();

        let mine = store.list_for_owner("chat-1").unwrap();
        let nobody = store.list_for_owner("chat-3").unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].description, "mine");
        assert!(nobody.is_empty());
    }

    #[test]
    fn update_is_partial_and_persisted() {
        let path = temp_path("update.json");
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);
        let task = store
            .create("chat-1", "demo", now + Duration::days(3), now)
            .unwrap();

        let updated = store
            .update(
                task.id,
                &TaskUpdate::default()
                    .status(TaskStatus::Done)
                    .job_handle(JobHandle::new("job-7")),
                now,
            )
            .unwrap();
        let fetched = store.get(task.id).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(updated.description, "demo");
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(fetched, updated);
    }

    #[test]
    fn concurrent_writers_lose_no_records() {
        let path = temp_path("concurrent.json");
        let now = datetime!(2025-01-01 09:00 UTC);
        let due = now + Duration::days(3);
        let seed = JsonTaskStore::new(&path)
            .create("chat-0", "shared", due, now)
            .unwrap();

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let path = &path;
                scope.spawn(move || {
                    let store = JsonTaskStore::new(path);
                    let owner = format!("chat-{}", writer + 1);
                    for n in 0..10 {
                        store
                            .create(&owner, &format!("task {n}"), due, now)
                            .unwrap();
                        store
                            .update(
                                seed.id,
                                &TaskUpdate::default().description(format!("touched by {owner}")),
                                now,
                            )
                            .unwrap();
                    }
                });
            }
        });

        let store = JsonTaskStore::new(&path);
        let mut ids = HashSet::new();
        let mut created = 0;
        for writer in 1..=8 {
            let tasks = store.list_for_owner(&format!("chat-{writer}")).unwrap();
            assert_eq!(tasks.len(), 10);
            created += tasks.len();
            ids.extend(tasks.iter().map(|task| task.id));
        }
        let shared = store.get(seed.id).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(created, 80);
        assert_eq!(ids.len(), 80);
        assert!(!ids.contains(&seed.id));
        assert!(shared.description.starts_with("touched by chat-"));
    }

    #[test]
    fn update_and_delete_report_not_found() {
        let path = temp_path("missing.json");
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);

        let err = store
            .update(42, &TaskUpdate::default().description("x"), now)
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = store.delete(42).unwrap_err();
        assert_eq!(err.code(), "not_found");

        let err = store.get(42).unwrap_err();
        fs::remove_file(&path).ok();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn delete_removes_record() {
        let path = temp_path("delete.json");
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);
        let task = store
            .create("chat-1", "demo", now + Duration::days(3), now)
            .unwrap();

        let removed = store.delete(task.id).unwrap();
        let remaining = store.list_for_owner("chat-1").unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(removed.id, task.id);
        assert!(remaining.is_empty());
    }

    #[test]
    fn hand_written_document_without_next_id_is_accepted() {
        let path = temp_path("no-next-id.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": 4,\n      \"owner_id\": \"chat-1\",\n      \"description\": \"demo\",\n      \"due_date\": \"2025-01-10T09:00:00Z\",\n      \"status\": \"pending\",\n      \"job_handle\": null,\n      \"created_at\": \"2025-01-01T09:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();
        let store = JsonTaskStore::new(&path);
        let now = datetime!(2025-01-01 09:00 UTC);

        let created = store
            .create("chat-1", "next", now + Duration::days(1), now)
            .unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(created.id, 5);
    }

    #[test]
    fn rejects_unknown_status_text() {
        let path = temp_path("bad-status.json");
        let content = "{\n  \"schema_version\": 1,\n  \"tasks\": [\n    {\n      \"id\": 1,\n      \"owner_id\": \"chat-1\",\n      \"description\": \"demo\",\n      \"due_date\": \"2025-01-10T09:00:00Z\",\n      \"status\": \"archived\",\n      \"created_at\": \"2025-01-01T09:00:00Z\"\n    }\n  ]\n}";
        fs::write(&path, content).unwrap();

        let err = JsonTaskStore::new(&path).get(1).unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }

    #[test]
    fn schema_version_must_match() {
        let path = temp_path("bad-schema.json");
        let bad = format!(
            "{{\n  \"schema_version\": {},\n  \"tasks\": []\n}}",
            SCHEMA_VERSION + 1
        );
        fs::write(&path, bad).unwrap();

        let err = JsonTaskStore::new(&path).list_for_owner("chat-1").unwrap_err();
        fs::remove_file(&path).ok();

        assert_eq!(err.code(), "invalid_data");
    }
}

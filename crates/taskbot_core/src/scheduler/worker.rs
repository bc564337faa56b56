use crate::clock::Clock;
use crate::error::AppError;
use crate::messages::{MessageKind, MessageParams, Messages};
use crate::model::TaskStatus;
use crate::notify::Notifier;
use crate::scheduler::{JobSource, ScheduledJob};
use crate::storage::TaskStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    Sent,
    /// The task was deleted after the job was queued.
    TaskMissing,
    TaskDone,
    Failed(AppError),
}

/// Executes reminder jobs once they are due.
pub struct ReminderWorker {
    store: Arc<dyn TaskStore>,
    jobs: Arc<dyn JobSource>,
    notifier: Arc<dyn Notifier>,
    messages: Arc<Messages>,
    clock: Arc<dyn Clock>,
}

impl ReminderWorker {
    pub fn new(
        store: Arc<dyn TaskStore>,
        jobs: Arc<dyn JobSource>,
        notifier: Arc<dyn Notifier>,
        messages: Arc<Messages>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            jobs,
            notifier,
            messages,
            clock,
        }
    }

    /// Runs one reminder job. The task is looked up again so edits made
    /// after queuing are reflected in the message.
    pub fn fire(&self, job: &ScheduledJob) -> FireOutcome {
        let task_id = job.payload.task_id;
        let task = match self.store.get(task_id) {
            Ok(task) => task,
            Err(AppError::NotFound(_)) => {
                debug!(task_id, job = %job.handle, "task gone, skipping reminder");
                return FireOutcome::TaskMissing;
            }
            Err(err) => {
                warn!(task_id, job = %job.handle, error = %err, "could not load task for reminder");
                return FireOutcome::Failed(err);
            }
        };

        if task.status == TaskStatus::Done {
            debug!(task_id, job = %job.handle, "task already done, skipping reminder");
            return FireOutcome::TaskDone;
        }

        let sent = self
            .messages
            .render(MessageKind::Reminder, &MessageParams::for_task(&task))
            .and_then(|message| self.notifier.send(&task.owner_id, &message));

        match sent {
            Ok(()) => {
                info!(task_id, owner_id = %task.owner_id, "reminder sent");
                FireOutcome::Sent
            }
            Err(err) => {
                warn!(task_id, owner_id = %task.owner_id, error = %err, "reminder delivery failed");
                FireOutcome::Failed(err)
            }
        }
    }

    /// Drains due jobs and fires them one after another.
    pub fn run_once(&self) -> Result<Vec<FireOutcome>, AppError> {
        let due = self.jobs.take_due(self.clock.now())?;
        Ok(due.iter().map(|job| self.fire(job)).collect())
    }

    /// Polls for due jobs until `shutdown` flips to true. Each job fires on the
    /// blocking pool and is not awaited.
    pub async fn run(
        self: Arc<Self>,
        poll_interval: std::time::Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(poll_secs = poll_interval.as_secs(), "reminder worker started");
        let mut interval = tokio::time::interval(poll_interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.dispatch_due();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("reminder worker stopped");
    }

    fn dispatch_due(self: &Arc<Self>) -> usize {
        let due = match self.jobs.take_due(self.clock.now()) {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "could not read due reminder jobs");
                return 0;
            }
        };

        let count = due.len();
        for job in due {
            let worker = Arc::clone(self);
            tokio::task::spawn_blocking(move || worker.fire(&job));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::{FireOutcome, ReminderWorker};
    use crate::clock::{Clock, FixedClock};
    use crate::error::AppError;
    use crate::messages::Messages;
    use crate::model::{ReminderPayload, TaskStatus, TaskUpdate};
    use crate::notify::Notifier;
    use crate::scheduler::{JobRunner, MemoryJobRunner};
    use crate::storage::{MemoryTaskStore, TaskStore};
    use std::sync::{Arc, Mutex};
    use time::Duration;
    use time::macros::datetime;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, owner_id: &str, message: &str) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::delivery("chat unreachable"));
            }
            self.sent
                .lock()
                .unwrap()
                .push((owner_id.to_string(), message.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryTaskStore>,
        runner: Arc<MemoryJobRunner>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<FixedClock>,
        worker: Arc<ReminderWorker>,
    }

    fn fixture(notifier: RecordingNotifier) -> Fixture {
        let store = Arc::new(MemoryTaskStore::new());
        let runner = Arc::new(MemoryJobRunner::new());
        let notifier = Arc::new(notifier);
        let clock = Arc::new(FixedClock::new(datetime!(2025-01-01 09:00 UTC)));
        let worker = Arc::new(ReminderWorker::new(
            store.clone(),
            runner.clone(),
            notifier.clone(),
            Arc::new(Messages::new().unwrap()),
            clock.clone(),
        ));
        Fixture {
            store,
            runner,
            notifier,
            clock,
            worker,
        }
    }

    fn queue_reminder(fx: &Fixture, description: &str) -> u64 {
        let now = fx.clock.now();
        let task = fx
            .store
            .create("chat-1", description, now + Duration::days(9), now)
            .unwrap();
        fx.runner
            .submit(
                ReminderPayload {
                    task_id: task.id,
                    owner_id: task.owner_id.clone(),
                },
                now + Duration::days(8),
            )
            .unwrap();
        task.id
    }

    #[test]
    fn run_once_waits_for_fire_time() {
        let fx = fixture(RecordingNotifier::default());
        queue_reminder(&fx, "Pay bills");

        assert!(fx.worker.run_once().unwrap().is_empty());

        fx.clock.advance(Duration::days(8));
        let outcomes = fx.worker.run_once().unwrap();

        assert_eq!(outcomes, vec![FireOutcome::Sent]);
        let sent = fx.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "chat-1");
        assert!(sent[0].1.contains("Pay bills"));
    }

    #[test]
    fn fire_uses_current_task_state() {
        let fx = fixture(RecordingNotifier::default());
        let task_id = queue_reminder(&fx, "old text");
        fx.store
            .update(
                task_id,
                &TaskUpdate::default().description("new text"),
                fx.clock.now(),
            )
            .unwrap();

        fx.clock.advance(Duration::days(8));
        fx.worker.run_once().unwrap();

        let sent = fx.notifier.sent.lock().unwrap();
        assert!(sent[0].1.contains("new text"));
    }

    #[test]
    fn fire_for_deleted_task_is_silent() {
        let fx = fixture(RecordingNotifier::default());
        let task_id = queue_reminder(&fx, "gone");
        fx.store.delete(task_id).unwrap();

        fx.clock.advance(Duration::days(8));
        let outcomes = fx.worker.run_once().unwrap();

        assert_eq!(outcomes, vec![FireOutcome::TaskMissing]);
        assert!(fx.notifier.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn fire_skips_done_task() {
        let fx = fixture(RecordingNotifier::default());
        let task_id = queue_reminder(&fx, "finished");
        fx.store
            .update(
                task_id,
                &TaskUpdate::default().status(TaskStatus::Done),
                fx.clock.now(),
            )
            .unwrap();

        fx.clock.advance(Duration::days(8));
        assert_eq!(fx.worker.run_once().unwrap(), vec![FireOutcome::TaskDone]);
    }

    #[test]
    fn delivery_failure_is_reported_not_retried() {
        let fx = fixture(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let task_id = queue_reminder(&fx, "Pay bills");
        let before = fx.store.get(task_id).unwrap();

        fx.clock.advance(Duration::days(8));
        let outcomes = fx.worker.run_once().unwrap();

        assert!(matches!(outcomes.as_slice(), [FireOutcome::Failed(AppError::Delivery(_))]));
        assert!(fx.worker.run_once().unwrap().is_empty());
        assert_eq!(fx.store.get(task_id).unwrap(), before);
    }

    #[tokio::test]
    async fn run_loop_fires_and_stops_on_shutdown() {
        let fx = fixture(RecordingNotifier::default());
        queue_reminder(&fx, "Pay bills");
        fx.clock.advance(Duration::days(8));

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(
            fx.worker
                .clone()
                .run(std::time::Duration::from_millis(10), shutdown_rx),
        );

        for _ in 0..100 {
            if !fx.notifier.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(fx.notifier.sent.lock().unwrap().len(), 1);
        assert!(fx.runner.live_jobs().is_empty());
    }
}

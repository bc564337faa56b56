use crate::clock::parse_due_date;
use crate::error::AppError;
use crate::lifecycle::TaskController;
use crate::messages::{MessageKind, MessageParams, Messages};
use crate::model::TaskEdit;
use crate::pagination::{PageView, next_page, prev_page};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use time::UtcOffset;
use tracing::{error, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingDescription,
    AwaitingDueDate {
        description: String,
    },
    AwaitingNewDescription {
        task_id: u64,
    },
    AwaitingNewDueDate {
        task_id: u64,
        description: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub state: SessionState,
    pub page: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    AddTask,
    ViewTasks,
    Cancel,
    Text(String),
    /// Raw button payload, parsed into a [`Callback`].
    Callback(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    Update(u64),
    Delete(u64),
    MarkDone(u64),
    NextPage,
    PrevPage,
    PageInfo,
}

impl Callback {
    pub fn data(&self) -> String {
        match self {
            Self::Update(id) => format!("update_{id}"),
            Self::Delete(id) => format!("delete_{id}"),
            Self::MarkDone(id) => format!("mark_done_{id}"),
            Self::NextPage => "next_page".to_string(),
            Self::PrevPage => "prev_page".to_string(),
            Self::PageInfo => "page_info".to_string(),
        }
    }
}

impl FromStr for Callback {
    type Err = AppError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let data = data.trim();
        match data {
            "next_page" => return Ok(Self::NextPage),
            "prev_page" => return Ok(Self::PrevPage),
            "page_info" => return Ok(Self::PageInfo),
            _ => {}
        }

        let parse_id = |raw: &str| {
            raw.parse::<u64>().map_err(|_| {
                AppError::invalid_input(format!("invalid task id in callback: {data}"))
            })
        };

        if let Some(raw) = data.strip_prefix("mark_done_") {
            Ok(Self::MarkDone(parse_id(raw)?))
        } else if let Some(raw) = data.strip_prefix("update_") {
            Ok(Self::Update(parse_id(raw)?))
        } else if let Some(raw) = data.strip_prefix("delete_") {
            Ok(Self::Delete(parse_id(raw)?))
        } else {
            Err(AppError::invalid_input(format!("unknown callback: {data}")))
        }
    }
}

/// Buttons shown under a task view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskKeyboard {
    pub task_id: u64,
    pub page_label: String,
}

impl TaskKeyboard {
    pub fn actions(&self) -> [Callback; 3] {
        [
            Callback::Update(self.task_id),
            Callback::Delete(self.task_id),
            Callback::MarkDone(self.task_id),
        ]
    }

    pub fn navigation(&self) -> [Callback; 3] {
        [Callback::PrevPage, Callback::PageInfo, Callback::NextPage]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub keyboard: Option<TaskKeyboard>,
}

/// Per-owner dialog sessions over a [`TaskController`].
pub struct Conversation {
    controller: Arc<TaskController>,
    messages: Arc<Messages>,
    offset: UtcOffset,
    sessions: HashMap<String, Session>,
}

impl Conversation {
    /// `offset` is the zone user-typed `YYYY-MM-DD-HH` dates are read in.
    pub fn new(
        controller: Arc<TaskController>,
        messages: Arc<Messages>,
        offset: UtcOffset,
    ) -> Self {
        Self {
            controller,
            messages,
            offset,
            sessions: HashMap::new(),
        }
    }

    pub fn session(&self, owner_id: &str) -> Session {
        self.sessions.get(owner_id).cloned().unwrap_or_default()
    }

    /// Handles one chat event. Task errors become user-facing replies; only a
    /// template failure is returned as an error.
    pub fn handle(&mut self, owner_id: &str, input: Input) -> Result<Vec<Reply>, AppError> {
        match self.dispatch(owner_id, input) {
            Ok(replies) => Ok(replies),
            Err(err) => {
                let kind = match &err {
                    AppError::PastDate => MessageKind::PastDate,
                    AppError::NotFound(_) => {
                        self.reset(owner_id);
                        MessageKind::NotFound
                    }
                    AppError::InvalidInput(_) => MessageKind::IncorrectData,
                    _ => {
                        error!(owner_id, error = %err, "chat request failed");
                        MessageKind::OperationFailed
                    }
                };
                Ok(vec![self.text(kind, &MessageParams::none())?])
            }
        }
    }

    fn dispatch(&mut self, owner_id: &str, input: Input) -> Result<Vec<Reply>, AppError> {
        match input {
            Input::Start => Ok(vec![
                self.plain(MessageKind::Welcome)?,
                self.plain(MessageKind::ChooseAction)?,
            ]),
            Input::AddTask => {
                self.set_state(owner_id, SessionState::AwaitingDescription);
                Ok(vec![self.plain(MessageKind::EnterTaskDescription)?])
            }
            Input::ViewTasks => Ok(vec![self.current_page(owner_id)?]),
            Input::Cancel => {
                self.reset(owner_id);
                Ok(vec![self.plain(MessageKind::Cancelled)?])
            }
            Input::Text(text) => self.on_text(owner_id, &text),
            Input::Callback(data) => {
                let callback = data.parse::<Callback>().inspect_err(|err| {
                    warn!(owner_id, error = %err, "rejected callback payload");
                })?;
                self.on_callback(owner_id, callback)
            }
        }
    }

    fn on_text(&mut self, owner_id: &str, text: &str) -> Result<Vec<Reply>, AppError> {
        let text = text.trim();
        match self.session(owner_id).state {
            SessionState::Idle => Ok(vec![self.plain(MessageKind::ChooseAction)?]),
            SessionState::AwaitingDescription => {
                if text.is_empty() {
                    return Ok(vec![self.plain(MessageKind::EnterTaskDescription)?]);
                }
                self.set_state(
                    owner_id,
                    SessionState::AwaitingDueDate {
                        description: text.to_string(),
                    },
                );
                Ok(vec![self.plain(MessageKind::EnterDueDate)?])
            }
            SessionState::AwaitingDueDate { description } => {
                let Some(due_date) = self.parse_date(owner_id, text) else {
                    return Ok(vec![self.plain(MessageKind::InvalidDateFormat)?]);
                };
                let task = self.controller.add_task(owner_id, &description, due_date)?;
                self.reset(owner_id);
                Ok(vec![self.text(MessageKind::TaskAdded, &MessageParams::for_task(&task))?])
            }
            SessionState::AwaitingNewDescription { task_id } => {
                if text.is_empty() {
                    return Ok(vec![self.plain(MessageKind::EnterNewTaskDescription)?]);
                }
                self.set_state(
                    owner_id,
                    SessionState::AwaitingNewDueDate {
                        task_id,
                        description: text.to_string(),
                    },
                );
                Ok(vec![self.plain(MessageKind::EnterNewDueDate)?])
            }
            SessionState::AwaitingNewDueDate {
                task_id,
                description,
            } => {
                let Some(due_date) = self.parse_date(owner_id, text) else {
                    return Ok(vec![self.plain(MessageKind::InvalidDateFormat)?]);
                };
                let edit = TaskEdit {
                    description: Some(description),
                    due_date: Some(due_date),
                };
                let task = self.controller.update_task(owner_id, task_id, edit)?;
                self.reset(owner_id);
                Ok(vec![self.text(MessageKind::TaskUpdated, &MessageParams::for_task(&task))?])
            }
        }
    }

    fn on_callback(&mut self, owner_id: &str, callback: Callback) -> Result<Vec<Reply>, AppError> {
        match callback {
            Callback::Update(task_id) => {
                self.controller.get_task(owner_id, task_id)?;
                self.set_state(owner_id, SessionState::AwaitingNewDescription { task_id });
                Ok(vec![self.plain(MessageKind::EnterNewTaskDescription)?])
            }
            Callback::MarkDone(task_id) => {
                let task = self.controller.mark_done(owner_id, task_id)?;
                Ok(vec![
                    self.text(MessageKind::TaskDone, &MessageParams::for_task(&task))?,
                    self.current_page(owner_id)?,
                ])
            }
            Callback::Delete(task_id) => {
                let task = self.controller.delete_task(owner_id, task_id)?;
                Ok(vec![
                    self.text(MessageKind::TaskDeleted, &MessageParams::for_task(&task))?,
                    self.current_page(owner_id)?,
                ])
            }
            Callback::NextPage | Callback::PrevPage => {
                let total = self.controller.list_tasks(owner_id)?.len();
                if total < 2 {
                    return Ok(vec![self.plain(MessageKind::TaskListWarning)?]);
                }
                let session = self.sessions.entry(owner_id.to_string()).or_default();
                session.page = if callback == Callback::NextPage {
                    next_page(session.page, total)
                } else {
                    prev_page(session.page, total)
                };
                Ok(vec![self.current_page(owner_id)?])
            }
            Callback::PageInfo => Ok(Vec::new()),
        }
    }

    fn current_page(&mut self, owner_id: &str) -> Result<Reply, AppError> {
        let page = self.session(owner_id).page;
        let view = self.controller.view_page(owner_id, page)?;
        let label = view.label().unwrap_or_default();
        match view {
            PageView::Empty => {
                self.sessions.entry(owner_id.to_string()).or_default().page = 0;
                self.plain(MessageKind::NoTasks)
            }
            PageView::Page { task, index, total } => {
                self.sessions.entry(owner_id.to_string()).or_default().page = index as i64;
                let text = self.messages.render(
                    MessageKind::TaskView,
                    &MessageParams::for_page(&task, index, total),
                )?;
                Ok(Reply {
                    text,
                    keyboard: Some(TaskKeyboard {
                        task_id: task.id,
                        page_label: label,
                    }),
                })
            }
        }
    }

    fn parse_date(&self, owner_id: &str, text: &str) -> Option<time::OffsetDateTime> {
        match parse_due_date(text, self.offset) {
            Ok(due_date) => Some(due_date),
            Err(err) => {
                warn!(owner_id, input = text, error = %err, "unparseable due date");
                None
            }
        }
    }

    fn set_state(&mut self, owner_id: &str, state: SessionState) {
        self.sessions.entry(owner_id.to_string()).or_default().state = state;
    }

    fn reset(&mut self, owner_id: &str) {
        self.set_state(owner_id, SessionState::Idle);
    }

    fn plain(&self, kind: MessageKind) -> Result<Reply, AppError> {
        self.text(kind, &MessageParams::none())
    }

    fn text(&self, kind: MessageKind, params: &MessageParams) -> Result<Reply, AppError> {
        Ok(Reply {
            text: self.messages.render(kind, params)?,
            keyboard: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Callback, Conversation, Input, SessionState};
    use crate::clock::FixedClock;
    use crate::lifecycle::TaskController;
    use crate::messages::{MessageKind, MessageParams, Messages};
    use crate::scheduler::MemoryJobRunner;
    use crate::storage::{MemoryTaskStore, TaskStore};
    use std::sync::Arc;
    use time::UtcOffset;
    use time::macros::datetime;

    struct Fixture {
        store: Arc<MemoryTaskStore>,
        runner: Arc<MemoryJobRunner>,
        messages: Arc<Messages>,
        chat: Conversation,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryTaskStore::new());
        let runner = Arc::new(MemoryJobRunner::new());
        let clock = Arc::new(FixedClock::new(datetime!(2025-01-01 09:00 UTC)));
        let controller = Arc::new(TaskController::new(store.clone(), runner.clone(), clock));
        let messages = Arc::new(Messages::new().unwrap());
        let chat = Conversation::new(controller, messages.clone(), UtcOffset::UTC);
        Fixture {
            store,
            runner,
            messages,
            chat,
        }
    }

    fn say(fx: &mut Fixture, input: Input) -> Vec<String> {
        fx.chat
            .handle("chat-1", input)
            .unwrap()
            .into_iter()
            .map(|reply| reply.text)
            .collect()
    }

    fn message(fx: &Fixture, kind: MessageKind) -> String {
        fx.messages.render(kind, &MessageParams::none()).unwrap()
    }

    fn add(fx: &mut Fixture, description: &str, due: &str) {
        say(fx, Input::AddTask);
        say(fx, Input::Text(description.to_string()));
        say(fx, Input::Text(due.to_string()));
    }

    #[test]
    fn callback_data_parses() {
        assert_eq!("update_3".parse::<Callback>().unwrap(), Callback::Update(3));
        assert_eq!("delete_12".parse::<Callback>().unwrap(), Callback::Delete(12));
        assert_eq!("mark_done_7".parse::<Callback>().unwrap(), Callback::MarkDone(7));
        assert_eq!("next_page".parse::<Callback>().unwrap(), Callback::NextPage);
        assert_eq!(Callback::MarkDone(7).data(), "mark_done_7");
        assert!("delete_x".parse::<Callback>().is_err());
        assert!("launch".parse::<Callback>().is_err());
    }

    #[test]
    fn add_dialog_creates_task_and_resets() {
        let mut fx = fixture();

        let replies = say(&mut fx, Input::AddTask);
        assert_eq!(replies, vec![message(&fx, MessageKind::EnterTaskDescription)]);
        assert_eq!(fx.chat.session("chat-1").state, SessionState::AwaitingDescription);

        say(&mut fx, Input::Text("Pay bills".to_string()));
        let replies = say(&mut fx, Input::Text("2025-01-10-09".to_string()));

        assert_eq!(replies.len(), 1);
        assert!(replies[0].contains("Pay bills"));
        assert!(replies[0].contains("2025-01-10 09:00"));
        assert_eq!(fx.chat.session("chat-1").state, SessionState::Idle);
        assert_eq!(fx.store.len(), 1);
        assert_eq!(
            fx.runner.live_jobs()[0].fire_at,
            datetime!(2025-01-09 09:00 UTC)
        );
    }

    #[test]
    fn bad_or_past_date_keeps_waiting() {
        let mut fx = fixture();
        say(&mut fx, Input::AddTask);
        say(&mut fx, Input::Text("Pay bills".to_string()));

        let replies = say(&mut fx, Input::Text("tomorrow-ish".to_string()));
        assert_eq!(replies, vec![message(&fx, MessageKind::InvalidDateFormat)]);

        let replies = say(&mut fx, Input::Text("2025-01-01-08".to_string()));
        assert_eq!(replies, vec![message(&fx, MessageKind::PastDate)]);
        assert!(fx.store.is_empty());
        assert!(matches!(
            fx.chat.session("chat-1").state,
            SessionState::AwaitingDueDate { .. }
        ));

        say(&mut fx, Input::Text("2025-01-02-08".to_string()));
        assert_eq!(fx.store.len(), 1);
    }

    #[test]
    fn view_tasks_on_empty_list() {
        let mut fx = fixture();
        let replies = fx.chat.handle("chat-1", Input::ViewTasks).unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, message(&fx, MessageKind::NoTasks));
        assert_eq!(replies[0].keyboard, None);
    }

    #[test]
    fn paging_wraps_and_warns_on_single_task() {
        let mut fx = fixture();
        add(&mut fx, "first", "2025-01-10-09");

        let replies = say(&mut fx, Input::Callback("next_page".to_string()));
        assert_eq!(replies, vec![message(&fx, MessageKind::TaskListWarning)]);

        add(&mut fx, "second", "2025-01-11-09");
        let replies = fx
            .chat
            .handle("chat-1", Input::Callback("prev_page".to_string()))
            .unwrap();
        assert!(replies[0].text.contains("second"));
        let keyboard = replies[0].keyboard.clone().unwrap();
        assert_eq!(keyboard.page_label, "2/2");

        let replies = say(&mut fx, Input::Callback("next_page".to_string()));
        assert!(replies[0].contains("first"));
    }

    #[test]
    fn update_dialog_rearms_reminder() {
        let mut fx = fixture();
        add(&mut fx, "Pay bills", "2025-01-10-09");
        let task_id = fx.store.list_for_owner("chat-1").unwrap()[0].id;

        say(&mut fx, Input::Callback(format!("update_{task_id}")));
        say(&mut fx, Input::Text("Pay all bills".to_string()));
        let replies = say(&mut fx, Input::Text("2025-01-05-09".to_string()));

        assert!(replies[0].contains("Pay all bills"));
        let live = fx.runner.live_jobs();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].fire_at, datetime!(2025-01-04 09:00 UTC));
        assert_eq!(fx.runner.aborted().len(), 1);
    }

    #[test]
    fn delete_and_done_callbacks() {
        let mut fx = fixture();
        add(&mut fx, "Pay bills", "2025-01-10-09");
        let task_id = fx.store.list_for_owner("chat-1").unwrap()[0].id;

        let replies = say(&mut fx, Input::Callback(format!("mark_done_{task_id}")));
        assert_eq!(replies[0], "Task marked as done: Pay bills");
        assert!(replies[1].ends_with("Status: done"));

        let replies = say(&mut fx, Input::Callback(format!("delete_{task_id}")));
        assert_eq!(
            replies,
            vec![
                "Task deleted: Pay bills".to_string(),
                message(&fx, MessageKind::NoTasks)
            ]
        );
        assert!(fx.store.is_empty());
        assert!(fx.runner.live_jobs().is_empty());

        let replies = say(&mut fx, Input::Callback(format!("delete_{task_id}")));
        assert_eq!(replies, vec![message(&fx, MessageKind::NotFound)]);
    }

    #[test]
    fn malformed_callback_is_rejected() {
        let mut fx = fixture();
        let replies = say(&mut fx, Input::Callback("delete_".to_string()));
        assert_eq!(replies, vec![message(&fx, MessageKind::IncorrectData)]);
    }

    #[test]
    fn cancel_resets_dialog() {
        let mut fx = fixture();
        say(&mut fx, Input::AddTask);
        say(&mut fx, Input::Text("half done".to_string()));

        let replies = say(&mut fx, Input::Cancel);
        assert_eq!(replies, vec![message(&fx, MessageKind::Cancelled)]);
        assert_eq!(fx.chat.session("chat-1").state, SessionState::Idle);
        assert!(fx.store.is_empty());
    }
}

use clap::{CommandFactory, Parser};
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use taskbot_cli::cli::{Cli, Command, collect_config_overrides, parse_chat_line};
use taskbot_core::clock::{
    Clock, FixedClock, SystemClock, format_due_date, local_offset, parse_due_date,
};
use taskbot_core::config::{Config, load_config_with_fallback, merge_overrides};
use taskbot_core::conversation::{Conversation, Reply};
use taskbot_core::error::AppError;
use taskbot_core::lifecycle::TaskController;
use taskbot_core::messages::Messages;
use taskbot_core::model::{Task, TaskEdit};
use taskbot_core::notify::{Notifier, StdoutNotifier, notifier_from_env};
use taskbot_core::pagination::PageView;
use taskbot_core::scheduler::{FileJobQueue, FireOutcome, ReminderWorker};
use taskbot_core::storage::JsonTaskStore;
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};
use tracing::{info, warn};

const NOW_ENV_VAR: &str = "TASKBOT_NOW";
const LOG_ENV_VAR: &str = "TASKBOT_LOG";

struct App {
    config: Config,
    store: Arc<JsonTaskStore>,
    jobs: Arc<FileJobQueue>,
    clock: Arc<dyn Clock>,
    offset: UtcOffset,
    controller: Arc<TaskController>,
}

impl App {
    fn build(raw_overrides: &[String]) -> Result<Self, AppError> {
        let overrides = collect_config_overrides(raw_overrides)?;
        let load = load_config_with_fallback();
        let config = merge_overrides(&load.config, &overrides);
        init_logging(&config);
        if let Some(err) = load.error {
            warn!(error = %err, "config file ignored, using defaults");
        }
        config.validate()?;

        let (clock, offset) = clock_from_env()?;
        let store = Arc::new(JsonTaskStore::new(config.store_path()?));
        let jobs = Arc::new(FileJobQueue::new(config.jobs_path()?));
        let controller = Arc::new(
            TaskController::new(store.clone(), jobs.clone(), clock.clone())
                .with_reminder_lead(config.reminder_lead()),
        );

        Ok(Self {
            config,
            store,
            jobs,
            clock,
            offset,
            controller,
        })
    }

    fn parse_due(&self, text: &str) -> Result<OffsetDateTime, AppError> {
        parse_due_date(text, self.offset)
    }
}

fn init_logging(config: &Config) {
    let fallback = config.log_filter.as_deref().unwrap_or("warn");
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback));

    // The REPL builds an App per line; only the first call installs a subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// A pinned `TASKBOT_NOW` also pins the zone hour-precision dates are read in.
fn clock_from_env() -> Result<(Arc<dyn Clock>, UtcOffset), AppError> {
    match std::env::var(NOW_ENV_VAR) {
        Ok(raw) if !raw.trim().is_empty() => {
            let now = OffsetDateTime::parse(raw.trim(), &Rfc3339)
                .map_err(|_| AppError::invalid_input(format!("{NOW_ENV_VAR} must be RFC3339")))?;
            Ok((Arc::new(FixedClock::new(now)), now.offset()))
        }
        _ => Ok((Arc::new(SystemClock), local_offset())),
    }
}

#[derive(Tabled)]
struct TaskRow {
    id: u64,
    description: String,
    due: String,
    status: &'static str,
    reminder: String,
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            description: task.description.clone(),
            due: format_due_date(task.due_date),
            status: task.status.as_str(),
            reminder: task
                .job_handle
                .as_ref()
                .map(|handle| handle.to_string())
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|err| AppError::invalid_data(err.to_string()))
}

fn print_task_json(task: &Task) -> Result<(), AppError> {
    println!("{}", to_json(task)?);
    Ok(())
}

fn print_tasks_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }
    let mut table = Table::new(tasks.iter().map(TaskRow::from));
    table.with(Style::psql());
    println!("{table}");
}

fn print_task_details(task: &Task) {
    println!("Task {}: {}", task.id, task.description);
    println!("Due: {}", format_due_date(task.due_date));
    println!("Status: {}", task.status.as_str());
    match &task.job_handle {
        Some(handle) => println!("Reminder job: {handle}"),
        None => println!("Reminder job: -"),
    }
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn split_command_line(line: &str) -> Result<Vec<String>, AppError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escape = false;

    for ch in line.chars() {
        if escape {
            if ch != '"' && ch != '\\' {
                current.push('\\');
            }
            current.push(ch);
            escape = false;
            continue;
        }

        if in_quotes && ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '"' {
            in_quotes = !in_quotes;
            continue;
        }

        if ch.is_whitespace() && !in_quotes {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(ch);
    }

    if in_quotes {
        return Err(AppError::invalid_input("unterminated quote in command"));
    }

    if !current.is_empty() {
        args.push(current);
    }

    Ok(args)
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

fn run_command(cli: Cli) -> Result<(), AppError> {
    let app = App::build(&cli.config_override)?;
    let owner = cli.owner.trim().to_string();
    let controller = &app.controller;

    match cli.command {
        Command::Add { description, due } => {
            let due_date = app.parse_due(&due)?;
            let task = controller.add_task(&owner, &description, due_date)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!(
                    "Added task {}: {} (due {})",
                    task.id,
                    task.description,
                    format_due_date(task.due_date)
                );
            }
        }
        Command::List => {
            let tasks = controller.list_tasks(&owner)?;
            if cli.json {
                println!("{}", to_json(&tasks)?);
            } else {
                print_tasks_table(&tasks);
            }
        }
        Command::Page { number } => {
            let view = controller.view_page(&owner, number.saturating_sub(1))?;
            let label = view.label().unwrap_or_default();
            match view {
                PageView::Empty if cli.json => println!("null"),
                PageView::Empty => println!("No tasks."),
                PageView::Page { task, .. } if cli.json => print_task_json(&task)?,
                PageView::Page { task, .. } => {
                    println!("Page {label}");
                    print_task_details(&task);
                }
            }
        }
        Command::Show { id } => {
            let task = controller.get_task(&owner, id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                print_task_details(&task);
            }
        }
        Command::Edit {
            id,
            description,
            due,
        } => {
            let due_date = due.as_deref().map(|text| app.parse_due(text)).transpose()?;
            let edit = TaskEdit {
                description,
                due_date,
            };
            let task = controller.update_task(&owner, id, edit)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!(
                    "Updated task {}: {} (due {})",
                    task.id,
                    task.description,
                    format_due_date(task.due_date)
                );
            }
        }
        Command::Done { id } => {
            let task = controller.mark_done(&owner, id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Marked task {} as done: {}", task.id, task.description);
            }
        }
        Command::Delete { id } => {
            let task = controller.delete_task(&owner, id)?;
            if cli.json {
                print_task_json(&task)?;
            } else {
                println!("Deleted task {}: {}", task.id, task.description);
            }
        }
        Command::Chat => run_chat(&app, &owner)?,
        Command::Worker { once, stdout } => run_worker(&app, once, stdout)?,
    }

    Ok(())
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text);
    if let Some(keyboard) = &reply.keyboard {
        let actions: Vec<String> = keyboard
            .actions()
            .iter()
            .map(|callback| format!("[cb:{}]", callback.data()))
            .collect();
        println!("{}", actions.join(" "));
        let [prev, _, next] = keyboard.navigation();
        println!(
            "[cb:{}] {} [cb:{}]",
            prev.data(),
            keyboard.page_label,
            next.data()
        );
    }
}

fn run_chat(app: &App, owner: &str) -> Result<(), AppError> {
    let messages = Arc::new(Messages::new()?);
    let mut conversation = Conversation::new(app.controller.clone(), messages, app.offset);
    let stdin = io::stdin();
    let mut input = String::new();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::io(err.to_string()))?;
        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        for reply in conversation.handle(owner, parse_chat_line(line))? {
            print_reply(&reply);
        }
        io::stdout()
            .flush()
            .map_err(|err| AppError::io(err.to_string()))?;
    }

    Ok(())
}

fn run_worker(app: &App, once: bool, stdout: bool) -> Result<(), AppError> {
    let notifier: Arc<dyn Notifier> = if stdout {
        Arc::new(StdoutNotifier)
    } else {
        Arc::from(notifier_from_env()?)
    };
    let worker = Arc::new(ReminderWorker::new(
        app.store.clone(),
        app.jobs.clone(),
        notifier,
        Arc::new(Messages::new()?),
        app.clock.clone(),
    ));

    if once {
        let outcomes = worker.run_once()?;
        let sent = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, FireOutcome::Sent))
            .count();
        info!(due = outcomes.len(), sent, "worker pass finished");
        println!("Processed {} reminder job(s), sent {}", outcomes.len(), sent);
        return Ok(());
    }

    let poll_interval = app.config.poll_interval();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::io(err.to_string()))?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let handle = tokio::spawn(worker.run(poll_interval, shutdown_rx));

        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "could not listen for ctrl-c");
        }
        let _ = shutdown_tx.send(true);
        handle
            .await
            .map_err(|err| AppError::scheduler(format!("worker task failed: {err}")))
    })
}

fn run_interactive() -> Result<(), AppError> {
    let mut input = String::new();
    let stdin = io::stdin();
    let mut stdin_lock = stdin.lock();

    loop {
        input.clear();
        let bytes = stdin_lock
            .read_line(&mut input)
            .map_err(|err| AppError::io(err.to_string()))?;

        if bytes == 0 {
            break;
        }

        let line = input.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        if line == "help" || line == "?" {
            print_help();
            continue;
        }

        let args = match split_command_line(line) {
            Ok(args) => args,
            Err(err) => {
                eprintln!("ERROR: {}", err);
                continue;
            }
        };

        if args.is_empty() {
            continue;
        }

        let mut argv = Vec::with_capacity(args.len() + 1);
        argv.push("taskbot".to_string());
        argv.extend(args);

        let cli = match Cli::try_parse_from(argv) {
            Ok(cli) => cli,
            Err(err) => {
                eprintln!("ERROR: {}", normalize_parse_error(err));
                continue;
            }
        };

        if matches!(cli.command, Command::Chat | Command::Worker { once: false, .. }) {
            eprintln!(
                "ERROR: {}",
                AppError::invalid_input("chat and worker must be run outside the prompt")
            );
            continue;
        }

        if let Err(err) = run_command(cli) {
            eprintln!("ERROR: {}", err);
        }
    }

    Ok(())
}

fn main() {
    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive() {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if matches!(
                err.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) {
                let _ = err.print();
                return;
            }
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli) {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}

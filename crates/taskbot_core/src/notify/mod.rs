use crate::error::AppError;
use std::io::Write;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxNotifier;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsNotifier;

pub const DISABLE_ENV_VAR: &str = "TASKBOT_DISABLE_NOTIFICATIONS";

/// Sends one rendered reminder to its owner. Callers treat a send as
/// fire-and-forget and only log failures.
pub trait Notifier: Send + Sync {
    fn send(&self, owner_id: &str, message: &str) -> Result<(), AppError>;
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn send(&self, _owner_id: &str, _message: &str) -> Result<(), AppError> {
        Ok(())
    }
}

/// Prints reminders to stdout, one line each.
pub struct StdoutNotifier;

impl Notifier for StdoutNotifier {
    fn send(&self, owner_id: &str, message: &str) -> Result<(), AppError> {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", reminder_line(owner_id, message))
            .and_then(|_| handle.flush())
            .map_err(|err| AppError::delivery(err.to_string()))
    }
}

pub fn reminder_line(owner_id: &str, message: &str) -> String {
    format!("[reminder] {owner_id}: {}", message.trim())
}

pub fn notifier_from_env() -> Result<Box<dyn Notifier>, AppError> {
    if std::env::var(DISABLE_ENV_VAR).is_ok() {
        return Ok(Box::new(NoopNotifier));
    }

    match platform_notifier() {
        Ok(notifier) => Ok(notifier),
        Err(err) => match err {
            AppError::InvalidData(_) => Ok(Box::new(NoopNotifier)),
            other => Err(other),
        },
    }
}

#[cfg(target_os = "linux")]
pub fn platform_notifier() -> Result<Box<dyn Notifier>, AppError> {
    Ok(Box::new(LinuxNotifier))
}

#[cfg(windows)]
pub fn platform_notifier() -> Result<Box<dyn Notifier>, AppError> {
    Ok(Box::new(WindowsNotifier))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_notifier() -> Result<Box<dyn Notifier>, AppError> {
    Err(AppError::invalid_data(
        "notifications are not supported on this platform",
    ))
}

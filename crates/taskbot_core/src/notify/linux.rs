use crate::error::AppError;
use crate::notify::Notifier;
use notify_rust::Notification;

pub struct LinuxNotifier;

impl Notifier for LinuxNotifier {
    fn send(&self, owner_id: &str, message: &str) -> Result<(), AppError> {
        Notification::new()
            .summary(&format!("taskbot ({owner_id})"))
            .body(message.trim())
            .show()
            .map(|_| ())
            .map_err(|err| AppError::delivery(err.to_string()))
    }
}

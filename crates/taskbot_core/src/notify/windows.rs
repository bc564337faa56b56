use crate::error::AppError;
use crate::notify::Notifier;
use tauri_winrt_notification::Toast;

pub struct WindowsNotifier;

impl Notifier for WindowsNotifier {
    fn send(&self, owner_id: &str, message: &str) -> Result<(), AppError> {
        Toast::new(Toast::POWERSHELL_APP_ID)
            .title("taskbot")
            .text1(message.trim())
            .text2(owner_id)
            .show()
            .map_err(|err| AppError::delivery(err.to_string()))
    }
}

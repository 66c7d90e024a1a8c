use crate::logger::{log_debug, log_error};
use crate::yay::command_exists;
use std::process::Command;

pub fn send_notification(title: &str, body: &str) {
    if !command_exists("notify-send") {
        log_debug(&format!(
            "Notification skipped (notify-send not found): {}: {}",
            title, body
        ));
        return;
    }

    let _ = Command::new("notify-send")
        .arg("--app-name=Yay Packer")
        .arg("--icon=system-software-install")
        .arg(title)
        .arg(body)
        .spawn()
        .map_err(|e| log_error(&format!("Failed to send notification: {}", e)));
}

pub fn completion_message(title: &str, success: bool) -> (String, String) {
    if success {
        (format!("{} finished", title), "The operation completed successfully.".to_string())
    } else {
        (
            format!("{} failed", title),
            "Open the output window for details.".to_string(),
        )
    }
}

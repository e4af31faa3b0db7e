/// Native message dialogs for errors and confirmations
use anyhow::{Context, Result};
use rfd::{MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use std::path::Path;

use crate::error::LauncherError;

/// Show a launcher error to the user
pub fn show_error(error: &LauncherError) {
    MessageDialog::new()
        .set_level(MessageLevel::Error)
        .set_title(error.dialog_title())
        .set_description(error.to_string())
        .set_buttons(MessageButtons::Ok)
        .show();
}

pub fn another_instance_prompt(display_name: &str) -> String {
    format!(
        "{} is already running.\n\nDo you want to launch another instance?",
        display_name
    )
}

pub fn exit_prompt(running_count: usize) -> String {
    format!(
        "There are {} tool(s) still running.\n\nExiting will close all of them. Exit anyway?",
        running_count
    )
}

/// Ask before starting a second copy of a running tool
pub fn confirm_another_instance(display_name: &str) -> bool {
    let result = MessageDialog::new()
        .set_level(MessageLevel::Info)
        .set_title("Tool Running")
        .set_description(another_instance_prompt(display_name))
        .set_buttons(MessageButtons::YesNo)
        .show();

    matches!(result, MessageDialogResult::Yes)
}

/// Ask before exiting while tools are still open
pub fn confirm_exit(running_count: usize) -> bool {
    if running_count == 0 {
        return true;
    }

    let result = MessageDialog::new()
        .set_level(MessageLevel::Warning)
        .set_title("Exit PDF Toolbox")
        .set_description(exit_prompt(running_count))
        .set_buttons(MessageButtons::YesNo)
        .show();

    matches!(result, MessageDialogResult::Yes)
}

/// Reveal a folder in the platform file manager, creating it first
pub fn open_folder(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    open::that(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompts() {
        assert!(another_instance_prompt("PDF OCR").starts_with("PDF OCR is already running."));
        assert!(exit_prompt(2).contains("2 tool(s) still running"));
    }
}

//! Clipboard access for pasting links

use crate::utils::error::TubeloaderError;
use arboard::Clipboard;

/// Get clipboard text content
pub fn get_clipboard_content() -> Result<String, TubeloaderError> {
    let mut clipboard = Clipboard::new()
        .map_err(|e| TubeloaderError::Clipboard(format!("Failed to access clipboard: {}", e)))?;

    clipboard
        .get_text()
        .map_err(|e| TubeloaderError::Clipboard(format!("Failed to read clipboard: {}", e)))
}

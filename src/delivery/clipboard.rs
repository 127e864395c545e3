use arboard::Clipboard;
use std::path::Path;
use tracing::debug;

use super::DeliveryError;

/// Replace the system clipboard contents with `text`, verbatim.
///
/// # Errors
/// [`DeliveryError::Clipboard`] when no clipboard is reachable (e.g. no
/// display server).
pub fn copy_to_clipboard(text: &str) -> Result<(), DeliveryError> {
    let mut clipboard = Clipboard::new()?;
    clipboard.set_text(text)?;
    debug!(text_len = text.len(), "clipboard updated");
    Ok(())
}

/// Overwrite the debug transcript file with this delivery's text.
///
/// # Errors
/// [`DeliveryError::Transcript`] if the file cannot be written.
pub fn write_transcript(text: &str, path: &Path) -> Result<(), DeliveryError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(DeliveryError::Transcript)?;
    }
    std::fs::write(path, text).map_err(DeliveryError::Transcript)?;
    debug!(path = %path.display(), "transcript mirrored");
    Ok(())
}

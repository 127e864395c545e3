use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::{DeliveryConfig, DeliveryMode};
use crate::text;

/// System clipboard delivery
pub mod clipboard;
/// Simulated-typing delivery
pub mod keystroke;

pub use keystroke::TypingInjector;

/// Text delivery errors
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The typing injector process could not be spawned or controlled
    #[error("typing injector failed: {0}")]
    Injector(#[source] std::io::Error),

    /// The system clipboard could not be reached
    #[error("clipboard unavailable: {0}")]
    Clipboard(#[from] arboard::Error),

    /// The debug transcript file could not be written
    #[error("transcript write failed: {0}")]
    Transcript(#[source] std::io::Error),
}

/// Routes transcriptions to their configured destination.
///
/// Delivery failures never abort a recording session: speech capture
/// already succeeded, so errors are surfaced through [`Self::deliver_safe`]
/// as logs and the loop moves on.
pub struct TextDelivery {
    mode: DeliveryMode,
    strip_punctuation: bool,
    transcript_path: Option<PathBuf>,
    injector: TypingInjector,
}

impl TextDelivery {
    /// Builds a delivery pipeline from config, expanding the transcript path.
    ///
    /// # Errors
    /// Returns error if the transcript path cannot be expanded.
    pub fn new(config: &DeliveryConfig) -> anyhow::Result<Self> {
        let transcript_path = match (&config.mode, &config.transcript_path) {
            (DeliveryMode::Clipboard, Some(path)) => {
                Some(crate::config::Config::expand_path(path)?)
            }
            _ => None,
        };

        Ok(Self {
            mode: config.mode,
            strip_punctuation: config.strips_punctuation(),
            transcript_path,
            injector: TypingInjector::new(config.type_delay_ms),
        })
    }

    /// Apply the punctuation policy to a transcription.
    #[must_use]
    fn prepare(&self, transcription: &str) -> String {
        if self.strip_punctuation {
            text::strip_punctuation(transcription)
        } else {
            transcription.to_owned()
        }
    }

    /// Deliver one transcription to the configured destination.
    ///
    /// # Errors
    /// Returns [`DeliveryError`] when the destination is unreachable.
    pub fn deliver(&mut self, transcription: &str) -> Result<(), DeliveryError> {
        if transcription.trim().is_empty() {
            debug!("empty transcription, nothing to deliver");
            return Ok(());
        }

        let prepared = self.prepare(transcription);

        match self.mode {
            DeliveryMode::Keystroke => self.injector.type_text(&prepared)?,
            DeliveryMode::Clipboard => {
                clipboard::copy_to_clipboard(&prepared)?;
                if let Some(path) = &self.transcript_path {
                    clipboard::write_transcript(&prepared, path)?;
                }
            }
        }

        info!(
            text_len = prepared.len(),
            text_preview = %text::preview(&prepared),
            mode = ?self.mode,
            "transcription delivered"
        );

        Ok(())
    }

    /// Attempts delivery, logging errors without propagating them.
    ///
    /// This is the capture loop's interface: a dead notifier daemon or a
    /// missing typing tool must not end the recording session.
    pub fn deliver_safe(&mut self, transcription: &str) -> bool {
        match self.deliver(transcription) {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, text_len = transcription.len(), "delivery failed");
                false
            }
        }
    }

    /// Terminate any in-flight typing injector.
    pub fn shutdown(&mut self) {
        self.injector.shutdown();
    }
}

impl Drop for TextDelivery {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delivery(mode: DeliveryMode, strip: Option<bool>) -> TextDelivery {
        TextDelivery {
            mode,
            strip_punctuation: strip.unwrap_or(mode == DeliveryMode::Keystroke),
            transcript_path: None,
            injector: TypingInjector::new(1),
        }
    }

    #[test]
    fn test_keystroke_text_is_stripped() {
        let delivery = delivery(DeliveryMode::Keystroke, None);
        assert_eq!(delivery.prepare("Hello, world!"), "Hello world");
    }

    #[test]
    fn test_clipboard_text_is_verbatim() {
        let delivery = delivery(DeliveryMode::Clipboard, None);
        assert_eq!(delivery.prepare("Hello, world!"), "Hello, world!");
    }

    #[test]
    fn test_strip_override_applies_to_clipboard() {
        let delivery = delivery(DeliveryMode::Clipboard, Some(true));
        assert_eq!(delivery.prepare("Hello, world!"), "Hello world");
    }

    #[test]
    fn test_empty_transcription_is_skipped() {
        let mut delivery = delivery(DeliveryMode::Keystroke, None);

        // No injector process should spawn for blank text
        assert!(delivery.deliver("").is_ok());
        assert!(delivery.deliver("   \n").is_ok());
    }

    #[test]
    fn test_deliver_safe_never_panics() {
        // Destination may be unavailable in a headless environment; the
        // safe wrapper must swallow that either way
        let mut delivery = delivery(DeliveryMode::Clipboard, None);
        let _ = delivery.deliver_safe("Hello, world!");
    }

    #[test]
    fn test_new_resolves_transcript_path_for_clipboard_only() {
        let config = DeliveryConfig {
            mode: DeliveryMode::Keystroke,
            strip_punctuation: None,
            type_delay_ms: 1,
            transcript_path: Some("~/.whisper-toggle/transcript.txt".to_owned()),
        };
        let delivery = TextDelivery::new(&config).unwrap();
        assert!(delivery.transcript_path.is_none());

        let config = DeliveryConfig {
            mode: DeliveryMode::Clipboard,
            ..config
        };
        let delivery = TextDelivery::new(&config).unwrap();
        assert!(delivery.transcript_path.is_some());
    }
}

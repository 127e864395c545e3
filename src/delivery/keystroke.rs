use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

use super::DeliveryError;

/// Text-input simulator binary.
const TYPING_COMMAND: &str = "xdotool";

/// Build the injector invocation for one transcription window (pure, testable)
fn build_args(delay_ms: u64, text: &str) -> Vec<String> {
    vec![
        "type".to_owned(),
        "--delay".to_owned(),
        delay_ms.to_string(),
        text.to_owned(),
    ]
}

/// Spawns the text-input simulator as a background child per window.
///
/// Typing runs concurrently with the next capture window; only one child is
/// tracked at a time, and a child still typing when the next window lands
/// is killed first so two windows never interleave keystrokes.
pub struct TypingInjector {
    program: String,
    delay_ms: u64,
    in_flight: Option<Child>,
}

impl TypingInjector {
    #[must_use]
    pub fn new(delay_ms: u64) -> Self {
        Self {
            program: TYPING_COMMAND.to_owned(),
            delay_ms,
            in_flight: None,
        }
    }

    #[cfg(test)]
    fn with_program(program: &str, delay_ms: u64) -> Self {
        Self {
            program: program.to_owned(),
            delay_ms,
            in_flight: None,
        }
    }

    /// Simulate typing `text` into the focused window.
    ///
    /// # Errors
    /// [`DeliveryError::Injector`] if the simulator cannot be spawned.
    pub fn type_text(&mut self, text: &str) -> Result<(), DeliveryError> {
        self.reap_in_flight();

        let child = Command::new(&self.program)
            .args(build_args(self.delay_ms, text))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(DeliveryError::Injector)?;

        debug!(pid = child.id(), text_len = text.len(), "typing injector spawned");
        self.in_flight = Some(child);
        Ok(())
    }

    /// Clear a finished child; kill one that is still typing.
    fn reap_in_flight(&mut self) {
        if let Some(mut child) = self.in_flight.take() {
            match child.try_wait() {
                Ok(Some(status)) => debug!(status = %status, "previous injector finished"),
                Ok(None) => {
                    warn!(pid = child.id(), "previous injector still typing, killing it");
                    let _ = child.kill();
                    let _ = child.wait();
                }
                Err(e) => warn!(error = %e, "failed to poll previous injector"),
            }
        }
    }

    /// Forcibly terminate the in-flight child, if any.
    pub fn shutdown(&mut self) {
        if let Some(mut child) = self.in_flight.take() {
            if matches!(child.try_wait(), Ok(None)) {
                info!(pid = child.id(), "terminating in-flight typing injector");
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

/// Kill injector processes from another toggle invocation.
///
/// The stop toggle runs in its own process and holds no [`Child`] handle
/// for the capturing invocation's injector, so it reaches for pkill the
/// way the lock file reaches across processes. Failure is non-fatal.
pub fn terminate_stray_injectors() {
    let result = Command::new("pkill")
        .arg(TYPING_COMMAND)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match result {
        // pkill exits 1 when nothing matched, which is the common case
        Ok(status) => debug!(status = %status, "stray injector sweep complete"),
        Err(e) => warn!(error = %e, "pkill unavailable, stray injectors not swept"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_shape() {
        let args = build_args(1, "Hello world");
        assert_eq!(args, vec!["type", "--delay", "1", "Hello world"]);
    }

    #[test]
    fn test_build_args_uses_configured_delay() {
        let args = build_args(25, "hi");
        assert_eq!(args[2], "25");
    }

    #[test]
    fn test_spawn_failure_is_injector_error() {
        let mut injector = TypingInjector::with_program("whisper-toggle-no-such-tool", 1);

        let result = injector.type_text("hello");

        assert!(matches!(result, Err(DeliveryError::Injector(_))));
        assert!(injector.in_flight.is_none());
    }

    #[test]
    fn test_spawn_tracks_child() {
        // `true` exits immediately regardless of arguments
        let mut injector = TypingInjector::with_program("true", 1);

        injector.type_text("hello").unwrap();
        assert!(injector.in_flight.is_some());

        // Reap happens on the next send
        injector.type_text("world").unwrap();
        injector.shutdown();
        assert!(injector.in_flight.is_none());
    }

    #[test]
    fn test_shutdown_without_child_is_noop() {
        let mut injector = TypingInjector::with_program("true", 1);
        injector.shutdown();
        injector.shutdown();
    }

    #[test]
    fn test_shutdown_reaps_finished_child() {
        let mut injector = TypingInjector::with_program("true", 1);
        injector.type_text("hello").unwrap();

        // Give the child a moment to exit, then shut down cleanly
        std::thread::sleep(std::time::Duration::from_millis(50));
        injector.shutdown();
        assert!(injector.in_flight.is_none());
    }
}

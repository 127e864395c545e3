use std::process::{Command, Stdio};
use tracing::debug;

use crate::config::NotificationConfig;

/// Desktop notifications for recording state transitions.
///
/// Notifications are advisory: a missing notifier binary or daemon never
/// fails the toggle, so every error path here is log-and-continue.
#[derive(Debug, Clone)]
pub struct Notifier {
    enabled: bool,
    command: String,
}

impl Notifier {
    #[must_use]
    pub fn new(config: &NotificationConfig) -> Self {
        Self {
            enabled: config.enabled,
            command: config.command.clone(),
        }
    }

    /// Fire a notification and forget it.
    pub fn notify(&self, title: &str, body: &str) {
        if !self.enabled {
            return;
        }

        let spawned = Command::new(&self.command)
            .arg(title)
            .arg(body)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(_) => debug!(command = %self.command, title = title, "notification sent"),
            Err(e) => debug!(command = %self.command, error = %e, "notifier unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool, command: &str) -> NotificationConfig {
        NotificationConfig {
            enabled,
            command: command.to_owned(),
        }
    }

    #[test]
    fn test_disabled_notifier_spawns_nothing() {
        let notifier = Notifier::new(&config(false, "definitely-not-a-binary"));
        // Must not panic or error even with a bogus command
        notifier.notify("Listening Active", "Speech recognition has started.");
    }

    #[test]
    fn test_missing_notifier_binary_is_ignored() {
        let notifier = Notifier::new(&config(true, "whisper-toggle-no-such-notifier"));
        // Spawn failure is swallowed; the toggle flow never sees it
        notifier.notify("Listening Deactive", "Speech recognition has stopped.");
    }

    #[test]
    fn test_notify_with_true_binary() {
        // `true` accepts any arguments and exits 0, standing in for notify-send
        let notifier = Notifier::new(&config(true, "true"));
        notifier.notify("Listening Active", "Speech recognition has started.");
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub capture: CaptureConfig,
    pub delivery: DeliveryConfig,
    pub storage: StorageConfig,
    pub model: ModelConfig,
    pub notification: NotificationConfig,
    pub telemetry: TelemetryConfig,
    pub recording: RecordingConfig,
}

/// How captured audio is grouped into transcription units.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Fixed-duration windows, each flushed and transcribed while recording continues.
    Windowed,
    /// One continuous buffer, flushed and transcribed once at stop.
    Session,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    pub mode: CaptureMode,
    pub window_secs: u64,
    pub sample_rate: u32,
    /// Abort the capture loop if the device delivers no samples for this long.
    pub stall_timeout_secs: u64,
}

/// Where transcribed text ends up.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Simulated typing into the focused window.
    Keystroke,
    /// System clipboard.
    Clipboard,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
    /// Remove non-word, non-space characters before delivery.
    /// Unset: strip for keystroke delivery, keep verbatim for clipboard.
    pub strip_punctuation: Option<bool>,
    /// Per-keystroke delay passed to the injector, in milliseconds.
    pub type_delay_ms: u64,
    /// Mirror each clipboard delivery into this file when set.
    pub transcript_path: Option<String>,
}

impl DeliveryConfig {
    /// Resolve the punctuation option against the mode default.
    #[must_use]
    pub fn strips_punctuation(&self) -> bool {
        self.strip_punctuation
            .unwrap_or(self.mode == DeliveryMode::Keystroke)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub lock_path: String,
    pub audio_path: String,
}

/// Speed/accuracy trade-off fixed at process start.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelProfile {
    Fast,
    Accurate,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub profile: ModelProfile,
    pub auto_download: bool,
    /// Abort a transcription pass after this many seconds (0 = unbounded).
    pub timeout_secs: u64,
    pub fast: ModelSpec,
    pub accurate: ModelSpec,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSpec {
    pub name: String,
    pub path: String,
    pub threads: usize,
    pub beam_size: usize,
    pub language: Option<String>,
}

impl ModelConfig {
    /// The model parameters selected by the configured profile.
    #[must_use]
    pub fn active(&self) -> &ModelSpec {
        match self.profile {
            ModelProfile::Fast => &self.fast,
            ModelProfile::Accurate => &self.accurate,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Notifier binary, e.g. notify-send or dunstify.
    pub command: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub log_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordingConfig {
    /// Keep a timestamped copy of each flushed WAV under the archive directory.
    pub enabled: bool,
    pub retention_days: u32,
    pub max_count: usize,
}

impl Config {
    /// Load config from ~/.whisper-toggle.toml
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default(&config_path).context("failed to create default config")?;
        }

        let contents = fs::read_to_string(&config_path).context("failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("failed to parse config TOML")?;

        Ok(config)
    }

    fn config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME").context("HOME environment variable not set")?;
        Ok(PathBuf::from(home).join(".whisper-toggle.toml"))
    }

    fn create_default(path: &PathBuf) -> Result<()> {
        fs::write(path, DEFAULT_CONFIG).context("failed to write default config")?;
        Ok(())
    }

    /// Expand ~ in paths to home directory
    pub fn expand_path(path: &str) -> Result<PathBuf> {
        if let Some(stripped) = path.strip_prefix("~/") {
            let home = std::env::var("HOME").context("HOME environment variable not set")?;
            Ok(PathBuf::from(home).join(stripped))
        } else {
            Ok(PathBuf::from(path))
        }
    }
}

const DEFAULT_CONFIG: &str = r#"[capture]
mode = "windowed"
window_secs = 5
sample_rate = 16000
stall_timeout_secs = 10

[delivery]
mode = "keystroke"
type_delay_ms = 1
transcript_path = "~/.whisper-toggle/transcript.txt"

[storage]
lock_path = "~/.whisper-toggle/listen.lock"
audio_path = "~/.whisper-toggle/output.wav"

[model]
profile = "fast"
auto_download = true
timeout_secs = 120

[model.fast]
name = "tiny"
path = "~/.whisper-toggle/models/ggml-tiny.bin"
threads = 4
beam_size = 1

[model.accurate]
name = "small"
path = "~/.whisper-toggle/models/ggml-small.bin"
threads = 4
beam_size = 5

[notification]
enabled = true
command = "notify-send"

[telemetry]
enabled = true
log_path = "~/.whisper-toggle/whisper-toggle.log"

[recording]
enabled = false
retention_days = 7
max_count = 50
"#;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::audio::{wav, AudioCapture};
use crate::config::{CaptureMode, Config, DeliveryMode};
use crate::delivery::{keystroke, TextDelivery};
use crate::lock::{LockError, LockFile};
use crate::notify::Notifier;
use crate::recording_cleanup;
use crate::transcription::{self, TranscriptionEngine, TranscriptionError};

/// What one toggle invocation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Recording started; the invocation ran the capture loop to completion.
    Started,
    /// Recording was active; the lock was cleared and the stop flow ran.
    Stopped,
    /// Lost the acquire race to a concurrent toggle; no capture happened.
    AlreadyRunning,
}

/// One in-progress recording session.
///
/// Owned by the capture loop for its lifetime; replaces the module-level
/// flags of earlier incarnations of this tool.
struct RecordingSession {
    started_at: Instant,
    audio_path: PathBuf,
    sample_rate: u32,
    /// Accumulated frames (session mode only; windowed mode flushes per window)
    frames: Vec<f32>,
}

impl RecordingSession {
    fn begin(audio_path: PathBuf, sample_rate: u32) -> Self {
        Self {
            started_at: Instant::now(),
            audio_path,
            sample_rate,
            frames: Vec::new(),
        }
    }

    fn flush(&self, samples: &[f32]) -> Result<()> {
        wav::write_pcm16(samples, self.sample_rate, &self.audio_path)
    }
}

/// Toggle entry point: dispatches to the start or stop flow based on the
/// lock file, which is the only state surviving between invocations.
pub struct ToggleController {
    config: Config,
    lock: LockFile,
    notifier: Notifier,
}

impl ToggleController {
    /// Builds a controller, expanding the configured lock path.
    ///
    /// # Errors
    /// Returns error if the lock path cannot be expanded.
    pub fn new(config: Config) -> Result<Self> {
        let lock_path = Config::expand_path(&config.storage.lock_path)?;
        Ok(Self {
            lock: LockFile::new(lock_path),
            notifier: Notifier::new(&config.notification),
            config,
        })
    }

    /// Handle one toggle request.
    ///
    /// # Errors
    /// Returns error when the start flow fails (no device, model load
    /// failure, stream stall) or the lock cannot be manipulated.
    pub async fn toggle(&self) -> Result<ToggleOutcome> {
        if self.lock.is_active() {
            self.stop()?;
            Ok(ToggleOutcome::Stopped)
        } else {
            self.start().await
        }
    }

    /// Stop flow: clear the lock, notify, and sweep in-flight typing.
    ///
    /// The capturing process observes the missing lock at its next window
    /// boundary, so stop latency is bounded by the window length.
    fn stop(&self) -> Result<()> {
        info!("stop requested, releasing lock");
        self.lock.release()?;

        self.notifier
            .notify("Listening Deactive", "Speech recognition has stopped.");

        // The capturing process owns the injector Child; from here only a
        // process-level sweep can reach it
        if self.config.delivery.mode == DeliveryMode::Keystroke {
            keystroke::terminate_stray_injectors();
        }

        Ok(())
    }

    /// Start flow: acquire the lock and run the capture loop until the lock
    /// disappears, Ctrl-C lands, or the stream fails.
    async fn start(&self) -> Result<ToggleOutcome> {
        match self.lock.acquire() {
            Ok(()) => {}
            Err(LockError::AlreadyActive { path }) => {
                warn!(path = %path, "lost acquire race to a concurrent toggle");
                return Ok(ToggleOutcome::AlreadyRunning);
            }
            Err(e) => return Err(e.into()),
        }

        self.notifier
            .notify("Listening Active", "Speech recognition has started.");

        let cancel = Arc::new(AtomicBool::new(false));
        let signal_cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping at next window boundary");
                signal_cancel.store(true, Ordering::Relaxed);
            }
        });

        // The cpal stream is not Send, so the whole session runs on a
        // dedicated thread and is joined from the async side
        let config = self.config.clone();
        let lock = self.lock.clone();
        let worker_cancel = Arc::clone(&cancel);
        let worker =
            std::thread::spawn(move || run_capture_session(&config, &lock, &worker_cancel));

        let joined = tokio::task::spawn_blocking(move || worker.join())
            .await
            .context("failed to join capture thread")?;

        // The lock may already be gone (stop toggle or never re-created);
        // release is idempotent and covers the Ctrl-C and error exits
        self.lock.release()?;

        match joined {
            Ok(session_result) => session_result?,
            Err(_) => anyhow::bail!("capture thread panicked"),
        }

        Ok(ToggleOutcome::Started)
    }
}

/// Runs one full recording session on the capture thread.
///
/// Loads the model for the configured profile, opens the device, runs the
/// mode-specific loop, and tears everything down on every exit path.
fn run_capture_session(config: &Config, lock: &LockFile, cancel: &AtomicBool) -> Result<()> {
    let spec = config.model.active();

    if config.model.auto_download {
        transcription::ensure_model_downloaded(spec)?;
    }

    let model_path = Config::expand_path(&spec.path)?;
    let engine = Arc::new(TranscriptionEngine::new(
        &model_path,
        spec.threads,
        spec.beam_size,
        spec.language.clone(),
    )?);

    let mut delivery = TextDelivery::new(&config.delivery)?;
    let audio_path = Config::expand_path(&config.storage.audio_path)?;
    let session = RecordingSession::begin(audio_path, config.capture.sample_rate);

    let mut capture = AudioCapture::new(&config.capture)?;
    capture.start()?;
    info!("starting continuous listening");

    let result = match config.capture.mode {
        CaptureMode::Windowed => {
            windowed_loop(config, lock, cancel, &mut capture, &engine, &mut delivery, &session)
        }
        CaptureMode::Session => {
            session_loop(config, lock, cancel, &mut capture, &engine, &mut delivery, session)
        }
    };

    // Stop typing and release the device on every exit path
    delivery.shutdown();
    if let Err(e) = capture.stop() {
        warn!(error = %e, "failed to stop capture cleanly");
    }

    result
}

fn still_active(lock: &LockFile, cancel: &AtomicBool) -> bool {
    lock.is_active() && !cancel.load(Ordering::Relaxed)
}

/// Windowed mode: flush, transcribe, and deliver each window while the
/// lock holds, giving near-real-time incremental dictation.
fn windowed_loop(
    config: &Config,
    lock: &LockFile,
    cancel: &AtomicBool,
    capture: &mut AudioCapture,
    engine: &Arc<TranscriptionEngine>,
    delivery: &mut TextDelivery,
    session: &RecordingSession,
) -> Result<()> {
    let window = Duration::from_secs(config.capture.window_secs);
    let timeout = Duration::from_secs(config.model.timeout_secs);

    while still_active(lock, cancel) {
        let samples = capture.drain_window(window)?;
        session.flush(&samples)?;
        archive_if_enabled(config, &session.audio_path);

        // A stop that landed mid-window keeps the flushed audio but must
        // not deliver text the user no longer wants typed
        if !still_active(lock, cancel) {
            info!("stop observed at window boundary");
            break;
        }

        match transcribe_flushed(engine, &session.audio_path, timeout) {
            Ok(text) => {
                delivery.deliver_safe(&text);
            }
            Err(e) => warn!(error = %e, "window transcription failed, continuing"),
        }
    }

    info!(
        session_secs = session.started_at.elapsed().as_secs(),
        "windowed session ended"
    );
    Ok(())
}

/// Session mode: buffer everything, then flush and transcribe once at stop.
fn session_loop(
    config: &Config,
    lock: &LockFile,
    cancel: &AtomicBool,
    capture: &mut AudioCapture,
    engine: &Arc<TranscriptionEngine>,
    delivery: &mut TextDelivery,
    mut session: RecordingSession,
) -> Result<()> {
    let window = Duration::from_secs(config.capture.window_secs);
    let timeout = Duration::from_secs(config.model.timeout_secs);

    while still_active(lock, cancel) {
        let samples = capture.drain_window(window)?;
        session.frames.extend_from_slice(&samples);
    }

    if session.frames.is_empty() {
        // Interrupted before any window completed: no container file is
        // written and nothing is delivered
        info!("session ended with no captured audio");
        return Ok(());
    }

    session.flush(&session.frames)?;
    archive_if_enabled(config, &session.audio_path);

    match transcribe_flushed(engine, &session.audio_path, timeout) {
        Ok(text) => {
            delivery.deliver_safe(&text);
        }
        Err(e) => warn!(error = %e, "session transcription failed"),
    }

    info!(
        session_secs = session.started_at.elapsed().as_secs(),
        frames = session.frames.len(),
        "session ended"
    );
    Ok(())
}

/// Transcribe the flushed container, validating it exists first.
fn transcribe_flushed(
    engine: &Arc<TranscriptionEngine>,
    audio_path: &Path,
    timeout: Duration,
) -> Result<String, TranscriptionError> {
    let audio = transcription::load_audio(audio_path)?;
    transcription::transcribe_with_timeout(engine, audio, timeout)
}

fn archive_if_enabled(config: &Config, audio_path: &Path) {
    if !config.recording.enabled {
        return;
    }
    if let Err(e) = recording_cleanup::archive_recording(audio_path, &config.recording) {
        warn!(error = %e, "failed to archive recording");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CaptureConfig, DeliveryConfig, ModelConfig, ModelProfile, ModelSpec, NotificationConfig,
        RecordingConfig, StorageConfig, TelemetryConfig,
    };

    fn test_config(dir: &Path) -> Config {
        let model_spec = ModelSpec {
            name: "tiny".to_owned(),
            path: dir.join("model.bin").to_string_lossy().into_owned(),
            threads: 1,
            beam_size: 1,
            language: None,
        };
        Config {
            capture: CaptureConfig {
                mode: CaptureMode::Windowed,
                window_secs: 1,
                sample_rate: 16000,
                stall_timeout_secs: 1,
            },
            delivery: DeliveryConfig {
                // Clipboard mode keeps the stop flow from sweeping processes
                mode: DeliveryMode::Clipboard,
                strip_punctuation: None,
                type_delay_ms: 1,
                transcript_path: None,
            },
            storage: StorageConfig {
                lock_path: dir.join("listen.lock").to_string_lossy().into_owned(),
                audio_path: dir.join("output.wav").to_string_lossy().into_owned(),
            },
            model: ModelConfig {
                profile: ModelProfile::Fast,
                auto_download: false,
                timeout_secs: 0,
                fast: model_spec.clone(),
                accurate: model_spec,
            },
            notification: NotificationConfig {
                enabled: false,
                command: "notify-send".to_owned(),
            },
            telemetry: TelemetryConfig {
                enabled: false,
                log_path: String::new(),
            },
            recording: RecordingConfig {
                enabled: false,
                retention_days: 7,
                max_count: 50,
            },
        }
    }

    #[tokio::test]
    async fn test_toggle_on_active_lock_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        // Simulate an active session left by a previous invocation
        std::fs::write(dir.path().join("listen.lock"), b"").unwrap();

        let controller = ToggleController::new(config).unwrap();
        let outcome = controller.toggle().await.unwrap();

        assert_eq!(outcome, ToggleOutcome::Stopped);
        assert!(!dir.path().join("listen.lock").exists());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_on_missing_lock() {
        let dir = tempfile::tempdir().unwrap();
        let controller = ToggleController::new(test_config(dir.path())).unwrap();

        // Direct stop with no lock present performs no capture and no error
        controller.stop().unwrap();
        assert!(!dir.path().join("listen.lock").exists());
    }

    #[tokio::test]
    async fn test_start_without_model_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let controller = ToggleController::new(config).unwrap();

        // No model file and downloads disabled: the start flow fails before
        // the device opens, and must not leave a stale lock behind
        let result = controller.toggle().await;
        assert!(result.is_err());
        assert!(!dir.path().join("listen.lock").exists());
    }

    #[test]
    fn test_transcribe_flushed_missing_container_no_delivery() {
        let dir = tempfile::tempdir().unwrap();

        let result = transcription::load_audio(&dir.path().join("never-flushed.wav"));

        assert!(matches!(
            result,
            Err(TranscriptionError::MissingAudio { .. })
        ));
    }

    #[test]
    fn test_session_flush_writes_container() {
        let dir = tempfile::tempdir().unwrap();
        let session = RecordingSession::begin(dir.path().join("output.wav"), 16000);

        let samples = vec![0.0_f32; 16000];
        session.flush(&samples).unwrap();

        let loaded = transcription::load_audio(&session.audio_path).unwrap();
        assert_eq!(loaded.len(), 16000);
    }
}

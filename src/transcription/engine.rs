use anyhow::Context;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::wav;

/// Trait for transcription operations (enables testing via mocking)
///
/// Production code uses the concrete [`TranscriptionEngine`]; the timeout
/// wrapper and the tests work against this seam so a slow or failing model
/// can be simulated without a model file.
#[cfg_attr(test, mockall::automock)]
pub trait TranscriptionInterface: Send + Sync {
    /// Transcribe 16 kHz mono audio samples to text
    ///
    /// # Errors
    /// Returns error if inference fails
    fn transcribe(&self, audio_data: &[f32]) -> Result<String, TranscriptionError>;
}

/// Errors that can occur during transcription
#[derive(Debug, Error)]
pub enum TranscriptionError {
    /// The audio container file does not exist
    #[error("audio file missing: {path}")]
    MissingAudio {
        /// Expected container path
        path: String,
    },

    /// The audio container file exists but holds no frames
    #[error("audio file empty: {path}")]
    EmptyAudio {
        /// Container path
        path: String,
    },

    /// The audio container file could not be decoded
    #[error("audio file unreadable: {path}: {source}")]
    UnreadableAudio {
        /// Container path
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to load Whisper model
    #[error("failed to load whisper model from {path}: {source}")]
    ModelLoad {
        /// Path to model file
        path: String,
        /// Underlying error
        source: anyhow::Error,
    },

    /// Failed to create Whisper inference state
    #[error("failed to create whisper state")]
    StateCreation,

    /// Transcription inference failed
    #[error("failed to transcribe audio")]
    Inference(#[from] anyhow::Error),

    /// Inference did not complete within the configured bound
    #[error("transcription timed out after {secs}s")]
    Timeout {
        /// Configured bound in seconds
        secs: u64,
    },
}

/// Load the audio container for transcription.
///
/// Callers run this before inference so an interrupted session that never
/// flushed a file fails here, cleanly, and no delivery happens.
///
/// # Errors
/// [`TranscriptionError::MissingAudio`] if the file does not exist,
/// [`TranscriptionError::EmptyAudio`] if it decodes to zero frames,
/// [`TranscriptionError::UnreadableAudio`] on any decode failure.
pub fn load_audio(path: &Path) -> Result<Vec<f32>, TranscriptionError> {
    if !path.exists() {
        return Err(TranscriptionError::MissingAudio {
            path: path.display().to_string(),
        });
    }

    let samples = wav::read_pcm16(path).map_err(|e| TranscriptionError::UnreadableAudio {
        path: path.display().to_string(),
        source: e,
    })?;

    if samples.is_empty() {
        return Err(TranscriptionError::EmptyAudio {
            path: path.display().to_string(),
        });
    }

    Ok(samples)
}

/// Run a transcription with an upper bound on inference time.
///
/// A zero timeout disables the bound. On timeout the worker thread is
/// abandoned (whisper inference cannot be interrupted mid-run); its result
/// is dropped when it eventually finishes.
///
/// # Errors
/// [`TranscriptionError::Timeout`] when the bound elapses, otherwise
/// whatever the engine returns.
pub fn transcribe_with_timeout<T>(
    engine: &Arc<T>,
    audio: Vec<f32>,
    timeout: Duration,
) -> Result<String, TranscriptionError>
where
    T: TranscriptionInterface + 'static,
{
    if timeout.is_zero() {
        return engine.transcribe(&audio);
    }

    let (tx, rx) = crossbeam_channel::bounded(1);
    let worker_engine = Arc::clone(engine);
    std::thread::spawn(move || {
        // Receiver may be gone after a timeout; the result is discarded then
        let _ = tx.send(worker_engine.transcribe(&audio));
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "transcription timed out, abandoning worker"
            );
            Err(TranscriptionError::Timeout {
                secs: timeout.as_secs(),
            })
        }
    }
}

/// Whisper transcription engine
pub struct TranscriptionEngine {
    /// Whisper context (thread-safe)
    ctx: Arc<Mutex<WhisperContext>>,
    /// Number of CPU threads for inference
    threads: i32,
    /// Beam search width
    beam_size: i32,
    /// Language code (None = auto-detect)
    language: Option<String>,
}

impl TranscriptionEngine {
    /// Determines sampling strategy based on beam size (pure, testable)
    const fn get_sampling_strategy(beam_size: i32) -> SamplingStrategy {
        if beam_size > 1 {
            SamplingStrategy::BeamSearch {
                beam_size,
                patience: -1.0,
            }
        } else {
            SamplingStrategy::Greedy { best_of: 1 }
        }
    }

    /// Creates a new `TranscriptionEngine` by loading the model from the given path
    ///
    /// The model is loaded once per process; the fast/accurate profile choice
    /// happens in configuration before this point.
    ///
    /// # Errors
    /// Returns error if model file doesn't exist, is invalid, or if `threads`/`beam_size` exceed `i32::MAX`
    pub fn new(
        model_path: &Path,
        threads: usize,
        beam_size: usize,
        language: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        if threads == 0 {
            return Err(TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("threads must be > 0"),
            });
        }
        if beam_size == 0 {
            return Err(TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("beam_size must be > 0"),
            });
        }

        // Validate that threads and beam_size fit in i32 (required by whisper-rs API)
        let threads_i32 = i32::try_from(threads).map_err(|_| TranscriptionError::ModelLoad {
            path: model_path.display().to_string(),
            source: anyhow::anyhow!("threads value too large (max: {})", i32::MAX),
        })?;
        let beam_size_i32 =
            i32::try_from(beam_size).map_err(|_| TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("beam_size value too large (max: {})", i32::MAX),
            })?;

        tracing::info!(
            path = %model_path.display(),
            threads = threads,
            beam_size = beam_size,
            language = ?language,
            "loading whisper model"
        );

        let path_str = model_path
            .to_str()
            .ok_or_else(|| TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("model path contains invalid UTF-8"),
            })?;

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params).map_err(|e| {
            TranscriptionError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("{e:?}"),
            }
        })?;

        tracing::info!("whisper model loaded successfully");

        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
            threads: threads_i32,
            beam_size: beam_size_i32,
            language,
        })
    }

    /// Transcribes the audio container at `path`
    ///
    /// # Errors
    /// Returns error if the file is missing, empty, unreadable, or if
    /// inference fails.
    pub fn transcribe_file(&self, path: &Path) -> Result<String, TranscriptionError> {
        let audio = load_audio(path)?;
        self.transcribe_impl(&audio)
    }

    /// Transcribes audio samples (16kHz mono f32) to text
    ///
    /// # Errors
    /// Returns error if Whisper inference fails or mutex is poisoned
    fn transcribe_impl(&self, audio_data: &[f32]) -> Result<String, TranscriptionError> {
        let _span = tracing::debug_span!("transcription", samples = audio_data.len()).entered();
        tracing::debug!("starting transcription");

        // Create state for this transcription
        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| TranscriptionError::StateCreation)?;

        let strategy = Self::get_sampling_strategy(self.beam_size);
        let mut params = FullParams::new(strategy);
        params.set_n_threads(self.threads);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_language(self.language.as_deref()); // Use configured language or auto-detect
        params.set_translate(false);

        let start = std::time::Instant::now();
        state
            .full(params, audio_data)
            .context("whisper inference failed")?;
        let inference_duration = start.elapsed();

        // Extract text from all segments
        let mut result = String::new();
        for segment in state.as_iter() {
            result.push_str(&segment.to_string());
        }

        let result = result.trim().to_owned();

        tracing::info!(
            segments = state.full_n_segments(),
            text_len = result.len(),
            inference_ms = inference_duration.as_millis(),
            "transcription completed"
        );

        Ok(result)
    }
}

impl TranscriptionInterface for TranscriptionEngine {
    fn transcribe(&self, audio_data: &[f32]) -> Result<String, TranscriptionError> {
        self.transcribe_impl(audio_data)
    }
}

// SAFETY: TranscriptionEngine is thread-safe because:
// 1. WhisperContext is wrapped in Arc<Mutex<>>, ensuring exclusive access
// 2. All methods require acquiring the mutex lock before accessing the context
// 3. No shared mutable state exists outside the mutex
// 4. whisper-rs WhisperContext is documented as thread-safe when properly synchronized
#[allow(unsafe_code)]
unsafe impl Send for TranscriptionEngine {}
#[allow(unsafe_code)]
unsafe impl Sync for TranscriptionEngine {}

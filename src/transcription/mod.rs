/// Model download and management
pub mod download;
/// Whisper model inference engine
pub mod engine;

pub use download::ensure_model_downloaded;
pub use engine::{
    load_audio, transcribe_with_timeout, TranscriptionEngine, TranscriptionError,
    TranscriptionInterface,
};

//! Whisper Toggle - voice dictation toggled by repeated invocation
//!
//! Each run of the binary flips recording on or off via a filesystem lock,
//! transcribes captured audio with a local Whisper model, and delivers the
//! text by simulated typing or the clipboard.

/// Audio capture and WAV container I/O
pub mod audio;
/// Configuration management
pub mod config;
/// Toggle state machine and capture loops
pub mod controller;
/// Text delivery (typing injection, clipboard)
pub mod delivery;
/// Recording lock file
pub mod lock;
/// Desktop notifications
pub mod notify;
/// Recording archive retention
pub mod recording_cleanup;
/// Telemetry and logging
pub mod telemetry;
/// Transcription text cleanup
pub mod text;
/// Whisper transcription engine
pub mod transcription;

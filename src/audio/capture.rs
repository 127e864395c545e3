use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapRb,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;

/// How often the drain loop re-checks the ring buffer for new samples.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Audio capture errors
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No input device available or the stream could not be built
    #[error("audio device unavailable: {reason}")]
    Device {
        /// What went wrong while claiming the device
        reason: String,
    },

    /// The open stream stopped producing samples or refused control
    #[error("audio stream failed: {reason}")]
    Stream {
        /// What went wrong on the running stream
        reason: String,
    },
}

/// Trait for controlling audio stream lifecycle
trait StreamControl {
    /// Resume audio stream (activate microphone)
    fn play(&self) -> Result<(), CaptureError>;
    /// Pause audio stream (deactivate microphone)
    fn pause(&self) -> Result<(), CaptureError>;
}

/// CPAL stream wrapper implementing `StreamControl`
struct CpalStreamControl {
    stream: cpal::Stream,
}

impl StreamControl for CpalStreamControl {
    fn play(&self) -> Result<(), CaptureError> {
        self.stream.play().map_err(|e| CaptureError::Stream {
            reason: format!("failed to resume stream: {e}"),
        })
    }

    fn pause(&self) -> Result<(), CaptureError> {
        self.stream.pause().map_err(|e| CaptureError::Stream {
            reason: format!("failed to pause stream: {e}"),
        })
    }
}

/// Microphone capture feeding a lock-free ring buffer.
///
/// The CPAL callback thread pushes device-rate f32 samples; the capture
/// loop drains them in fixed-duration windows and converts to the target
/// rate. The stream handle is not `Send`, so an `AudioCapture` lives and
/// dies on the thread that created it.
pub struct AudioCapture {
    /// Stream controller (kept alive to prevent stream drop)
    stream_control: Option<Box<dyn StreamControl>>,
    /// Ring buffer consumer for reading captured samples
    ring_buffer_consumer: HeapCons<f32>,
    /// Recording state flag
    is_recording: Arc<AtomicBool>,
    /// Device sample rate in Hz
    device_sample_rate: u32,
    /// Number of audio channels
    device_channels: u16,
    /// Output sample rate in Hz (container format)
    target_sample_rate: u32,
    /// Give up on a window when the device is silent this long
    stall_timeout: Duration,
}

impl AudioCapture {
    /// Claims the default input device and builds a paused stream
    ///
    /// # Errors
    /// [`CaptureError::Device`] if no input device is available, the device
    /// refuses a config, or the stream cannot be built.
    pub fn new(config: &CaptureConfig) -> Result<Self, CaptureError> {
        info!("initializing audio capture");

        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(CaptureError::Device {
            reason: "no input device available".to_owned(),
        })?;

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_owned());
        info!("using input device: {}", device_name);

        // Use the device default config, converting to the target rate on drain
        let supported_config =
            device
                .default_input_config()
                .map_err(|e| CaptureError::Device {
                    reason: format!("failed to get default input config: {e}"),
                })?;

        let device_sample_rate = supported_config.sample_rate();
        let device_channels = supported_config.channels();

        info!(
            "device config: {} Hz, {} channels",
            device_sample_rate, device_channels
        );

        // Ring buffer sized for two capture windows so a slow drain never drops samples
        let window_secs = config.window_secs.max(1) as usize;
        let ring_buffer_capacity =
            (device_sample_rate as usize) * (device_channels as usize) * window_secs * 2;
        debug!(
            "ring buffer capacity: {} samples ({}s windows at {} Hz)",
            ring_buffer_capacity, window_secs, device_sample_rate
        );
        let ring_buffer = HeapRb::<f32>::new(ring_buffer_capacity);
        let (ring_buffer_producer, ring_buffer_consumer) = ring_buffer.split();

        let is_recording = Arc::new(AtomicBool::new(false));

        let is_recording_clone = Arc::clone(&is_recording);
        let mut producer = ring_buffer_producer;

        let stream_config = supported_config.into();
        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if is_recording_clone.load(Ordering::Relaxed) {
                        // Lock-free push to ring buffer
                        let pushed = producer.push_slice(data);
                        if pushed < data.len() {
                            warn!("ring buffer full, dropped {} samples", data.len() - pushed);
                        }
                    }
                },
                move |err| {
                    warn!("audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| CaptureError::Device {
                reason: format!("failed to build input stream: {e}"),
            })?;

        let stream_control = CpalStreamControl { stream };

        // Start the stream and immediately pause it (mic inactive until the loop starts)
        stream_control.play()?;
        stream_control.pause()?;
        info!("audio stream initialized (paused)");

        Ok(Self {
            stream_control: Some(Box::new(stream_control)),
            ring_buffer_consumer,
            is_recording,
            device_sample_rate,
            device_channels,
            target_sample_rate: config.sample_rate,
            stall_timeout: Duration::from_secs(config.stall_timeout_secs),
        })
    }

    /// Activates the microphone
    ///
    /// # Errors
    /// Returns error if the stream refuses to resume
    pub fn start(&mut self) -> Result<(), CaptureError> {
        let start = Instant::now();
        debug!("starting capture");

        self.ring_buffer_consumer.clear();

        // Set recording flag BEFORE resuming stream to avoid losing the first samples
        self.is_recording.store(true, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.play()?;
        }

        info!(latency_us = start.elapsed().as_micros(), "capture started");
        Ok(())
    }

    /// Deactivates the microphone; must run on every exit path
    ///
    /// # Errors
    /// Returns error if the stream refuses to pause
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        debug!("stopping capture");

        self.is_recording.store(false, Ordering::Relaxed);

        if let Some(stream_control) = &self.stream_control {
            stream_control.pause()?;
        }

        info!("capture stopped");
        Ok(())
    }

    /// Number of frames a full window holds at the target rate.
    #[must_use]
    pub fn window_frames(&self, window: Duration) -> usize {
        (u128::from(self.target_sample_rate) * window.as_millis() / 1000) as usize
    }

    /// Blocks for one window of audio and returns it as target-rate mono samples.
    ///
    /// Fills exactly one window's worth of device frames, so a stop request
    /// is observed no later than the next window boundary. A device that
    /// delivers nothing for longer than the stall timeout fails the window
    /// instead of hanging the loop.
    ///
    /// # Errors
    /// [`CaptureError::Stream`] when the watchdog fires.
    pub fn drain_window(&mut self, window: Duration) -> Result<Vec<f32>, CaptureError> {
        let target_len = (u128::from(self.device_sample_rate)
            * u128::from(self.device_channels)
            * window.as_millis()
            / 1000) as usize;

        let mut raw: Vec<f32> = Vec::with_capacity(target_len);
        let mut chunk = vec![0.0_f32; 4096];
        let mut last_progress = Instant::now();

        while raw.len() < target_len {
            let want = (target_len - raw.len()).min(chunk.len());
            let popped = self.ring_buffer_consumer.pop_slice(&mut chunk[..want]);

            if popped > 0 {
                raw.extend_from_slice(&chunk[..popped]);
                last_progress = Instant::now();
            } else {
                if last_progress.elapsed() >= self.stall_timeout {
                    return Err(CaptureError::Stream {
                        reason: format!(
                            "no samples for {}s (device disconnected?)",
                            self.stall_timeout.as_secs()
                        ),
                    });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        let mut converted = self.convert_to_target(&raw);

        // Resampling rounds up; a full window is exactly window * rate frames
        let expected = self.window_frames(window);
        if converted.len() > expected {
            converted.truncate(expected);
        }

        debug!(
            raw = raw.len(),
            frames = converted.len(),
            "window drained"
        );

        Ok(converted)
    }

    fn convert_to_target(&self, samples: &[f32]) -> Vec<f32> {
        let start_total = Instant::now();

        // Downmix to mono if needed (average channels)
        let mono_samples = if self.device_channels == 1 {
            samples.to_vec()
        } else {
            let channels_f64 = f64::from(self.device_channels);
            samples
                .chunks(self.device_channels as usize)
                .map(|frame| {
                    let sum_f64: f64 = frame.iter().map(|&s| f64::from(s)).sum();
                    // f64 → f32: audio samples are stored as f32, precision sufficient
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        (sum_f64 / channels_f64) as f32
                    }
                })
                .collect()
        };

        if self.device_sample_rate == self.target_sample_rate {
            return mono_samples;
        }

        // Simple linear interpolation resampling
        // Algorithm requires f64 ↔ usize conversions for fractional index calculations
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let resampled = {
            let ratio = f64::from(self.device_sample_rate) / f64::from(self.target_sample_rate);

            let output_len_f64 = (mono_samples.len() as f64) / ratio;
            let output_len = if output_len_f64.is_finite() && output_len_f64 >= 0.0 {
                output_len_f64.ceil() as usize
            } else {
                mono_samples.len()
            };

            let mut resampled = Vec::with_capacity(output_len);
            for i in 0..output_len {
                let src_idx_f64 = (i as f64) * ratio;

                let src_idx_floor = if src_idx_f64 >= 0.0 && src_idx_f64 < (usize::MAX as f64) {
                    src_idx_f64.floor() as usize
                } else {
                    0
                };

                let src_idx_ceil = (src_idx_floor + 1).min(mono_samples.len().saturating_sub(1));
                let fract = src_idx_f64 - src_idx_f64.floor();

                let sample = if src_idx_floor < mono_samples.len() {
                    let s1 = f64::from(mono_samples[src_idx_floor]);
                    let s2 = f64::from(mono_samples[src_idx_ceil]);
                    let interpolated = s1.mul_add(1.0 - fract, s2 * fract);
                    interpolated as f32
                } else {
                    0.0_f32
                };

                resampled.push(sample);
            }

            resampled
        };

        debug!(
            device_rate = self.device_sample_rate,
            target_rate = self.target_sample_rate,
            input_samples = mono_samples.len(),
            output_samples = resampled.len(),
            convert_us = start_total.elapsed().as_micros(),
            "audio conversion complete"
        );

        resampled
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.is_recording.store(false, Ordering::Relaxed);
        if let Some(stream_control) = &self.stream_control {
            if let Err(e) = stream_control.pause() {
                warn!("failed to pause stream on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)] // Test assertions with known exact values
mod tests {
    use super::*;
    use crate::config::{CaptureConfig, CaptureMode};

    struct MockStreamControl {
        played: Arc<AtomicBool>,
        paused: Arc<AtomicBool>,
    }

    impl StreamControl for MockStreamControl {
        fn play(&self) -> Result<(), CaptureError> {
            self.played.store(true, Ordering::Relaxed);
            Ok(())
        }

        fn pause(&self) -> Result<(), CaptureError> {
            self.paused.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn test_config() -> CaptureConfig {
        CaptureConfig {
            mode: CaptureMode::Windowed,
            window_secs: 5,
            sample_rate: 16000,
            stall_timeout_secs: 10,
        }
    }

    // Capture with no live stream, for conversion and drain logic
    fn mock_audio_capture(sample_rate: u32, channels: u16) -> AudioCapture {
        AudioCapture {
            stream_control: None,
            ring_buffer_consumer: HeapRb::<f32>::new(1024).split().1,
            is_recording: Arc::new(AtomicBool::new(false)),
            device_sample_rate: sample_rate,
            device_channels: channels,
            target_sample_rate: 16000,
            stall_timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_stereo_to_mono_conversion() {
        let capture = mock_audio_capture(16000, 2);

        // Stereo samples: [L1, R1, L2, R2, L3, R3]
        let stereo_samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];

        let result = capture.convert_to_target(&stereo_samples);

        assert_eq!(result.len(), 3);
        assert_eq!(result[0], 1.5);
        assert_eq!(result[1], 3.5);
        assert_eq!(result[2], 5.5);
    }

    #[test]
    fn test_mono_passthrough_no_resampling() {
        let capture = mock_audio_capture(16000, 1);

        let mono_samples = vec![1.0, 2.0, 3.0, 4.0, 5.0];

        let result = capture.convert_to_target(&mono_samples);

        assert_eq!(result, mono_samples);
    }

    #[test]
    fn test_downsampling_48khz_to_16khz() {
        let capture = mock_audio_capture(48000, 1);

        // 48kHz -> 16kHz is 3:1 ratio
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0];

        let result = capture.convert_to_target(&samples);

        assert_eq!(result.len(), 3);
        for &sample in &result {
            assert!((1.0..=9.0).contains(&sample));
        }
    }

    #[test]
    fn test_upsampling_8khz_to_16khz() {
        let capture = mock_audio_capture(8000, 1);

        let samples = vec![1.0, 2.0, 3.0, 4.0];

        let result = capture.convert_to_target(&samples);

        assert_eq!(result.len(), 8);
        for &sample in &result {
            assert!((1.0..=4.0).contains(&sample));
        }
    }

    #[test]
    fn test_empty_samples() {
        let capture = mock_audio_capture(44100, 2);

        let empty: Vec<f32> = vec![];
        let result = capture.convert_to_target(&empty);

        assert_eq!(result.len(), 0);
    }

    #[test]
    fn test_multichannel_conversion() {
        let capture = mock_audio_capture(16000, 4);

        // 4-channel samples: [C1, C2, C3, C4, C1, C2, C3, C4]
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];

        let result = capture.convert_to_target(&samples);

        assert_eq!(result.len(), 2);
        assert_eq!(result[0], 2.5);
        assert_eq!(result[1], 6.5);
    }

    #[test]
    fn test_resampling_preserves_bounds() {
        let capture = mock_audio_capture(22050, 1);

        let samples = vec![-1.0, -0.5, 0.0, 0.5, 1.0];

        let result = capture.convert_to_target(&samples);

        for &sample in &result {
            assert!((-1.0..=1.0).contains(&sample));
        }
    }

    #[test]
    fn test_window_frames_exact() {
        let capture = mock_audio_capture(48000, 2);

        assert_eq!(capture.window_frames(Duration::from_secs(5)), 5 * 16000);
        assert_eq!(capture.window_frames(Duration::from_millis(500)), 8000);
    }

    #[test]
    fn test_drain_window_full_window_is_exact() {
        // 1:1 rates; feed exactly one window through the ring buffer
        let ring_buffer = HeapRb::<f32>::new(32000);
        let (mut producer, consumer) = ring_buffer.split();
        let frames = 16000 / 2; // half-second window
        for i in 0..frames {
            #[allow(clippy::cast_precision_loss)]
            producer.try_push(i as f32).unwrap();
        }

        let mut capture = AudioCapture {
            stream_control: None,
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(true)),
            device_sample_rate: 16000,
            device_channels: 1,
            target_sample_rate: 16000,
            stall_timeout: Duration::from_secs(1),
        };

        let window = capture.drain_window(Duration::from_millis(500)).unwrap();
        assert_eq!(window.len(), frames);
    }

    #[test]
    fn test_drain_window_stall_watchdog_fires() {
        // Producer side dropped: no samples will ever arrive
        let mut capture = mock_audio_capture(16000, 1);
        capture.stall_timeout = Duration::from_millis(50);

        let result = capture.drain_window(Duration::from_secs(1));

        assert!(matches!(result, Err(CaptureError::Stream { .. })));
    }

    #[test]
    fn test_stream_control_start_stop() {
        let played = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(false));
        let mock_stream = MockStreamControl {
            played: Arc::clone(&played),
            paused: Arc::clone(&paused),
        };

        let ring_buffer = HeapRb::<f32>::new(1024);
        let (_, consumer) = ring_buffer.split();

        let mut capture = AudioCapture {
            stream_control: Some(Box::new(mock_stream)),
            ring_buffer_consumer: consumer,
            is_recording: Arc::new(AtomicBool::new(false)),
            device_sample_rate: 16000,
            device_channels: 1,
            target_sample_rate: 16000,
            stall_timeout: Duration::from_secs(10),
        };

        capture.start().unwrap();
        assert!(played.load(Ordering::Relaxed));
        assert!(capture.is_recording.load(Ordering::Relaxed));

        capture.stop().unwrap();
        assert!(paused.load(Ordering::Relaxed));
        assert!(!capture.is_recording.load(Ordering::Relaxed));
    }

    // Integration tests (require audio hardware, run with: cargo test -- --ignored)

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_audio_capture_initialization() {
        let capture = AudioCapture::new(&test_config());
        assert!(capture.is_ok(), "capture should initialize on real hardware");

        let capture = capture.unwrap();
        assert!(capture.device_sample_rate > 0);
        assert!(capture.device_channels > 0);
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_start_drain_stop_cycle() {
        let mut capture = AudioCapture::new(&test_config()).unwrap();

        capture.start().unwrap();
        let window = capture.drain_window(Duration::from_millis(200)).unwrap();
        capture.stop().unwrap();

        assert_eq!(window.len(), capture.window_frames(Duration::from_millis(200)));
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_multiple_capture_cycles() {
        let mut capture = AudioCapture::new(&test_config()).unwrap();

        for _ in 0..3 {
            capture.start().unwrap();
            let _window = capture.drain_window(Duration::from_millis(100)).unwrap();
            capture.stop().unwrap();
        }
    }
}

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;
use tracing::{debug, info};

/// Container sample width. The whole pipeline speaks 16-bit LE PCM.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Serialize mono samples into a 16-bit PCM WAV at `path`, overwriting
/// any existing file.
///
/// # Errors
/// Returns error if directory creation, file creation, or writing fails.
pub fn write_pcm16(samples: &[f32], sample_rate: u32, path: &Path) -> Result<()> {
    debug!("writing WAV file: {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create output directory")?;
    }

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec).context("failed to create WAV file")?;

    for &sample in samples {
        // Clamp before scaling so clipped input cannot wrap the i16 range
        #[allow(clippy::cast_possible_truncation)]
        let quantized = (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
        writer
            .write_sample(quantized)
            .context("failed to write sample")?;
    }

    writer.finalize().context("failed to finalize WAV file")?;

    info!("wrote WAV file: {:?} ({} frames)", path, samples.len());
    Ok(())
}

/// Load a 16-bit PCM WAV back into f32 samples in [-1.0, 1.0].
///
/// # Errors
/// Returns error if the file cannot be opened or is not 16-bit PCM.
pub fn read_pcm16(path: &Path) -> Result<Vec<f32>> {
    let reader = WavReader::open(path).context("failed to open WAV file")?;
    let spec = reader.spec();

    if spec.sample_format != SampleFormat::Int || spec.bits_per_sample != BITS_PER_SAMPLE {
        anyhow::bail!(
            "unsupported WAV format: {:?} {} bits",
            spec.sample_format,
            spec.bits_per_sample
        );
    }

    let samples: Vec<f32> = reader
        .into_samples::<i16>()
        .map(|s| s.map(|v| f32::from(v) / f32::from(i16::MAX)))
        .collect::<std::result::Result<_, _>>()
        .context("failed to decode WAV samples")?;

    Ok(samples)
}

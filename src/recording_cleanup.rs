use crate::config::RecordingConfig;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Copy a freshly flushed container into the archive, then apply retention.
///
/// The working container at the configured audio path is overwritten every
/// window/session; the archive keeps timestamped history for debugging.
///
/// # Errors
/// Returns error if the archive directory cannot be created or the copy fails.
pub fn archive_recording(audio_path: &Path, config: &RecordingConfig) -> Result<PathBuf> {
    let archive_dir = get_archive_dir()?;
    fs::create_dir_all(&archive_dir).context("failed to create archive directory")?;

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("failed to get current time")?
        .as_secs();

    let archived = archive_dir.join(format!("recording_{timestamp}.wav"));
    fs::copy(audio_path, &archived).context("failed to archive recording")?;
    tracing::debug!("archived recording: {}", archived.display());

    cleanup_old_recordings(config)?;

    Ok(archived)
}

/// Clean up old recordings based on retention policy
///
/// Deletes recordings older than `retention_days` OR beyond `max_count` limit.
/// Returns the number of files deleted.
///
/// # Errors
/// Returns error if directory listing fails. Individual file deletion failures are logged but don't stop cleanup.
pub fn cleanup_old_recordings(config: &RecordingConfig) -> Result<usize> {
    let archive_dir = get_archive_dir()?;

    // If directory doesn't exist, nothing to clean
    if !archive_dir.exists() {
        tracing::debug!("archive directory does not exist, skipping cleanup");
        return Ok(0);
    }

    // Collect all recording files with their timestamps
    let mut recordings: Vec<(PathBuf, u64)> = fs::read_dir(&archive_dir)
        .context("failed to read archive directory")?
        .filter_map(std::result::Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_file() {
                return None;
            }

            let filename = path.file_name()?.to_str()?;
            if !filename.starts_with("recording_")
                || !path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
            {
                return None;
            }

            // Extract timestamp from filename: recording_{timestamp}.wav
            let timestamp_str = filename.strip_prefix("recording_")?.strip_suffix(".wav")?;
            let timestamp: u64 = timestamp_str.parse().ok()?;

            Some((path, timestamp))
        })
        .collect();

    if recordings.is_empty() {
        tracing::debug!("no recordings found, skipping cleanup");
        return Ok(0);
    }

    // Sort by timestamp (newest first)
    recordings.sort_by(|a, b| b.1.cmp(&a.1));

    let mut to_delete = HashSet::new();

    // Apply age-based retention
    if config.retention_days > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("failed to get current time")?
            .as_secs();
        let retention_secs = u64::from(config.retention_days) * 24 * 60 * 60;

        for (path, timestamp) in &recordings {
            if now.saturating_sub(*timestamp) > retention_secs {
                to_delete.insert(path.clone());
            }
        }
    }

    // Apply count-based retention
    if config.max_count > 0 && recordings.len() > config.max_count {
        for (path, _) in recordings.iter().skip(config.max_count) {
            to_delete.insert(path.clone());
        }
    }

    // Delete files
    let mut deleted_count = 0;
    for path in to_delete {
        match fs::remove_file(&path) {
            Ok(()) => {
                deleted_count += 1;
                tracing::debug!("deleted recording: {}", path.display());
            }
            Err(e) => {
                tracing::warn!("failed to delete {}: {}", path.display(), e);
            }
        }
    }

    if deleted_count > 0 {
        tracing::debug!(
            "cleanup complete: deleted {} recordings (total: {}, remaining: {})",
            deleted_count,
            recordings.len(),
            recordings.len() - deleted_count
        );
    }

    Ok(deleted_count)
}

fn get_archive_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".whisper-toggle").join("recordings"))
}

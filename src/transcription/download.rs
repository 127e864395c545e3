use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::ModelSpec;

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// Maps model names to their HuggingFace filenames
fn model_filename(model_name: &str) -> String {
    format!("ggml-{model_name}.bin")
}

/// Fetch the model for the active profile if it is not on disk yet.
///
/// Returns true if downloaded, false if it already existed.
///
/// # Errors
/// Returns error if path expansion or the download fails.
pub fn ensure_model_downloaded(spec: &ModelSpec) -> Result<bool> {
    let model_path = crate::config::Config::expand_path(&spec.path)?;

    if model_path.exists() {
        tracing::info!(
            path = %model_path.display(),
            "model already exists, skipping download"
        );
        return Ok(false);
    }

    tracing::info!(
        model = %spec.name,
        path = %model_path.display(),
        "model not found, starting download"
    );

    download_model(&spec.name, &model_path)?;

    Ok(true)
}

fn download_model(model_name: &str, model_path: &Path) -> Result<()> {
    let filename = model_filename(model_name);
    let url = format!("{MODEL_BASE_URL}/{filename}");

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent).context("failed to create model directory")?;
    }

    tracing::info!(url = %url, "downloading model");

    // Download to temporary file first for atomic operation
    let temp_path = model_path.with_extension("tmp");

    let response = reqwest::blocking::get(&url)
        .with_context(|| format!("failed to download model from {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("download failed with status {}: {}", response.status(), url);
    }

    let bytes = response.bytes().context("failed to read response bytes")?;

    let mut file = fs::File::create(&temp_path)
        .with_context(|| format!("failed to create temp file at {}", temp_path.display()))?;

    file.write_all(&bytes)
        .context("failed to write model to temp file")?;

    // Drop file handle before rename
    drop(file);

    // Atomic rename - if this fails, temp file remains and will be cleaned up next run
    fs::rename(&temp_path, model_path).with_context(|| {
        format!(
            "failed to rename {} to {}",
            temp_path.display(),
            model_path.display()
        )
    })?;

    tracing::info!(
        path = %model_path.display(),
        size = bytes.len(),
        "model downloaded successfully"
    );

    Ok(())
}

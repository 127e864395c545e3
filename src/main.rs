use anyhow::Result;
use whisper_toggle::config::Config;
use whisper_toggle::controller::{ToggleController, ToggleOutcome};
use whisper_toggle::telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize telemetry
    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("whisper-toggle starting");

    // Dispatch the toggle: the lock file decides start vs stop
    let controller = ToggleController::new(config)?;
    match controller.toggle().await? {
        ToggleOutcome::Started => {
            tracing::info!("recording session finished");
            println!("✓ Recording session finished");
        }
        ToggleOutcome::Stopped => {
            tracing::info!("recording stopped");
            println!("✓ Recording stopped");
        }
        ToggleOutcome::AlreadyRunning => {
            tracing::warn!("another toggle won the race, nothing to do");
            println!("Recording already active");
        }
    }

    Ok(())
}

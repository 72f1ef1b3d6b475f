use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, oneshot};

use dictation_settings::config::Config;
use dictation_settings::download::HttpDownloadService;
use dictation_settings::settings::TomlSettingsStore;
use dictation_settings::{run_event_loop, telemetry, SettingsEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;
    println!("✓ Config loaded from ~/.dictation-settings.toml");

    // Initialize telemetry
    telemetry::init(config.telemetry.enabled, &config.telemetry.log_path)?;
    tracing::info!("dictation-settings starting");
    println!("✓ Telemetry initialized");

    // Wire up the store and the download backend
    let store = TomlSettingsStore::new(Config::expand_path(&config.store.path)?);
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let service = Arc::new(HttpDownloadService::new(
        config.downloads.base_url.clone(),
        Config::expand_path(&config.downloads.models_dir)?,
        event_tx,
    ));

    let engine = Arc::new(Mutex::new(SettingsEngine::with_auto_clear(
        store,
        service,
        Duration::from_millis(config.downloads.cancel_clear_ms),
    )));
    println!("✓ Settings engine ready");

    // External settings notifications would be fed by the host UI; without
    // one the channel simply stays idle
    let (_settings_tx, settings_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let loop_handle = tokio::spawn(run_event_loop(
        Arc::clone(&engine),
        event_rx,
        settings_rx,
        shutdown_rx,
    ));

    println!("\nDictation settings engine is running. Press Ctrl+C to exit.\n");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    println!("\nShutting down...");

    let _ = shutdown_tx.send(());
    loop_handle.await?;

    Ok(())
}

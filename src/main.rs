// main.rs - SETJA Capture Entry Point
//
// Starts the capture service:
// 1. Logging and settings (file + environment overrides)
// 2. Coordinator: capture thread + region watcher on this thread
// 3. Exit with the coordinator's status code
//
// `--print-settings` prints the effective settings as JSON and exits.

use anyhow::{Context, Result};
use log::info;

use setja_capture::config::Settings;
use setja_capture::coordinator;

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load();

    if std::env::args().skip(1).any(|arg| arg == "--print-settings") {
        let json = serde_json::to_string_pretty(&settings).context("Failed to serialize settings")?;
        println!("{json}");
        info!("Settings file: {}", Settings::config_path().display());
        return Ok(());
    }

    info!("SETJA capture v{} starting...", env!("CARGO_PKG_VERSION"));

    let code = coordinator::run(&settings)?;
    info!("Exiting with status {}", code);
    std::process::exit(code);
}

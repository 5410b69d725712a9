use async_trait::async_trait;
use clap::Parser;
use log::{error, info, warn};
use sessrec::configuration::{Args, Config};
use sessrec::container_management::DockerCli;
use sessrec::recording_management::RecordingManager;
use sessrec::session_management::SessionLifecycle;
use std::sync::Arc;

const SHUTDOWN_REASON: &str = "recordingStoppedByServer";

/// Session subsystem stand-in for the standalone binary: close requests are
/// only logged, since no session server is attached.
struct DetachedSessions;

#[async_trait]
impl SessionLifecycle for DetachedSessions {
    async fn close_session(&self, session_id: &str, reason: &str) {
        warn!(
            "Session {} should be closed ({}) but no session server is attached",
            session_id, reason
        );
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let args = Args::parse();

    info!("Importing configuration");
    let mut config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to import configuration from file: {}", e);
            std::process::exit(1);
        }
    };
    config.apply_args(&args);
    info!("Configuration imported successfully");

    let manager = Arc::new(RecordingManager::with_runtime(
        config,
        Arc::new(DockerCli::new()),
        Arc::new(DetachedSessions),
    ));

    if let Err(e) = manager.initialize().await {
        error!("Recording module initialization failed: {}, exiting...", e);
        std::process::exit(1);
    }

    match manager.list_recordings() {
        Ok(recordings) => info!("{} recording(s) in catalog", recordings.len()),
        Err(e) => warn!("Unable to list recordings: {}", e),
    }

    info!("Waiting for Ctrl-C");
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for shutdown signal: {}", e);
    }

    let stopped = manager.stop_all(SHUTDOWN_REASON).await;
    info!("Shutting down, {} recording(s) stopped", stopped);
}

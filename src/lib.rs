//! dev-runner - launch and supervise local dev servers
//!
//! This module wires the subsystems together and runs the HTTP server. The
//! actual logic is delegated to focused modules.

use log::{info, warn};

// ============================================================================
// MODULES
// ============================================================================

// Shared types
pub mod types;

// Path helpers
pub mod paths;

// Command-line and environment configuration
pub mod config;
pub use config::Settings;

// Log backend
pub mod logs;

// Stack detection
pub mod detect;

// Port allocation and process-group signals
pub mod ports;

// Durable snapshot
pub mod store;
use store::ConfigStore;

// Observer fan-out
pub mod events;

// Process supervision
pub mod process;
use process::Supervisor;

// HTTP API
pub mod api_server;

// Foreground launcher for the `detect` subcommand
pub mod launcher;


// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

/// Resolves once Ctrl-C or SIGTERM is received
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Open the store, serve the API until a shutdown signal, then stop every
/// supervised process group.
pub async fn run(settings: Settings) -> Result<(), String> {
    let snapshot_path = settings.snapshot_path()?;
    let store = ConfigStore::open(&snapshot_path)?;
    info!("Using snapshot {:?}", store.path());

    let supervisor = Supervisor::new(store, settings.kill_grace());
    let app = api_server::router(supervisor.clone(), settings.static_dir.clone());

    let addr = settings.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    info!("dev-runner listening on http://{}", addr);

    let signal_supervisor = supervisor.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Event streams never end on their own
            signal_supervisor.close_observers();
        })
        .await
        .map_err(|e| format!("API server error: {}", e))?;

    info!("Shutting down, stopping supervised processes");
    supervisor.shutdown_all().await;
    Ok(())
}

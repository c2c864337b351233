//! Signal handling for long-running processes.
//!
//! Handles:
//! - SIGTERM/SIGINT: stop every server, which releases their `wait` callers
//! - SIGHUP: re-read the TLS document and hot swap it into a secure server

use std::path::PathBuf;
use std::sync::Arc;

use super::secure::SecureServer;
use super::server::Server;
use crate::tls::TlsConfigSpec;

/// Stop every server that is still running.
///
/// Servers that are already stopped are skipped, so calling this after a
/// natural exit is harmless.
pub async fn stop_all(servers: &[Arc<dyn Server>]) {
    for server in servers {
        if !server.is_running().await {
            continue;
        }
        if let Err(e) = server.stop().await {
            tracing::warn!(error = %e, "Server was already stopping");
        }
    }
}

/// Stop all servers on SIGTERM or SIGINT.
pub fn setup_shutdown_handler(servers: Vec<Arc<dyn Server>>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                    tracing::error!(error = %e, "Failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, stopping servers");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, stopping servers");
            }
        }

        stop_all(&servers).await;
        tracing::info!("All servers stopped");
    });
}

/// Reload the TLS document from `tls_file` on SIGHUP.
///
/// A document that fails to load is ignored and the server keeps running with
/// its current configuration. A document that loads but fails to resolve
/// leaves the server stopped, as `SecureServer::set_tls_config` does.
#[cfg(unix)]
pub fn setup_reload_handler(server: Arc<SecureServer>, tls_file: PathBuf) {
    tokio::spawn(async move {
        let mut sighup =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup()) {
                Ok(signal) => signal,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install SIGHUP handler");
                    return;
                }
            };

        loop {
            sighup.recv().await;
            tracing::info!(file = %tls_file.display(), "Received SIGHUP, reloading TLS configuration");

            let spec = match TlsConfigSpec::load(&tls_file) {
                Ok(spec) => spec,
                Err(e) => {
                    tracing::error!(error = %e, file = %tls_file.display(), "Failed to read TLS configuration");
                    continue;
                }
            };

            match server.set_tls_config(&spec).await {
                Ok(()) => tracing::info!("TLS configuration reloaded"),
                Err(e) => tracing::error!(error = %e, "Failed to apply TLS configuration"),
            }
        }
    });
}

/// No-op reload handler for non-Unix platforms.
#[cfg(not(unix))]
pub fn setup_reload_handler(_server: Arc<SecureServer>, _tls_file: PathBuf) {
    tracing::warn!("TLS configuration reload via SIGHUP not supported on this platform");
}

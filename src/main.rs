//! ezserve: demo server for the restartable HTTP/HTTPS lifecycle.
//!
//! Initializes tracing, loads the TOML configuration, starts a plain server and
//! (optionally) a secure server answering "Hello world!", and then waits for
//! both to stop. SIGTERM/SIGINT stop the servers; SIGHUP reloads the TLS
//! document into the secure server.

mod config;

use std::sync::Arc;

use axum::routing::any;
use axum::{Extension, Router};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{parse_host, AppConfig, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use ezserve::http::shutdown;
use ezserve::{PlainServer, Scheme, SecureServer, Server};

/// ezserve: restartable HTTP/HTTPS servers
#[derive(Parser, Debug)]
#[command(name = "ezserve", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "ezserve=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

async fn hello(Extension(scheme): Extension<Scheme>) -> String {
    format!("Hello world! ({scheme})\n")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = AppConfig::load(&args.config)?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry =
        tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(config = %args.config, "Loaded configuration");

    let app = Router::new().fallback(any(hello));

    let http = Arc::new(PlainServer::new(app.clone()).with_bind_ip(parse_host(&config.http.host)?));
    http.set_security_redirects(&config.http.redirect_hosts);

    let mut servers: Vec<Arc<dyn Server>> = vec![http.clone() as Arc<dyn Server>];

    if let Some(https_config) = &config.https {
        let tls = https_config.load_tls()?;
        let https = Arc::new(
            SecureServer::new(app, &tls).with_bind_ip(parse_host(&https_config.host)?),
        );
        https.set_security_redirects(&https_config.redirect_hosts);

        if https_config.acme_challenges && tls.acme_enabled() {
            http.set_autocert_handler(Some(https.challenge_responder()));
        }

        https.start(i32::from(https_config.port)).await?;
        shutdown::setup_reload_handler(https.clone(), https_config.tls_file.clone());
        servers.push(https);
    }

    if let Err(e) = http.start(i32::from(config.http.port)).await {
        shutdown::stop_all(&servers).await;
        return Err(e.into());
    }

    shutdown::setup_shutdown_handler(servers.clone());

    for server in &servers {
        let status = server.status().await;
        tracing::info!(port = status.port, "Serving");
    }

    for server in &servers {
        // A TLS reload restarts the secure server, so keep waiting until a
        // wait reports NotListening.
        while server.wait().await.is_ok() {
            tokio::task::yield_now().await;
        }
    }

    tracing::info!("Exiting");
    Ok(())
}

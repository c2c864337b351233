//! Automatic certificate issuance.
//!
//! `AcmeManager` wraps a `rustls-acme` state machine scoped to an allow-list of
//! hosts. The state is a stream that must be polled for issuance and renewal to
//! progress, so the owning server drives it with `spawn_driver` for as long as
//! its accept loop runs. HTTP-01 challenges are answered through
//! `handle_challenge`, which the plain-HTTP side calls before anything else.

use std::io;
use std::sync::Arc;

use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use parking_lot::Mutex;
use rustls_acme::caches::DirCache;
use rustls_acme::{AcmeConfig, AcmeState, ResolvesServerCertAcme, UseChallenge};
use tokio::task::JoinHandle;

use super::config::TlsConfigSpec;
use super::normalize_host;
use crate::http::request_host;

/// Path prefix under which ACME authorities fetch HTTP-01 key authorizations.
pub const HTTP01_CHALLENGE_PREFIX: &str = "/.well-known/acme-challenge/";

/// Handle to the automatic-issuance authority of one resolved TLS policy.
pub struct AcmeManager {
    hosts: Vec<String>,
    resolver: Arc<ResolvesServerCertAcme>,
    state: Mutex<Option<AcmeState<io::Error>>>,
}

impl std::fmt::Debug for AcmeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcmeManager")
            .field("hosts", &self.hosts)
            .field("driven", &self.state.lock().is_none())
            .finish()
    }
}

impl AcmeManager {
    /// Build a manager for `spec.acme_hosts`. Nothing is contacted until the
    /// driver runs.
    pub(crate) fn from_spec(spec: &TlsConfigSpec) -> Self {
        let hosts: Vec<String> = spec
            .acme_hosts
            .iter()
            .map(|host| normalize_host(host).unwrap_or_else(|| host.clone()))
            .collect();

        let config = AcmeConfig::new(hosts.clone())
            .cache_option(spec.acme_cache_dir.clone().map(DirCache::new))
            .challenge_type(UseChallenge::Http01);

        let config = match &spec.acme_dir_url {
            Some(url) => config.directory(url),
            None => config.directory_lets_encrypt(true),
        };

        let state = config.state();
        let resolver = state.resolver();

        tracing::debug!(
            hosts = ?hosts,
            directory = spec.acme_dir_url.as_deref().unwrap_or("letsencrypt"),
            cache = spec.acme_cache_dir.as_deref().unwrap_or("none"),
            "Configured ACME manager"
        );

        Self {
            hosts,
            resolver,
            state: Mutex::new(Some(state)),
        }
    }

    /// Hostnames this manager may obtain certificates for.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn allows(&self, host: &str) -> bool {
        normalize_host(host).is_some_and(|host| self.hosts.contains(&host))
    }

    pub(crate) fn resolver(&self) -> Arc<ResolvesServerCertAcme> {
        Arc::clone(&self.resolver)
    }

    /// Start polling the issuance state machine.
    ///
    /// The state can only be driven once; later calls return `None`.
    pub fn spawn_driver(&self) -> Option<JoinHandle<()>> {
        let mut state = self.state.lock().take()?;
        Some(tokio::spawn(async move {
            while let Some(event) = state.next().await {
                match event {
                    Ok(event) => tracing::info!(event = ?event, "ACME event"),
                    Err(err) => tracing::error!(error = %err, "ACME error"),
                }
            }
            tracing::debug!("ACME state stream ended");
        }))
    }

    /// Answer an HTTP-01 challenge request.
    ///
    /// Returns `None` when the request is not a challenge and should continue
    /// down the normal dispatch path. Anything under the challenge prefix is
    /// answered here, with 403 for hosts outside the allow-list and 404 for
    /// unknown tokens.
    pub fn handle_challenge<B>(&self, request: &Request<B>) -> Option<Response> {
        let token = request.uri().path().strip_prefix(HTTP01_CHALLENGE_PREFIX)?;

        let host = request_host(request)
            .map(|host| strip_port(host).to_string())
            .unwrap_or_default();
        if !self.allows(&host) {
            tracing::warn!(%host, "Rejected ACME challenge for host outside allow-list");
            return Some((StatusCode::FORBIDDEN, "host not configured for ACME").into_response());
        }

        match self.resolver.get_http_01_key_auth(token) {
            Some(key_auth) => {
                tracing::info!(%host, %token, "Answered ACME HTTP-01 challenge");
                Some((StatusCode::OK, [(CONTENT_TYPE, "text/plain")], key_auth).into_response())
            }
            None => {
                tracing::debug!(%host, %token, "Unknown ACME challenge token");
                Some((StatusCode::NOT_FOUND, "unknown challenge token").into_response())
            }
        }
    }
}

fn strip_port(host: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    host.split(':').next().unwrap_or(host)
}

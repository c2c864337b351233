//! HTTPS server with SNI certificate selection and ACME support.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use parking_lot::RwLock;

use super::lifecycle::{Lifecycle, LifecycleGuard};
use super::redirect::RedirectPolicy;
use super::server::{Scheme, Server, ServerStatus};
use crate::error::ServerError;
use crate::middleware::{build_app, AutocertHandler, AutocertSlot, Dispatch};
use crate::tls::{self, AcmeManager, TlsConfigSpec};

/// An HTTPS server that listens on one port at a time.
///
/// The TLS document is resolved on every start, so a restart always serves the
/// currently held configuration.
pub struct SecureServer {
    lifecycle: Lifecycle,
    handler: Router,
    // Replaced only while holding the lifecycle guard.
    config: RwLock<TlsConfigSpec>,
    redirects: Arc<RedirectPolicy>,
    autocert: AutocertSlot,
    // Manager of the running loop. Cleared when a start fails past the port
    // check and when the document changes while stopped.
    manager: Arc<RwLock<Option<Arc<AcmeManager>>>>,
}

impl SecureServer {
    /// Create a stopped server holding a copy of `config`.
    pub fn new(handler: Router, config: &TlsConfigSpec) -> Self {
        tls::install_crypto_provider();
        Self {
            lifecycle: Lifecycle::new(Scheme::Https.as_str()),
            handler,
            config: RwLock::new(config.clone()),
            redirects: Arc::new(RedirectPolicy::new()),
            autocert: Arc::new(RwLock::new(None)),
            manager: Arc::new(RwLock::new(None)),
        }
    }

    /// Listen on `ip` instead of all interfaces.
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.lifecycle = self.lifecycle.with_bind_ip(ip);
        self
    }

    /// Copy of the held TLS document.
    pub fn tls_config(&self) -> TlsConfigSpec {
        self.config.read().clone()
    }

    /// Replace the TLS document, restarting on the same port if running.
    ///
    /// The port is briefly unbound during the restart. If the new document
    /// fails to resolve or the port cannot be bound again, the server stays
    /// stopped and the error is returned; the previous document is not
    /// restored.
    pub async fn set_tls_config(&self, config: &TlsConfigSpec) -> Result<(), ServerError> {
        let mut guard = self.lifecycle.lock().await;
        *self.config.write() = config.clone();
        if !guard.is_running() {
            *self.manager.write() = None;
            return Ok(());
        }

        let port = guard.listen_port();
        tracing::info!(port, "Restarting HTTPS server with new TLS configuration");
        guard.stop().await?;
        self.start_locked(&mut guard, i32::from(port))
            .inspect_err(|e| tracing::error!(port, error = %e, "HTTPS restart failed, server left stopped"))
    }

    /// Hosts redirected to HTTP. The returned list is a copy.
    pub fn security_redirects(&self) -> Vec<String> {
        self.redirects.hosts()
    }

    pub fn set_security_redirects(&self, hosts: &[String]) {
        self.redirects.set_hosts(hosts);
    }

    pub fn autocert_handler(&self) -> Option<AutocertHandler> {
        self.autocert.read().clone()
    }

    /// Install the hook consulted before redirects and the handler, for
    /// authorities that follow a redirect to HTTPS. Usually this server's own
    /// `challenge_responder`.
    pub fn set_autocert_handler(&self, handler: Option<AutocertHandler>) {
        *self.autocert.write() = handler;
    }

    /// Manager of the running loop, if its document enabled ACME.
    pub fn acme_manager(&self) -> Option<Arc<AcmeManager>> {
        self.manager.read().clone()
    }

    /// Answer `request` if it is an ACME HTTP-01 challenge.
    ///
    /// Returns `None` when no manager is active or the request is not a
    /// challenge, in which case the caller should continue its own dispatch.
    pub fn handle_autocert_challenge(&self, request: &Request) -> Option<Response> {
        answer_challenge(&self.manager, request)
    }

    /// Hook for a sibling `PlainServer` that forwards ACME challenges here.
    ///
    /// The hook follows manager changes across restarts.
    pub fn challenge_responder(&self) -> AutocertHandler {
        let manager = Arc::clone(&self.manager);
        Arc::new(move |request: &Request| answer_challenge(&manager, request))
    }

    fn start_locked(&self, guard: &mut LifecycleGuard<'_>, port: i32) -> Result<(), ServerError> {
        let port = guard.check_start(port)?;
        self.launch_locked(guard, port).inspect_err(|_| *self.manager.write() = None)
    }

    fn launch_locked(&self, guard: &mut LifecycleGuard<'_>, port: u16) -> Result<(), ServerError> {
        let spec = self.config.read().clone();
        let (policy, manager) = tls::resolve(&spec)?;
        let rustls = RustlsConfig::from_config(Arc::new(policy.server_config()?));

        let app = build_app(
            self.handler.clone(),
            Dispatch {
                scheme: Scheme::Https,
                redirects: Arc::clone(&self.redirects),
                autocert: Arc::clone(&self.autocert),
            },
        );

        let driven = manager.clone();
        guard.launch(port, move |listener, handle| {
            Box::pin(async move {
                // Issuance runs exactly as long as this accept loop.
                let driver = driven.as_ref().and_then(|manager| manager.spawn_driver());
                let result = axum_server::from_tcp_rustls(listener, rustls)
                    .handle(handle)
                    .serve(app.into_make_service())
                    .await;
                if let Some(driver) = driver {
                    driver.abort();
                }
                result
            })
        })?;

        *self.manager.write() = manager;
        Ok(())
    }
}

fn answer_challenge(
    manager: &RwLock<Option<Arc<AcmeManager>>>,
    request: &Request,
) -> Option<Response> {
    let manager = manager.read().clone()?;
    manager.handle_challenge(request)
}

#[async_trait]
impl Server for SecureServer {
    async fn is_running(&self) -> bool {
        self.lifecycle.is_running().await
    }

    async fn start(&self, port: i32) -> Result<(), ServerError> {
        let mut guard = self.lifecycle.lock().await;
        self.start_locked(&mut guard, port)
    }

    async fn status(&self) -> ServerStatus {
        self.lifecycle.status().await
    }

    async fn stop(&self) -> Result<(), ServerError> {
        self.lifecycle.stop().await
    }

    async fn wait(&self) -> Result<(), ServerError> {
        self.lifecycle.wait().await
    }
}

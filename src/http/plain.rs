//! Plain HTTP server.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use parking_lot::RwLock;

use super::lifecycle::Lifecycle;
use super::redirect::RedirectPolicy;
use super::server::{Scheme, Server, ServerStatus};
use crate::error::ServerError;
use crate::middleware::{build_app, AutocertHandler, AutocertSlot, Dispatch};

/// An HTTP server that listens on one port at a time.
///
/// Created stopped; call `Server::start` to begin serving.
pub struct PlainServer {
    lifecycle: Lifecycle,
    handler: Router,
    redirects: Arc<RedirectPolicy>,
    autocert: AutocertSlot,
}

impl PlainServer {
    pub fn new(handler: Router) -> Self {
        Self {
            lifecycle: Lifecycle::new(Scheme::Http.as_str()),
            handler,
            redirects: Arc::new(RedirectPolicy::new()),
            autocert: Arc::new(RwLock::new(None)),
        }
    }

    /// Listen on `ip` instead of all interfaces.
    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.lifecycle = self.lifecycle.with_bind_ip(ip);
        self
    }

    /// Hosts redirected to HTTPS. The returned list is a copy.
    pub fn security_redirects(&self) -> Vec<String> {
        self.redirects.hosts()
    }

    /// Replace the hosts redirected to HTTPS. Takes effect immediately, also
    /// while running.
    pub fn set_security_redirects(&self, hosts: &[String]) {
        self.redirects.set_hosts(hosts);
    }

    pub fn autocert_handler(&self) -> Option<AutocertHandler> {
        self.autocert.read().clone()
    }

    /// Install the hook that answers ACME challenges ahead of redirects and
    /// the handler, typically `SecureServer::challenge_responder`.
    pub fn set_autocert_handler(&self, handler: Option<AutocertHandler>) {
        *self.autocert.write() = handler;
    }

    fn app(&self) -> Router {
        build_app(
            self.handler.clone(),
            Dispatch {
                scheme: Scheme::Http,
                redirects: Arc::clone(&self.redirects),
                autocert: Arc::clone(&self.autocert),
            },
        )
    }
}

#[async_trait]
impl Server for PlainServer {
    async fn is_running(&self) -> bool {
        self.lifecycle.is_running().await
    }

    async fn start(&self, port: i32) -> Result<(), ServerError> {
        let app = self.app();
        self.lifecycle
            .start(port, move |listener, handle| {
                Box::pin(
                    axum_server::from_tcp(listener)
                        .handle(handle)
                        .serve(app.into_make_service()),
                )
            })
            .await
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

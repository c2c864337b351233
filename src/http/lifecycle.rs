//! Start/stop/wait state machine shared by the plain and secure servers.
//!
//! One `Lifecycle` owns at most one listener and the background accept loop
//! serving it. The listener handle and the loop's completion signal are stored
//! together in `ActiveLoop`, so they are published and cleared as a unit.
//!
//! Locking: all state sits behind one `tokio::sync::RwLock`. `stop` keeps the
//! write lock while it waits for the loop to exit. The loop publishes its
//! completion signal *before* taking the lock for teardown, and only clears the
//! state if the recorded generation is still its own, so a loop that finishes
//! after a restart never clobbers its successor.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum_server::Handle;
use futures::future::BoxFuture;
use tokio::sync::{watch, RwLock, RwLockWriteGuard};

use super::server::ServerStatus;
use crate::error::ServerError;

/// Future driving one accept loop until its listener is closed.
pub type ServeFuture = BoxFuture<'static, std::io::Result<()>>;

/// Check a caller-supplied port against 1–65535.
pub fn validate_port(port: i32) -> Result<u16, ServerError> {
    match u16::try_from(port) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ServerError::InvalidPort(port)),
    }
}

struct ActiveLoop {
    generation: u64,
    handle: Handle,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct LifecycleState {
    active: Option<ActiveLoop>,
    listen_port: u16,
}

/// Listener ownership and accept-loop tracking for one server.
pub struct Lifecycle {
    name: &'static str,
    bind_ip: IpAddr,
    state: Arc<RwLock<LifecycleState>>,
    generations: AtomicU64,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("bind_ip", &self.bind_ip)
            .field("generations", &self.generations)
            .finish()
    }
}

impl Lifecycle {
    /// `name` labels log lines (e.g. the scheme).
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            state: Arc::new(RwLock::new(LifecycleState::default())),
            generations: AtomicU64::new(0),
        }
    }

    pub fn with_bind_ip(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Take the exclusive lock for a compound transition.
    pub async fn lock(&self) -> LifecycleGuard<'_> {
        LifecycleGuard {
            lifecycle: self,
            state: self.state.write().await,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.read().await.active.is_some()
    }

    pub async fn status(&self) -> ServerStatus {
        let state = self.state.read().await;
        ServerStatus {
            running: state.active.is_some(),
            port: state.listen_port,
        }
    }

    /// Validate, bind and launch in one locked step.
    pub async fn start<F>(&self, port: i32, serve: F) -> Result<(), ServerError>
    where
        F: FnOnce(TcpListener, Handle) -> ServeFuture,
    {
        let mut guard = self.lock().await;
        let port = guard.check_start(port)?;
        guard.launch(port, serve)
    }

    pub async fn stop(&self) -> Result<(), ServerError> {
        self.lock().await.stop().await
    }

    /// Wait for the current accept loop to exit without stopping it.
    pub async fn wait(&self) -> Result<(), ServerError> {
        let done = {
            let state = self.state.read().await;
            match &state.active {
                Some(active) => active.done.clone(),
                None => return Err(ServerError::NotListening),
            }
        };
        wait_done(done).await;
        Ok(())
    }
}

/// Exclusive access to a lifecycle's state.
///
/// Holding the guard serializes compound transitions such as a TLS hot swap
/// (stop, reconfigure, start) against every other control operation.
pub struct LifecycleGuard<'a> {
    lifecycle: &'a Lifecycle,
    state: RwLockWriteGuard<'a, LifecycleState>,
}

impl LifecycleGuard<'_> {
    pub fn is_running(&self) -> bool {
        self.state.active.is_some()
    }

    pub fn listen_port(&self) -> u16 {
        self.state.listen_port
    }

    /// Reject invalid ports and double starts before any other work.
    pub fn check_start(&self, port: i32) -> Result<u16, ServerError> {
        let port = validate_port(port)?;
        if self.is_running() {
            return Err(ServerError::AlreadyListening);
        }
        Ok(port)
    }

    /// Bind `port` and spawn the accept loop built by `serve`.
    ///
    /// Returns as soon as the loop is spawned. Bind failures are returned
    /// verbatim and leave the state untouched.
    pub fn launch<F>(&mut self, port: u16, serve: F) -> Result<(), ServerError>
    where
        F: FnOnce(TcpListener, Handle) -> ServeFuture,
    {
        if self.is_running() {
            return Err(ServerError::AlreadyListening);
        }

        let addr = SocketAddr::new(self.lifecycle.bind_ip, port);
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let handle = Handle::new();
        let (done_tx, done_rx) = watch::channel(false);
        let generation = self.lifecycle.generations.fetch_add(1, Ordering::Relaxed);

        tokio::spawn(accept_loop(
            self.lifecycle.name,
            Arc::clone(&self.lifecycle.state),
            generation,
            serve(listener, handle.clone()),
            done_tx,
        ));

        self.state.active = Some(ActiveLoop {
            generation,
            handle,
            done: done_rx,
        });
        self.state.listen_port = port;

        tracing::info!(server = self.lifecycle.name, %addr, generation, "Server started");
        Ok(())
    }

    /// Close the listener and wait for the accept loop to exit.
    pub async fn stop(&mut self) -> Result<(), ServerError> {
        let active = self.state.active.take().ok_or(ServerError::NotListening)?;

        tracing::info!(
            server = self.lifecycle.name,
            port = self.state.listen_port,
            generation = active.generation,
            "Stopping server"
        );
        active.handle.shutdown();
        wait_done(active.done).await;
        Ok(())
    }
}

async fn wait_done(mut done: watch::Receiver<bool>) {
    // An Err means the sender is gone, which only happens after the loop exited.
    let _ = done.wait_for(|done| *done).await;
}

async fn accept_loop(
    name: &'static str,
    state: Arc<RwLock<LifecycleState>>,
    generation: u64,
    serve: ServeFuture,
    done: watch::Sender<bool>,
) {
    match serve.await {
        Ok(()) => tracing::debug!(server = name, generation, "Accept loop stopped"),
        Err(e) => tracing::error!(server = name, generation, error = %e, "Accept loop failed"),
    }

    done.send_replace(true);

    let mut state = state.write().await;
    if state
        .active
        .as_ref()
        .is_some_and(|active| active.generation == generation)
    {
        state.active = None;
    }
}

//! The capability set shared by plain and secure servers.

use std::fmt;

use async_trait::async_trait;

use crate::error::ServerError;

/// Snapshot returned by `Server::status`.
///
/// `port` is the last successfully bound port; it is only meaningful while
/// `running` is true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerStatus {
    pub running: bool,
    pub port: u16,
}

/// URL scheme a request arrived on.
///
/// Inserted into every request's extensions before it reaches the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    /// The scheme security redirects point at.
    pub fn sibling(self) -> Scheme {
        match self {
            Scheme::Http => Scheme::Https,
            Scheme::Https => Scheme::Http,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A server that listens on one port at a time.
///
/// `stop` and `wait` complete only once the accept loop has exited. Every other
/// operation returns without waiting on I/O.
#[async_trait]
pub trait Server: Send + Sync {
    async fn is_running(&self) -> bool;

    /// Bind `port` and start serving in the background.
    async fn start(&self, port: i32) -> Result<(), ServerError>;

    async fn status(&self) -> ServerStatus;

    /// Close the listener and wait for the accept loop to finish.
    async fn stop(&self) -> Result<(), ServerError>;

    /// Wait for the server to stop, without stopping it.
    async fn wait(&self) -> Result<(), ServerError>;
}

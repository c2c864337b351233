//! ezserve - restartable HTTP/HTTPS servers
//!
//! Servers that can be started, stopped and waited on from many tasks at once,
//! and restarted with a new TLS configuration. HTTPS certificates are picked by
//! server name from a declarative document, with optional automatic issuance
//! through ACME whose HTTP-01 challenges are answered by the plain server.

pub mod error;
pub mod http;
pub mod middleware;
pub mod tls;

pub use error::*;
pub use http::{PlainServer, Scheme, SecureServer, Server, ServerStatus};
pub use middleware::AutocertHandler;
pub use tls::{KeyCert, TlsConfigSpec};

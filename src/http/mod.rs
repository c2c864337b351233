//! Restartable HTTP and HTTPS servers.
//!
//! Both server kinds share the `Lifecycle` state machine:
//! - **PlainServer**: raw TCP listener, optional ACME challenge hook
//! - **SecureServer**: rustls listener built from a `TlsConfigSpec`, with
//!   configuration hot swap (stop, reconfigure, restart)
//!
//! Requests on either server pass through the redirect policy before reaching
//! the handler; see `crate::middleware`.

pub mod lifecycle;
mod plain;
pub mod redirect;
mod secure;
mod server;
pub mod shutdown;

use axum::http::header::HOST;
use axum::http::Request;

pub use lifecycle::{validate_port, Lifecycle};
pub use plain::PlainServer;
pub use redirect::RedirectPolicy;
pub use secure::SecureServer;
pub use server::{Scheme, Server, ServerStatus};

/// Host the client addressed: the `Host` header, or the URI authority for
/// HTTP/2 requests that carry none.
pub(crate) fn request_host<B>(request: &Request<B>) -> Option<&str> {
    request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_host_prefers_header() {
        let request = Request::builder()
            .uri("http://authority.example/")
            .header(HOST, "header.example:8080")
            .body(())
            .unwrap();
        assert_eq!(request_host(&request), Some("header.example:8080"));
    }

    #[test]
    fn test_request_host_falls_back_to_authority() {
        let request = Request::builder()
            .uri("https://authority.example/path")
            .body(())
            .unwrap();
        assert_eq!(request_host(&request), Some("authority.example"));
    }

    #[test]
    fn test_request_host_missing() {
        let request = Request::builder().uri("/path").body(()).unwrap();
        assert_eq!(request_host(&request), None);
    }
}

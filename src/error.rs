//! Error types for server lifecycle and TLS resolution.

use std::fmt;
use std::io;

/// Errors returned by the `Server` operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid port: {0}")]
    InvalidPort(i32),

    #[error("Already listening")]
    AlreadyListening,

    #[error("Not listening")]
    NotListening,

    #[error("Failed to bind server: {0}")]
    Bind(#[from] io::Error),

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Which key/certificate pair of a TLS document failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertName {
    Default,
    Named(String),
}

impl fmt::Display for CertName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CertName::Default => write!(f, "default certificate"),
            CertName::Named(host) => write!(f, "certificate for {host}"),
        }
    }
}

/// Errors produced while turning a `TlsConfigSpec` into a runtime policy.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("Invalid {name}: {reason}")]
    InvalidCertificate { name: CertName, reason: String },

    #[error("Invalid root CA #{index}: {reason}")]
    InvalidRootCA { index: usize, reason: String },

    #[error("Failed to build TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

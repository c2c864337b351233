//! TLS configuration resolution.
//!
//! - `config`: the declarative, serializable TLS document
//! - `resolve`: document → rustls policy with server-name certificate selection
//! - `acme`: automatic issuance manager and HTTP-01 challenge responder

pub mod acme;
pub mod config;
pub mod resolve;

use std::net::IpAddr;

pub use acme::AcmeManager;
pub use config::{KeyCert, TlsConfigSpec};
pub use resolve::{resolve, CertSelector, TlsPolicy};

/// Install aws-lc-rs as the process-wide rustls provider.
///
/// Policies built here pick their provider explicitly; the ACME client inside
/// `rustls-acme` relies on the process default. Calling this more than once is
/// harmless.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Normalize a hostname to its lowercase ASCII (IDNA) form.
///
/// A leading `*.` label is preserved. Returns `None` for names that are not
/// valid hosts.
pub(crate) fn normalize_host(name: &str) -> Option<String> {
    if let Some(rest) = name.strip_prefix("*.") {
        return normalize_host(rest).map(|rest| format!("*.{rest}"));
    }
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    match url::Host::parse(name).ok()? {
        url::Host::Domain(domain) => Some(domain),
        host => Some(host.to_string()),
    }
}

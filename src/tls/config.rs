//! Declarative TLS document.
//!
//! This is the serializable shape an operator writes: a mandatory default
//! key/certificate pair, optional per-host pairs, optional trust anchors and the
//! ACME settings. It is plain data; `resolve` turns it into a runtime policy.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A PEM-encoded private key and its certificate chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCert {
    pub key: String,
    pub certificate: String,
}

/// TLS configuration for a `SecureServer`.
///
/// `Clone` produces a deep copy, so a caller may keep mutating its own value
/// after handing it to a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfigSpec {
    /// Served when no server name matches.
    pub default: KeyCert,
    /// Per-host certificates, keyed by hostname.
    #[serde(default)]
    pub named: BTreeMap<String, KeyCert>,
    /// PEM trust anchors. Empty means the system default trust.
    #[serde(default, rename = "root_ca")]
    pub root_cas: Vec<String>,
    /// ACME directory override (Let's Encrypt production when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme_dir_url: Option<String>,
    /// Hostnames eligible for automatic issuance. Empty disables ACME.
    #[serde(default)]
    pub acme_hosts: Vec<String>,
    /// On-disk cache for ACME accounts and certificates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acme_cache_dir: Option<String>,
}

impl TlsConfigSpec {
    /// Spec with only a default certificate.
    pub fn new(default: KeyCert) -> Self {
        Self {
            default,
            ..Default::default()
        }
    }

    /// Parse the JSON form of the document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read and parse a JSON document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&contents)?)
    }

    pub fn acme_enabled(&self) -> bool {
        !self.acme_hosts.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read TLS document: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TLS document: {0}")]
    Json(#[from] serde_json::Error),
}

//! TLS document → runtime policy.
//!
//! Resolution loads every key/certificate pair, builds the optional trust pool
//! and, when ACME hosts are configured, an `AcmeManager`. It is a pure function
//! of the spec: nothing is cached between calls.

use std::collections::HashMap;
use std::sync::Arc;

use rustls::crypto::aws_lc_rs;
use rustls::server::{ClientHello, ResolvesServerCert, WebPkiClientVerifier};
use rustls::sign::CertifiedKey;
use rustls::{RootCertStore, ServerConfig};
use rustls_acme::ResolvesServerCertAcme;
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

use super::acme::AcmeManager;
use super::config::{KeyCert, TlsConfigSpec};
use super::normalize_host;
use crate::error::{CertName, TlsError};

/// Runtime TLS policy produced from a `TlsConfigSpec`.
#[derive(Debug)]
pub struct TlsPolicy {
    certificates: Vec<Arc<CertifiedKey>>,
    selector: Arc<CertSelector>,
    roots: Option<Arc<RootCertStore>>,
    acme_enabled: bool,
}

/// Resolve a spec into a policy plus, if ACME is enabled, its manager.
pub fn resolve(spec: &TlsConfigSpec) -> Result<(TlsPolicy, Option<Arc<AcmeManager>>), TlsError> {
    let default = load_key_cert(&spec.default, CertName::Default)?;

    let mut certificates = vec![Arc::clone(&default)];
    let mut by_name = HashMap::with_capacity(spec.named.len());
    for (name, pair) in &spec.named {
        let loaded = load_key_cert(pair, CertName::Named(name.clone()))?;
        let key = normalize_host(name).unwrap_or_else(|| name.clone());
        by_name.insert(key, Arc::clone(&loaded));
        certificates.push(loaded);
    }

    let roots = if spec.root_cas.is_empty() {
        None
    } else {
        Some(Arc::new(load_root_cas(&spec.root_cas)?))
    };

    let acme = spec
        .acme_enabled()
        .then(|| Arc::new(AcmeManager::from_spec(spec)));

    let selector = CertSelector {
        default,
        by_name,
        acme: acme.as_ref().map(|manager| manager.resolver()),
    };

    tracing::debug!(
        certificates = certificates.len(),
        root_cas = spec.root_cas.len(),
        acme = acme.is_some(),
        "Resolved TLS policy"
    );

    let policy = TlsPolicy {
        certificates,
        selector: Arc::new(selector),
        roots,
        acme_enabled: acme.is_some(),
    };
    Ok((policy, acme))
}

impl TlsPolicy {
    /// Loaded certificates: default first, then named in hostname order.
    pub fn certificates(&self) -> &[Arc<CertifiedKey>] {
        &self.certificates
    }

    /// The server-name based certificate selector.
    pub fn selector(&self) -> &CertSelector {
        &self.selector
    }

    pub fn has_trust_pool(&self) -> bool {
        self.roots.is_some()
    }

    pub fn alpn_protocols(&self) -> Vec<Vec<u8>> {
        let mut protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        if self.acme_enabled {
            protocols.push(rustls_acme::acme::ACME_TLS_ALPN_NAME.to_vec());
        }
        protocols
    }

    /// Assemble a rustls server configuration.
    ///
    /// A trust pool turns on optional client-certificate verification; clients
    /// without a certificate are still accepted.
    pub fn server_config(&self) -> Result<ServerConfig, TlsError> {
        let provider = Arc::new(aws_lc_rs::default_provider());
        let builder = ServerConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let builder = match &self.roots {
            Some(roots) => {
                let verifier =
                    WebPkiClientVerifier::builder_with_provider(Arc::clone(roots), provider)
                        .allow_unauthenticated()
                        .build()
                        .map_err(|e| rustls::Error::General(e.to_string()))?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let selector: Arc<dyn ResolvesServerCert> = self.selector.clone();
        let mut config = builder.with_cert_resolver(selector);
        config.alpn_protocols = self.alpn_protocols();
        Ok(config)
    }
}

/// Picks a certificate for a TLS client hello.
///
/// Lookup order: exact name, single-label wildcard, then either the ACME
/// authority (when configured) or the default certificate. Clients that send
/// no server name always get the default.
pub struct CertSelector {
    default: Arc<CertifiedKey>,
    by_name: HashMap<String, Arc<CertifiedKey>>,
    acme: Option<Arc<ResolvesServerCertAcme>>,
}

impl std::fmt::Debug for CertSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertSelector")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .field("acme", &self.acme.is_some())
            .finish()
    }
}

impl CertSelector {
    pub fn default_certificate(&self) -> &Arc<CertifiedKey> {
        &self.default
    }

    /// Look a server name up in the static index.
    pub fn lookup(&self, server_name: &str) -> Option<Arc<CertifiedKey>> {
        let name = normalize_host(server_name)?;
        if let Some(cert) = self.by_name.get(&name) {
            return Some(Arc::clone(cert));
        }

        let (_, parent) = name.split_once('.')?;
        self.by_name.get(&format!("*.{parent}")).cloned()
    }
}

impl ResolvesServerCert for CertSelector {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let Some(name) = client_hello.server_name().map(str::to_owned) else {
            return Some(Arc::clone(&self.default));
        };

        if let Some(cert) = self.lookup(&name) {
            return Some(cert);
        }

        match &self.acme {
            Some(acme) => {
                tracing::debug!(server_name = %name, "Delegating certificate selection to ACME");
                acme.resolve(client_hello)
            }
            None => Some(Arc::clone(&self.default)),
        }
    }
}

fn load_key_cert(pair: &KeyCert, name: CertName) -> Result<Arc<CertifiedKey>, TlsError> {
    let invalid = |reason: String| TlsError::InvalidCertificate {
        name: name.clone(),
        reason,
    };

    let chain = CertificateDer::pem_slice_iter(pair.certificate.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(format!("unreadable certificate PEM: {e}")))?;
    if chain.is_empty() {
        return Err(invalid("no certificates found".to_string()));
    }

    let key = PrivateKeyDer::from_pem_slice(pair.key.as_bytes())
        .map_err(|e| invalid(format!("unreadable private key PEM: {e}")))?;
    let signing_key = aws_lc_rs::sign::any_supported_type(&key)
        .map_err(|e| invalid(format!("unsupported private key: {e}")))?;

    let certified = CertifiedKey::new(chain, signing_key);
    certified
        .keys_match()
        .map_err(|e| invalid(format!("private key does not match certificate: {e}")))?;
    Ok(Arc::new(certified))
}

fn load_root_cas(pems: &[String]) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();
    for (index, pem) in pems.iter().enumerate() {
        let invalid = |reason: String| TlsError::InvalidRootCA { index, reason };

        let certs = CertificateDer::pem_slice_iter(pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;
        if certs.is_empty() {
            return Err(invalid("no certificates found".to_string()));
        }
        for cert in certs {
            store.add(cert).map_err(|e| invalid(e.to_string()))?;
        }
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn self_signed(names: &[&str]) -> KeyCert {
        let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
        let generated = rcgen::generate_simple_self_signed(names).unwrap();
        KeyCert {
            key: generated.key_pair.serialize_pem(),
            certificate: generated.cert.pem(),
        }
    }

    fn same(a: &Arc<CertifiedKey>, b: &Arc<CertifiedKey>) -> bool {
        a.end_entity_cert().unwrap() == b.end_entity_cert().unwrap()
    }

    #[test]
    fn test_default_only() {
        let spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        let (policy, acme) = resolve(&spec).unwrap();

        assert_eq!(policy.certificates().len(), 1);
        assert!(acme.is_none());
        assert!(!policy.has_trust_pool());
        assert!(policy.server_config().is_ok());
    }

    #[test]
    fn test_invalid_default_fails() {
        let spec = TlsConfigSpec::new(KeyCert {
            key: "not a key".to_string(),
            certificate: "not a certificate".to_string(),
        });
        match resolve(&spec) {
            Err(TlsError::InvalidCertificate { name, .. }) => assert_eq!(name, CertName::Default),
            other => panic!("expected InvalidCertificate, got {other:?}"),
        }
    }

    #[test]
    fn test_mismatched_key_fails() {
        let cert = self_signed(&["localhost"]);
        let other = self_signed(&["localhost"]);
        let spec = TlsConfigSpec::new(KeyCert {
            key: other.key,
            certificate: cert.certificate,
        });
        assert!(matches!(
            resolve(&spec),
            Err(TlsError::InvalidCertificate { .. })
        ));
    }

    #[test]
    fn test_one_bad_named_certificate_fails_everything() {
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.named.insert("a.example.com".to_string(), self_signed(&["a.example.com"]));
        spec.named.insert("b.example.com".to_string(), KeyCert::default());
        spec.named.insert("c.example.com".to_string(), self_signed(&["c.example.com"]));

        match resolve(&spec) {
            Err(TlsError::InvalidCertificate { name, .. }) => {
                assert_eq!(name, CertName::Named("b.example.com".to_string()))
            }
            other => panic!("expected InvalidCertificate, got {other:?}"),
        }
    }

    #[test]
    fn test_certificate_order_is_default_then_named() {
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.named.insert("b.example.com".to_string(), self_signed(&["b.example.com"]));
        spec.named.insert("a.example.com".to_string(), self_signed(&["a.example.com"]));

        let (policy, _) = resolve(&spec).unwrap();
        let certs = policy.certificates();
        assert_eq!(certs.len(), 3);
        assert!(same(&certs[0], policy.selector().default_certificate()));
        assert!(same(&certs[1], &policy.selector().lookup("a.example.com").unwrap()));
        assert!(same(&certs[2], &policy.selector().lookup("b.example.com").unwrap()));
    }

    #[test]
    fn test_lookup_exact_wildcard_and_case() {
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.named.insert("www.example.com".to_string(), self_signed(&["www.example.com"]));
        spec.named.insert("*.example.com".to_string(), self_signed(&["*.example.com"]));

        let (policy, _) = resolve(&spec).unwrap();
        let selector = policy.selector();
        let exact = selector.lookup("www.example.com").unwrap();
        let wildcard = selector.lookup("api.example.com").unwrap();

        assert!(!same(&exact, &wildcard));
        assert!(same(&exact, &selector.lookup("WWW.Example.COM").unwrap()));
        assert!(selector.lookup("a.b.example.com").is_none());
        assert!(selector.lookup("example.org").is_none());
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.named.insert("a.example.com".to_string(), self_signed(&["a.example.com"]));

        let (first, _) = resolve(&spec).unwrap();
        let (second, _) = resolve(&spec).unwrap();
        assert_eq!(first.certificates().len(), second.certificates().len());
        for (a, b) in first.certificates().iter().zip(second.certificates()) {
            assert!(same(a, b));
        }
    }

    #[test]
    fn test_root_cas() {
        let ca = self_signed(&["ca.example.com"]);
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.root_cas = vec![ca.certificate];

        let (policy, _) = resolve(&spec).unwrap();
        assert!(policy.has_trust_pool());
        assert!(policy.server_config().is_ok());
    }

    #[test]
    fn test_invalid_root_ca_fails() {
        let ca = self_signed(&["ca.example.com"]);
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.root_cas = vec![ca.certificate, "garbage".to_string()];

        match resolve(&spec) {
            Err(TlsError::InvalidRootCA { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidRootCA, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_acme_hosts_create_manager() {
        let mut spec = TlsConfigSpec::new(self_signed(&["localhost"]));
        spec.acme_hosts = vec!["example.com".to_string()];
        spec.acme_dir_url = Some("https://acme.invalid/directory".to_string());

        let (policy, acme) = resolve(&spec).unwrap();
        let acme = acme.expect("manager when acme_hosts is set");
        assert_eq!(acme.hosts(), ["example.com"]);
        assert!(policy
            .alpn_protocols()
            .contains(&rustls_acme::acme::ACME_TLS_ALPN_NAME.to_vec()));
    }
}

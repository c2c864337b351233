//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::time::Duration;

use axum::routing::any;
use axum::{Extension, Router};
use ezserve::{KeyCert, Scheme};

pub const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Upper bound for anything that should finish promptly.
pub const PROMPT: Duration = Duration::from_secs(5);

/// A port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind((LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// Handler that answers with the scheme the request arrived on.
pub fn scheme_echo() -> Router {
    Router::new().fallback(any(|Extension(scheme): Extension<Scheme>| async move {
        scheme.to_string()
    }))
}

/// Throwaway self-signed certificate plus its DER form.
pub struct TestCert {
    pub pair: KeyCert,
    pub der: Vec<u8>,
}

pub fn self_signed(names: &[&str]) -> TestCert {
    let names = names.iter().map(|n| n.to_string()).collect::<Vec<_>>();
    let generated = rcgen::generate_simple_self_signed(names).unwrap();
    TestCert {
        pair: KeyCert {
            key: generated.key_pair.serialize_pem(),
            certificate: generated.cert.pem(),
        },
        der: generated.cert.der().to_vec(),
    }
}

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(PROMPT)
        .build()
        .unwrap()
}

/// HTTPS client that trusts anything and sends `hosts` to the local port.
pub fn https_client(port: u16, hosts: &[&str]) -> reqwest::Client {
    let mut builder = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .tls_info(true)
        .redirect(reqwest::redirect::Policy::none())
        .timeout(PROMPT);
    for host in hosts {
        builder = builder.resolve(host, SocketAddr::new(LOCALHOST, port));
    }
    builder.build().unwrap()
}

/// DER of the certificate the server presented.
pub fn peer_certificate(response: &reqwest::Response) -> Vec<u8> {
    response
        .extensions()
        .get::<reqwest::tls::TlsInfo>()
        .and_then(|info| info.peer_certificate())
        .expect("TLS info with a peer certificate")
        .to_vec()
}

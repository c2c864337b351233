//! Security redirects between the plain and secure servers.
//!
//! Each server keeps a list of hosts whose requests are bounced to the sibling
//! scheme (HTTP → HTTPS on the plain server, HTTPS → HTTP on the secure one)
//! instead of reaching the handler.

use axum::http::Uri;
use axum::response::Redirect;
use parking_lot::RwLock;

use super::server::Scheme;

/// Set of hosts redirected to the sibling scheme.
#[derive(Debug, Default)]
pub struct RedirectPolicy {
    hosts: RwLock<Vec<String>>,
}

impl RedirectPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive membership test against the request's host.
    pub fn should_redirect(&self, host: &str) -> bool {
        self.hosts.read().iter().any(|h| h == host)
    }

    /// Copy of the configured hosts.
    pub fn hosts(&self) -> Vec<String> {
        self.hosts.read().clone()
    }

    /// Replace the configured hosts with a copy of `hosts`.
    pub fn set_hosts(&self, hosts: &[String]) {
        *self.hosts.write() = hosts.to_vec();
    }
}

/// Temporary redirect to the same host and path under `scheme`'s sibling.
pub fn redirect_to_sibling(scheme: Scheme, host: &str, uri: &Uri) -> Redirect {
    let target = format!(
        "{}://{}{}",
        scheme.sibling(),
        host,
        uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    );

    tracing::debug!(from = %uri, to = %target, "Security redirect");

    Redirect::temporary(&target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn test_should_redirect_is_exact() {
        let policy = RedirectPolicy::new();
        policy.set_hosts(&["example.com".to_string(), "example.com:8080".to_string()]);

        assert!(policy.should_redirect("example.com"));
        assert!(policy.should_redirect("example.com:8080"));
        assert!(!policy.should_redirect("Example.com"));
        assert!(!policy.should_redirect("www.example.com"));
        assert!(!policy.should_redirect("example.com:9090"));
    }

    #[test]
    fn test_empty_policy_redirects_nothing() {
        assert!(!RedirectPolicy::new().should_redirect("example.com"));
    }

    #[test]
    fn test_hosts_round_trip_and_copies() {
        let policy = RedirectPolicy::new();
        let mut input = vec!["a.example.com".to_string(), "b.example.com".to_string()];
        policy.set_hosts(&input);
        input.push("c.example.com".to_string());

        let mut output = policy.hosts();
        assert_eq!(output, vec!["a.example.com", "b.example.com"]);

        output.clear();
        assert_eq!(policy.hosts().len(), 2);
        assert!(!policy.should_redirect("c.example.com"));
    }

    #[test]
    fn test_duplicates_are_inert() {
        let policy = RedirectPolicy::new();
        policy.set_hosts(&["a.example.com".to_string(), "a.example.com".to_string()]);
        assert!(policy.should_redirect("a.example.com"));
        policy.set_hosts(&[]);
        assert!(!policy.should_redirect("a.example.com"));
    }

    #[test]
    fn test_redirect_keeps_host_path_and_query() {
        let uri: Uri = "/docs/page?lang=en".parse().unwrap();
        let response = redirect_to_sibling(Scheme::Http, "example.com:8080", &uri).into_response();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[LOCATION],
            "https://example.com:8080/docs/page?lang=en"
        );
    }

    #[test]
    fn test_redirect_from_https_goes_to_http() {
        let uri: Uri = "https://example.com/".parse().unwrap();
        let response = redirect_to_sibling(Scheme::Https, "example.com", &uri).into_response();
        assert_eq!(response.headers()[LOCATION], "http://example.com/");
    }
}

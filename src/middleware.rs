//! Composite request dispatch wrapped around the external handler.
//!
//! Every request passes through `dispatch_layer` in this order:
//! 1. The ACME challenge hook, if one is installed
//! 2. The security redirect policy
//! 3. The handler, with the arrival `Scheme` attached as an extension

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::RwLock;
use tower_http::trace::TraceLayer;

use crate::http::redirect::{redirect_to_sibling, RedirectPolicy};
use crate::http::request_host;
use crate::http::Scheme;

/// Hook consulted before redirects and the handler.
///
/// Returns `Some(response)` when it fully answered the request.
pub type AutocertHandler = Arc<dyn Fn(&Request) -> Option<Response> + Send + Sync>;

/// Shared slot holding the current hook.
pub type AutocertSlot = Arc<RwLock<Option<AutocertHandler>>>;

/// State for `dispatch_layer`, shared with the owning server.
#[derive(Clone)]
pub struct Dispatch {
    pub scheme: Scheme,
    pub redirects: Arc<RedirectPolicy>,
    pub autocert: AutocertSlot,
}

/// Wrap `handler` with the dispatch middleware and request tracing.
pub fn build_app(handler: Router, dispatch: Dispatch) -> Router {
    Router::new()
        .fallback_service(handler)
        .layer(middleware::from_fn_with_state(dispatch, dispatch_layer))
        .layer(TraceLayer::new_for_http())
}

pub async fn dispatch_layer(
    State(dispatch): State<Dispatch>,
    mut request: Request,
    next: Next,
) -> Response {
    let hook = dispatch.autocert.read().clone();
    if let Some(response) = hook.and_then(|hook| hook(&request)) {
        return response;
    }

    if let Some(host) = request_host(&request) {
        if dispatch.redirects.should_redirect(host) {
            return redirect_to_sibling(dispatch.scheme, host, request.uri()).into_response();
        }
    }

    request.extensions_mut().insert(dispatch.scheme);
    next.run(request).await
}

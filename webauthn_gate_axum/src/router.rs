//! Router for the WebAuthn endpoints

use axum::{Router, routing::post};
use tower_http::LatencyUnit;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use webauthn_gate::WebauthnGate;

use super::handlers::{handle_login, handle_logout, handle_register, handle_response};

/// Create a router for the WebAuthn endpoints of `gate`
///
/// The paths come from the gate's configuration and default to:
/// - POST /register
/// - POST /login
/// - POST /response
/// - POST /logout
///
/// Mount it with [`mount`].
pub fn webauthn_router(gate: WebauthnGate) -> Router {
    webauthn_router_no_trace(gate).layer(
        TraceLayer::new_for_http()
            .make_span_with(
                DefaultMakeSpan::new()
                    .level(Level::INFO)
                    .include_headers(false),
            )
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(
                DefaultOnResponse::new()
                    .level(Level::INFO)
                    .latency_unit(LatencyUnit::Millis),
            ),
    )
}

/// Same as [`webauthn_router`] but without the HTTP tracing middleware
///
/// Use this if you want to add your own tracing middleware.
pub fn webauthn_router_no_trace(gate: WebauthnGate) -> Router {
    let endpoints = gate.config().endpoints().clone();
    Router::new()
        .route(&endpoints.register, post(handle_register))
        .route(&endpoints.login, post(handle_login))
        .route(&endpoints.response, post(handle_response))
        .route(&endpoints.logout, post(handle_logout))
        .with_state(gate)
}

/// Mount `router` on `app` under `prefix`
///
/// Axum cannot nest at the root, so an empty or "/" prefix merges the routes instead.
/// Both routers must already have their state attached with `with_state`.
pub fn mount(app: Router, prefix: &str, router: Router) -> Router {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        tracing::debug!("Mounting WebAuthn endpoints at /");
        app.merge(router)
    } else if prefix.starts_with('/') {
        tracing::debug!("Mounting WebAuthn endpoints at {prefix}");
        app.nest(prefix, router)
    } else {
        tracing::debug!("Mounting WebAuthn endpoints at /{prefix}");
        app.nest(&format!("/{prefix}"), router)
    }
}

use std::time::Duration;

use askama::Template;
use axum::{
    Json, Router,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde_json::json;

use webauthn_gate_axum::{
    AuthUser, GateConfig, GateError, WEBAUTHN_ROUTE_PREFIX, WebauthnGate, mount, webauthn_router,
};

mod server;

use server::{init_tracing, listen_addr};

const DEFAULT_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_RP_NAME: &str = "OWASP Org.";
const SESSION_REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Template)]
#[template(path = "index.j2")]
struct IndexTemplate<'a> {
    message: &'a str,
    username: Option<&'a str>,
    route_prefix: &'a str,
}

async fn index(user: Option<AuthUser>) -> Response {
    let message = match &user {
        Some(u) => format!("Hello, {}!", u.username),
        None => "Hello, anonymous user".to_string(),
    };
    let template = IndexTemplate {
        message: &message,
        username: user.as_ref().map(|u| u.username.as_str()),
        route_prefix: WEBAUTHN_ROUTE_PREFIX.trim_end_matches('/'),
    };
    match template.render() {
        Ok(html) => (StatusCode::OK, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render index: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn profile(user: AuthUser) -> impl IntoResponse {
    Json(json!({
        "username": user.username,
        "attributes": user.attributes,
        "credentials": user.credential_count,
        "since": user.created_at,
    }))
}

async fn webauthn_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        include_str!("../static/webauthn.js"),
    )
}

/// The reference configuration, with any environment variable that is set taking precedence.
fn load_config() -> Result<GateConfig, GateError> {
    GateConfig::new(DEFAULT_ORIGIN)?
        .with_rp_name(DEFAULT_RP_NAME)
        .with_user_fields([("username", "username")])
        .with_username_field("username")
        .apply_env()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("demo_webauthn");

    let gate = WebauthnGate::with_memory_store(load_config()?).await?;
    gate.spawn_session_reaper(SESSION_REAP_INTERVAL);

    let pages = Router::new()
        .route("/", get(index))
        .route("/profile", get(profile))
        .route("/static/webauthn.js", get(webauthn_js))
        .with_state(gate.clone());
    let app = mount(pages, &WEBAUTHN_ROUTE_PREFIX, webauthn_router(gate.clone()));

    let addr = listen_addr()?;
    tracing::info!("Starting server on {}", gate.config().origin());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

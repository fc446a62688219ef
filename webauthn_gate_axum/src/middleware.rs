use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use webauthn_gate::WebauthnGate;

use super::error::error_response;
use super::session::AuthUser;

/// Authentication checker with 401 response
///
/// Use with [`axum::middleware::from_fn_with_state`]. On success the [`AuthUser`] is
/// stored in the request extensions, where the extractor picks it up.
pub async fn require_authentication(
    State(gate): State<WebauthnGate>,
    mut req: Request,
    next: Next,
) -> Response {
    match gate.require_user(req.headers()).await {
        Ok(user) => {
            tracing::debug!("Authenticated request from {}", user.username);
            req.extensions_mut().insert(AuthUser::from(user));
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!("Unauthenticated request to {}", req.uri().path());
            error_response(err).into_response()
        }
    }
}

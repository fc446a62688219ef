use std::ops::Deref;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts, OptionalFromRequestParts},
};
use http::{StatusCode, request::Parts};
use webauthn_gate::{GateError, UserSummary, WebauthnGate};

use crate::error::{ErrorBody, error_response};

/// Authenticated user information, available as an Axum extractor
///
/// The extractor reads the session cookie and resolves the user the session was
/// logged in as. It requires the router state to provide a [`WebauthnGate`] through
/// [`FromRef`]. Requests without an authenticated session are answered with
/// `401 {"status": "failed", "message": "Unauthorized"}`.
///
/// When [`require_authentication`](crate::require_authentication) already ran, the user
/// it stored in the request extensions is reused.
///
/// # Example
///
/// ```no_run
/// use axum::{routing::get, Router};
/// use webauthn_gate_axum::{AuthUser, WebauthnGate};
///
/// async fn protected_handler(user: AuthUser) -> String {
///     format!("Hello, {}!", user.username)
/// }
///
/// fn app(gate: WebauthnGate) -> Router {
///     Router::new()
///         .route("/protected", get(protected_handler))
///         .with_state(gate)
/// }
/// ```
#[derive(Clone, Debug)]
pub struct AuthUser {
    user: UserSummary,
}

impl AuthUser {
    pub fn into_inner(self) -> UserSummary {
        self.user
    }
}

impl Deref for AuthUser {
    type Target = UserSummary;

    fn deref(&self) -> &Self::Target {
        &self.user
    }
}

impl From<UserSummary> for AuthUser {
    fn from(user: UserSummary) -> Self {
        Self { user }
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    WebauthnGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let gate = WebauthnGate::from_ref(state);
        match gate.require_user(&parts.headers).await {
            Ok(user) => Ok(user.into()),
            Err(err) => {
                tracing::debug!("Rejecting unauthenticated request to {}", parts.uri.path());
                Err(error_response(err))
            }
        }
    }
}

impl<S> OptionalFromRequestParts<S> for AuthUser
where
    WebauthnGate: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorBody>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(Some(user.clone()));
        }

        let gate = WebauthnGate::from_ref(state);
        match gate.require_user(&parts.headers).await {
            Ok(user) => Ok(Some(user.into())),
            Err(GateError::Unauthorized) => Ok(None),
            Err(err) => Err(error_response(err)),
        }
    }
}

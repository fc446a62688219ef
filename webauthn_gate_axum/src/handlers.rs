use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use serde_json::Value;

use webauthn_gate::{
    CreationChallengeResponse, GateError, RequestChallengeResponse, ResponseKind, WebauthnGate,
    session_id_from_headers,
};

use crate::error::{ErrorBody, IntoResponseError, error_response};

type HandlerResult<T> = Result<(HeaderMap, Json<T>), (StatusCode, Json<ErrorBody>)>;

#[derive(Debug, Serialize)]
pub(crate) struct StatusBody {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ResponseKind>,
}

impl StatusBody {
    fn ok() -> Self {
        Self {
            status: "ok",
            username: None,
            kind: None,
        }
    }
}

/// A session created for a request that then failed never reaches the browser.
async fn discard_unsent_session(gate: &WebauthnGate, session_id: &str, created: bool) {
    if created {
        tracing::debug!("Discarding session created for a failed request");
        gate.sessions().remove(session_id).await;
    }
}

pub(crate) async fn handle_register(
    State(gate): State<WebauthnGate>,
    request_headers: HeaderMap,
    Json(body): Json<Value>,
) -> HandlerResult<CreationChallengeResponse> {
    let (session_id, cookie) = gate
        .ensure_session(&request_headers)
        .await
        .into_response_error()?;

    let options = match gate.start_registration(&session_id, &body).await {
        Ok(options) => options,
        Err(err) => {
            discard_unsent_session(&gate, &session_id, cookie.is_some()).await;
            return Err(error_response(err));
        }
    };

    Ok((cookie.unwrap_or_default(), Json(options)))
}

pub(crate) async fn handle_login(
    State(gate): State<WebauthnGate>,
    request_headers: HeaderMap,
    Json(body): Json<Value>,
) -> HandlerResult<RequestChallengeResponse> {
    let (session_id, cookie) = gate
        .ensure_session(&request_headers)
        .await
        .into_response_error()?;

    let options = match gate.start_login(&session_id, &body).await {
        Ok(options) => options,
        Err(err) => {
            discard_unsent_session(&gate, &session_id, cookie.is_some()).await;
            return Err(error_response(err));
        }
    };

    Ok((cookie.unwrap_or_default(), Json(options)))
}

pub(crate) async fn handle_response(
    State(gate): State<WebauthnGate>,
    request_headers: HeaderMap,
    Json(body): Json<Value>,
) -> HandlerResult<StatusBody> {
    // Without a session there cannot be a pending challenge
    let session_id = session_id_from_headers(&request_headers)
        .ok()
        .flatten()
        .ok_or(GateError::NoPendingChallenge)
        .into_response_error()?;

    let outcome = gate.finish(session_id, body).await.into_response_error()?;

    // The session moved to a new id on login
    let cookie = gate
        .session_cookie(&outcome.session_id)
        .into_response_error()?;

    Ok((
        cookie,
        Json(StatusBody {
            status: "ok",
            username: Some(outcome.username),
            kind: Some(outcome.kind),
        }),
    ))
}

pub(crate) async fn handle_logout(
    State(gate): State<WebauthnGate>,
    request_headers: HeaderMap,
) -> HandlerResult<StatusBody> {
    let session_id = session_id_from_headers(&request_headers).ok().flatten();

    let cookie = gate.logout(session_id).await.into_response_error()?;

    Ok((cookie, Json(StatusBody::ok())))
}

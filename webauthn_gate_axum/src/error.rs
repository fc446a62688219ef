use axum::Json;
use http::StatusCode;
use serde::Serialize;
use webauthn_gate::GateError;

/// JSON body of every failed request: `{"status": "failed", "message": ...}`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            status: "failed",
            message: message.into(),
        }
    }
}

/// Helper trait for converting errors to a standard response error format
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, Json<ErrorBody>)>;
}

pub(crate) fn status_for(err: &GateError) -> StatusCode {
    match err {
        GateError::MissingField(_)
        | GateError::NoPendingChallenge
        | GateError::ChallengeExpired
        | GateError::InvalidResponse(_) => StatusCode::BAD_REQUEST,
        GateError::Verification(_) | GateError::Unauthorized => StatusCode::UNAUTHORIZED,
        GateError::UserExists(_) | GateError::UserNotFound(_) => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn error_response(err: GateError) -> (StatusCode, Json<ErrorBody>) {
    let status = status_for(&err);
    // Internal details stay in the log
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        "Internal server error".to_string()
    } else {
        err.to_string()
    };
    (status, Json(ErrorBody::failed(message)))
}

/// Implementation for GateError to map variants to appropriate status codes
impl<T> IntoResponseError<T> for Result<T, GateError> {
    fn into_response_error(self) -> Result<T, (StatusCode, Json<ErrorBody>)> {
        self.map_err(error_response)
    }
}

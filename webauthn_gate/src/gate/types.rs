use serde::Serialize;
use serde_json::Value;

use super::errors::GateError;

/// What a `/response` body carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// A new credential (`response.attestationObject`), finishing registration.
    Attestation,
    /// A signature (`response.authenticatorData`), finishing login.
    Assertion,
}

impl ResponseKind {
    /// Classify a client response by the fields of its `response` member.
    pub fn classify(body: &Value) -> Result<Self, GateError> {
        let response = body
            .get("response")
            .filter(|r| r.is_object())
            .ok_or_else(|| {
                GateError::InvalidResponse("Missing 'response' object".to_string()).log()
            })?;

        let has = |field: &str| response.get(field).is_some_and(|v| !v.is_null());
        match (has("attestationObject"), has("authenticatorData")) {
            (true, false) => Ok(Self::Attestation),
            (false, true) => Ok(Self::Assertion),
            (true, true) => Err(GateError::InvalidResponse(
                "Response carries both attestationObject and authenticatorData".to_string(),
            )
            .log()),
            (false, false) => Err(GateError::InvalidResponse(
                "Response carries neither attestationObject nor authenticatorData".to_string(),
            )
            .log()),
        }
    }
}

/// Result of a successful `/response`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FinishOutcome {
    pub username: String,
    pub kind: ResponseKind,
    /// Replacement session id; the caller must hand it to the browser.
    #[serde(skip)]
    pub session_id: String,
}

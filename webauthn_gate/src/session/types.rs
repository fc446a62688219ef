use chrono::{DateTime, Utc};
use uuid::Uuid;
use webauthn_rs::prelude::{PasskeyAuthentication, PasskeyRegistration};

use crate::gate::ResponseKind;

/// A ceremony started by `/register` or `/login` and awaiting its `/response`.
#[derive(Debug, Clone)]
pub enum PendingCeremony {
    Registration {
        username: String,
        /// Handle of the user record the challenge was issued for.
        user_id: Uuid,
        state: PasskeyRegistration,
        started_at: DateTime<Utc>,
    },
    Authentication {
        username: String,
        state: PasskeyAuthentication,
        started_at: DateTime<Utc>,
    },
}

impl PendingCeremony {
    pub fn username(&self) -> &str {
        match self {
            Self::Registration { username, .. } | Self::Authentication { username, .. } => {
                username
            }
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        match self {
            Self::Registration { started_at, .. } | Self::Authentication { started_at, .. } => {
                *started_at
            }
        }
    }

    /// The kind of client response that completes this ceremony.
    pub fn expected_response(&self) -> ResponseKind {
        match self {
            Self::Registration { .. } => ResponseKind::Attestation,
            Self::Authentication { .. } => ResponseKind::Assertion,
        }
    }
}

/// Per-browser state behind the session cookie.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub pending: Option<PendingCeremony>,
    /// Username of the authenticated user, if any.
    pub logged_in: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl SessionState {
    pub(super) fn new(expires_at: DateTime<Utc>) -> Self {
        Self {
            pending: None,
            logged_in: None,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

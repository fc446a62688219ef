//! webauthn_gate - WebAuthn relying-party endpoints for web applications
//!
//! This crate wires the `webauthn-rs` library to a configurable relying party:
//! origin, relying-party name, user field mapping and a pluggable credential store.
//! Challenges, attestation and assertion verification are left to `webauthn-rs`;
//! this crate keeps the per-browser session state and the user records around it.

mod config;
mod gate;
mod session;
mod storage;
mod utils;

pub use config::{DISPLAY_NAME_ATTRIBUTE, Endpoints, GateConfig, WEBAUTHN_ROUTE_PREFIX};

pub use gate::{FinishOutcome, GateError, ResponseKind, WebauthnGate};

pub use session::{
    PendingCeremony, SESSION_COOKIE_NAME, SessionError, SessionState, SessionStore,
    session_id_from_headers,
};

pub use storage::{CredentialStore, InMemoryCredentialStore, StorageError, StoredUser, UserSummary};

pub use utils::UtilError;

// Re-export the WebAuthn option types handed to clients
pub use webauthn_rs::prelude::{CreationChallengeResponse, RequestChallengeResponse};

//! Error types for the gate

use thiserror::Error;
use webauthn_rs::prelude::WebauthnError;

use crate::session::SessionError;
use crate::storage::StorageError;
use crate::utils::UtilError;

/// Errors surfaced by [`WebauthnGate`](super::WebauthnGate) operations
#[derive(Error, Debug)]
pub enum GateError {
    /// Invalid relying-party configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The username (or another required field) was absent from the request
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Registration was attempted for a username that already holds credentials
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Login was attempted for an unknown or unregistered username
    #[error("User does not exist: {0}")]
    UserNotFound(String),

    /// A response arrived without a preceding `/register` or `/login`
    #[error("No pending challenge for this session")]
    NoPendingChallenge,

    /// The pending challenge outlived the configured timeout
    #[error("Challenge expired")]
    ChallengeExpired,

    /// The client response could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The WebAuthn library rejected the attestation or assertion
    #[error("Verification failed: {0}")]
    Verification(String),

    /// The session is not authenticated
    #[error("Unauthorized")]
    Unauthorized,

    /// The WebAuthn library failed while creating a challenge
    #[error("WebAuthn error: {0}")]
    Webauthn(WebauthnError),

    /// Error from the credential store
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Error from session handling
    #[error("Session error: {0}")]
    Session(SessionError),

    /// Error from utils operations
    #[error("Utils error: {0}")]
    Utils(UtilError),
}

impl GateError {
    /// Log the error and return self
    ///
    /// Client mistakes are logged at warn level, server-side failures at error level.
    pub fn log(self) -> Self {
        if self.is_client_error() {
            tracing::warn!("{}", self);
        } else {
            tracing::error!("{}", self);
        }
        self
    }

    /// Whether the error was caused by the request rather than by the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField(_)
                | Self::UserExists(_)
                | Self::UserNotFound(_)
                | Self::NoPendingChallenge
                | Self::ChallengeExpired
                | Self::InvalidResponse(_)
                | Self::Verification(_)
                | Self::Unauthorized
        )
    }
}

// Custom From implementations that automatically log errors

impl From<WebauthnError> for GateError {
    fn from(err: WebauthnError) -> Self {
        Self::Webauthn(err).log()
    }
}

impl From<StorageError> for GateError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err).log()
    }
}

impl From<SessionError> for GateError {
    fn from(err: SessionError) -> Self {
        Self::Session(err).log()
    }
}

impl From<UtilError> for GateError {
    fn from(err: UtilError) -> Self {
        Self::Utils(err).log()
    }
}

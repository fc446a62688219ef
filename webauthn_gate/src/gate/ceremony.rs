use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::HeaderMap;
use serde_json::Value;
use tokio::task::JoinHandle;
use uuid::Uuid;
use webauthn_rs::prelude::{
    CreationChallengeResponse, CredentialID, PublicKeyCredential, RegisterPublicKeyCredential,
    RequestChallengeResponse,
};
use webauthn_rs::{Webauthn, WebauthnBuilder};

use super::errors::GateError;
use super::types::{FinishOutcome, ResponseKind};
use crate::config::GateConfig;
use crate::session::{
    PendingCeremony, SessionError, SessionStore, clear_session_cookie_headers, session_cookie_headers,
    session_id_from_headers,
};
use crate::storage::{CredentialStore, InMemoryCredentialStore, StoredUser, UserSummary};

/// WebAuthn relying party bound to a configuration, a credential store and a session table.
///
/// Cloning is cheap; all clones share the same state.
#[derive(Clone)]
pub struct WebauthnGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    webauthn: Webauthn,
    config: GateConfig,
    store: Arc<dyn CredentialStore>,
    sessions: SessionStore,
}

impl fmt::Debug for WebauthnGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebauthnGate")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl WebauthnGate {
    /// Build the relying party and initialise `store`.
    pub async fn new(
        config: GateConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, GateError> {
        if !config
            .user_fields
            .values()
            .any(|attr| attr == &config.username_field)
        {
            return Err(GateError::Config(format!(
                "Username field '{}' is not among the user fields",
                config.username_field
            ))
            .log());
        }

        let endpoints = &config.endpoints;
        let paths = [
            &endpoints.register,
            &endpoints.login,
            &endpoints.response,
            &endpoints.logout,
        ];
        if let Some(bad) = paths.iter().find(|p| !p.starts_with('/') || p.len() < 2) {
            return Err(GateError::Config(format!("Invalid endpoint path '{bad}'")).log());
        }
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        if unique.len() != paths.len() {
            return Err(GateError::Config("Endpoint paths must be distinct".to_string()).log());
        }

        let webauthn = WebauthnBuilder::new(&config.rp_id, &config.origin)
            .and_then(|builder| builder.rp_name(&config.rp_name).build())
            .map_err(|e| {
                GateError::Config(format!(
                    "Cannot build relying party for rp_id '{}' and origin '{}': {e}",
                    config.rp_id, config.origin
                ))
                .log()
            })?;

        store.init().await?;

        tracing::info!(
            rp_id = %config.rp_id,
            origin = %config.origin,
            rp_name = %config.rp_name,
            "WebAuthn relying party ready"
        );

        let sessions = SessionStore::new(config.session_ttl);
        Ok(Self {
            inner: Arc::new(GateInner {
                webauthn,
                config,
                store,
                sessions,
            }),
        })
    }

    /// Build the relying party on top of a fresh [`InMemoryCredentialStore`].
    pub async fn with_memory_store(config: GateConfig) -> Result<Self, GateError> {
        Self::new(config, Arc::new(InMemoryCredentialStore::new())).await
    }

    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Resolve the session of a request, creating one when the cookie is absent or stale.
    ///
    /// The second element holds `Set-Cookie` headers when a session was created.
    pub async fn ensure_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<(String, Option<HeaderMap>), GateError> {
        if let Some(session_id) = session_id_from_headers(headers)? {
            if self.inner.sessions.contains(session_id).await {
                return Ok((session_id.to_string(), None));
            }
            tracing::debug!("Session cookie refers to an unknown or expired session");
        }

        let session_id = self.inner.sessions.create().await?;
        let cookie = self.session_cookie(&session_id)?;
        Ok((session_id, Some(cookie)))
    }

    /// `Set-Cookie` headers for `session_id`.
    pub fn session_cookie(&self, session_id: &str) -> Result<HeaderMap, GateError> {
        Ok(session_cookie_headers(
            session_id,
            self.inner.config.session_ttl,
            self.inner.config.secure_cookies(),
        )?)
    }

    /// Begin registering a new user and return the credential creation options.
    #[tracing::instrument(skip_all)]
    pub async fn start_registration(
        &self,
        session_id: &str,
        body: &Value,
    ) -> Result<CreationChallengeResponse, GateError> {
        let config = &self.inner.config;
        let username = config.extract_username(body)?;
        let attributes = config.extract_user_fields(body);

        let user = match self.inner.store.get(&username).await? {
            Some(user) if user.registered => {
                return Err(GateError::UserExists(username).log());
            }
            Some(mut user) => {
                tracing::debug!("Restarting registration for unregistered user {username}");
                user.attributes = attributes;
                user.touch();
                user
            }
            None => StoredUser::new(username.clone(), attributes),
        };
        self.inner.store.put(user.clone()).await?;

        let exclude_credentials: Option<Vec<CredentialID>> = if user.credentials.is_empty() {
            None
        } else {
            Some(user.credentials.iter().map(|c| c.cred_id().clone()).collect())
        };

        let (options, state) = self.inner.webauthn.start_passkey_registration(
            user.id,
            &user.username,
            user.display_name(),
            exclude_credentials,
        )?;

        self.set_pending(
            session_id,
            PendingCeremony::Registration {
                username,
                user_id: user.id,
                state,
                started_at: Utc::now(),
            },
        )
        .await?;

        tracing::info!("Registration challenge issued for {}", user.username);
        Ok(options)
    }

    /// Begin authenticating a registered user and return the credential request options.
    #[tracing::instrument(skip_all)]
    pub async fn start_login(
        &self,
        session_id: &str,
        body: &Value,
    ) -> Result<RequestChallengeResponse, GateError> {
        let username = self.inner.config.extract_username(body)?;

        let user = self
            .inner
            .store
            .get(&username)
            .await?
            .filter(|u| u.registered && !u.credentials.is_empty())
            .ok_or_else(|| GateError::UserNotFound(username.clone()).log())?;

        let (options, state) = self
            .inner
            .webauthn
            .start_passkey_authentication(&user.credentials)?;

        self.set_pending(
            session_id,
            PendingCeremony::Authentication {
                username,
                state,
                started_at: Utc::now(),
            },
        )
        .await?;

        tracing::info!("Authentication challenge issued for {}", user.username);
        Ok(options)
    }

    /// Complete the pending ceremony of `session_id` with the client's response.
    ///
    /// The pending challenge is consumed whatever the outcome. On success the session is
    /// logged in and moved to a new id, returned in the outcome.
    #[tracing::instrument(skip_all)]
    pub async fn finish(&self, session_id: &str, body: Value) -> Result<FinishOutcome, GateError> {
        let kind = ResponseKind::classify(&body)?;

        let pending = match self
            .inner
            .sessions
            .update(session_id, |state| state.pending.take())
            .await
        {
            Ok(pending) => pending,
            Err(SessionError::NotFound) => None,
            Err(e) => return Err(e.into()),
        }
        .ok_or_else(|| GateError::NoPendingChallenge.log())?;

        let timeout = chrono::Duration::from_std(self.inner.config.challenge_timeout)
            .unwrap_or(chrono::Duration::MAX);
        if Utc::now() - pending.started_at() > timeout {
            return Err(GateError::ChallengeExpired.log());
        }

        if pending.expected_response() != kind {
            return Err(GateError::InvalidResponse(format!(
                "Expected {:?} but received {:?}",
                pending.expected_response(),
                kind
            ))
            .log());
        }

        let username = match pending {
            PendingCeremony::Registration {
                username,
                user_id,
                state,
                ..
            } => {
                let credential: RegisterPublicKeyCredential = parse_credential(body)?;
                let passkey = self
                    .inner
                    .webauthn
                    .finish_passkey_registration(&credential, &state)
                    .map_err(|e| GateError::Verification(e.to_string()).log())?;
                self.complete_registration(&username, user_id, passkey)
                    .await?;
                username
            }
            PendingCeremony::Authentication {
                username, state, ..
            } => {
                let credential: PublicKeyCredential = parse_credential(body)?;
                let result = self
                    .inner
                    .webauthn
                    .finish_passkey_authentication(&credential, &state)
                    .map_err(|e| GateError::Verification(e.to_string()).log())?;
                self.complete_authentication(&username, &result).await?;
                username
            }
        };

        self.inner
            .sessions
            .update(session_id, |state| state.logged_in = Some(username.clone()))
            .await?;
        let session_id = self.inner.sessions.rotate(session_id).await?;

        tracing::info!("{kind:?} verified, {username} logged in");
        Ok(FinishOutcome {
            username,
            kind,
            session_id,
        })
    }

    /// Drop the session. Unknown sessions are ignored.
    ///
    /// Returns the `Set-Cookie` headers that clear the cookie.
    #[tracing::instrument(skip_all)]
    pub async fn logout(&self, session_id: Option<&str>) -> Result<HeaderMap, GateError> {
        if let Some(session_id) = session_id {
            if let Some(state) = self.inner.sessions.get(session_id).await {
                if let Some(username) = state.logged_in {
                    tracing::info!("{username} logged out");
                }
            }
            self.inner.sessions.remove(session_id).await;
        }
        Ok(clear_session_cookie_headers(
            self.inner.config.secure_cookies(),
        )?)
    }

    /// The user logged in on `session_id`, if any and still present in the store.
    pub async fn authenticated_user(
        &self,
        session_id: &str,
    ) -> Result<Option<UserSummary>, GateError> {
        let Some(username) = self
            .inner
            .sessions
            .get(session_id)
            .await
            .and_then(|state| state.logged_in)
        else {
            return Ok(None);
        };

        Ok(self
            .inner
            .store
            .get(&username)
            .await?
            .filter(|u| u.registered)
            .as_ref()
            .map(UserSummary::from))
    }

    /// The user behind the session cookie of a request, or `Unauthorized`.
    pub async fn require_user(&self, headers: &HeaderMap) -> Result<UserSummary, GateError> {
        // An unreadable cookie header is treated like a missing one
        let session_id = session_id_from_headers(headers)
            .ok()
            .flatten()
            .ok_or(GateError::Unauthorized)?;
        self.authenticated_user(session_id)
            .await?
            .ok_or(GateError::Unauthorized)
    }

    /// Periodically drop expired sessions.
    pub fn spawn_session_reaper(&self, every: Duration) -> JoinHandle<()> {
        let gate = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                gate.inner.sessions.purge_expired().await;
            }
        })
    }

    async fn set_pending(
        &self,
        session_id: &str,
        pending: PendingCeremony,
    ) -> Result<(), GateError> {
        let replaced = self
            .inner
            .sessions
            .update(session_id, |state| state.pending.replace(pending))
            .await?;
        if let Some(old) = replaced {
            tracing::debug!("Discarded pending ceremony for {}", old.username());
        }
        Ok(())
    }

    async fn complete_registration(
        &self,
        username: &str,
        user_id: Uuid,
        passkey: webauthn_rs::prelude::Passkey,
    ) -> Result<(), GateError> {
        let mut user = self
            .inner
            .store
            .get(username)
            .await?
            .ok_or_else(|| GateError::UserNotFound(username.to_string()).log())?;

        // Another session may have completed a registration for the same name meanwhile.
        if user.id != user_id || user.registered {
            return Err(GateError::UserExists(username.to_string()).log());
        }

        user.credentials.push(passkey);
        user.registered = true;
        user.touch();
        self.inner.store.put(user).await?;
        Ok(())
    }

    async fn complete_authentication(
        &self,
        username: &str,
        result: &webauthn_rs::prelude::AuthenticationResult,
    ) -> Result<(), GateError> {
        let mut user = self
            .inner
            .store
            .get(username)
            .await?
            .ok_or_else(|| GateError::UserNotFound(username.to_string()).log())?;

        // Only the matching credential is touched; counters and backup state may change.
        let mut changed = false;
        for passkey in user.credentials.iter_mut() {
            if passkey.update_credential(result) == Some(true) {
                changed = true;
            }
        }

        if changed {
            user.touch();
            self.inner.store.put(user).await?;
        }
        Ok(())
    }
}

fn parse_credential<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, GateError> {
    serde_json::from_value(body).map_err(|e| GateError::InvalidResponse(e.to_string()).log())
}

//! Relying-party configuration for the webauthn_gate crate

use std::collections::BTreeMap;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::gate::GateError;

/// Route prefix under which the WebAuthn endpoints are mounted
///
/// Default: "/"
pub static WEBAUTHN_ROUTE_PREFIX: LazyLock<String> = LazyLock::new(|| {
    env::var("WEBAUTHN_ROUTE_PREFIX").unwrap_or_else(|_| "/".to_string())
});

const DEFAULT_RP_NAME: &str = "webauthn-gate";
const DEFAULT_USERNAME_FIELD: &str = "name";
const DEFAULT_CHALLENGE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Attribute holding the human readable name shown by authenticators.
pub const DISPLAY_NAME_ATTRIBUTE: &str = "displayName";

/// Paths of the four endpoints, relative to the mount point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub register: String,
    pub login: String,
    pub response: String,
    pub logout: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            register: "/register".to_string(),
            login: "/login".to_string(),
            response: "/response".to_string(),
            logout: "/logout".to_string(),
        }
    }
}

/// Configuration of a [`WebauthnGate`](crate::WebauthnGate).
#[derive(Debug, Clone)]
pub struct GateConfig {
    pub(crate) origin: Url,
    pub(crate) rp_id: String,
    pub(crate) rp_name: String,
    pub(crate) username_field: String,
    /// Request body field -> user attribute.
    pub(crate) user_fields: BTreeMap<String, String>,
    pub(crate) endpoints: Endpoints,
    pub(crate) challenge_timeout: Duration,
    pub(crate) session_ttl: Duration,
}

impl GateConfig {
    /// Create a configuration for `origin` with default settings.
    ///
    /// The RP ID defaults to the origin's host.
    pub fn new(origin: &str) -> Result<Self, GateError> {
        let origin = Url::parse(origin)
            .map_err(|e| GateError::Config(format!("Invalid origin '{origin}': {e}")))?;
        let rp_id = origin
            .host_str()
            .ok_or_else(|| GateError::Config(format!("Origin '{origin}' has no host")))?
            .to_string();

        let user_fields = [DEFAULT_USERNAME_FIELD, DISPLAY_NAME_ATTRIBUTE]
            .into_iter()
            .map(|f| (f.to_string(), f.to_string()))
            .collect();

        Ok(Self {
            origin,
            rp_id,
            rp_name: DEFAULT_RP_NAME.to_string(),
            username_field: DEFAULT_USERNAME_FIELD.to_string(),
            user_fields,
            endpoints: Endpoints::default(),
            challenge_timeout: Duration::from_secs(DEFAULT_CHALLENGE_TIMEOUT_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
        })
    }

    /// Build a configuration from environment variables.
    ///
    /// `ORIGIN` is required, everything else falls back to the defaults of [`GateConfig::new`].
    pub fn from_env() -> Result<Self, GateError> {
        let origin =
            env::var("ORIGIN").map_err(|_| GateError::Config("ORIGIN must be set".to_string()))?;
        Self::new(&origin)?.apply_env()
    }

    /// Override settings of `self` with the environment variables that are set.
    ///
    /// Unset variables keep the current values. `WEBAUTHN_USER_FIELDS` is applied before
    /// `WEBAUTHN_USERNAME_FIELD` so the username field stays mapped.
    pub fn apply_env(self) -> Result<Self, GateError> {
        let mut config = self;

        if let Ok(origin) = env::var("ORIGIN") {
            config = config.with_origin(&origin)?;
        }
        if let Ok(rp_id) = env::var("WEBAUTHN_RP_ID") {
            config = config.with_rp_id(rp_id);
        }
        if let Ok(rp_name) = env::var("WEBAUTHN_RP_NAME") {
            config = config.with_rp_name(rp_name);
        }
        if let Ok(mapping) = env::var("WEBAUTHN_USER_FIELDS") {
            config = config.with_user_fields(parse_user_fields(&mapping)?);
        }
        if let Ok(field) = env::var("WEBAUTHN_USERNAME_FIELD") {
            config = config.with_username_field(field);
        }
        if let Some(secs) = env_secs("WEBAUTHN_CHALLENGE_TIMEOUT")? {
            config = config.with_challenge_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = env_secs("WEBAUTHN_SESSION_TTL")? {
            config = config.with_session_ttl(Duration::from_secs(secs));
        }

        tracing::info!(
            origin = %config.origin,
            rp_id = %config.rp_id,
            rp_name = %config.rp_name,
            "Loaded WebAuthn configuration from environment"
        );
        Ok(config)
    }

    /// Move the configuration to another origin. The RP ID follows the new host.
    pub fn with_origin(self, origin: &str) -> Result<Self, GateError> {
        let moved = Self::new(origin)?;
        Ok(Self {
            origin: moved.origin,
            rp_id: moved.rp_id,
            ..self
        })
    }

    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = rp_id.into();
        self
    }

    pub fn with_rp_name(mut self, rp_name: impl Into<String>) -> Self {
        self.rp_name = rp_name.into();
        self
    }

    /// Set the user attribute that identifies the account.
    ///
    /// The field is added to the user field mapping if it is not already there.
    pub fn with_username_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.user_fields.values().any(|attr| attr == &field) {
            self.user_fields.insert(field.clone(), field.clone());
        }
        self.username_field = field;
        self
    }

    /// Replace the request field -> user attribute mapping.
    pub fn with_user_fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.user_fields = fields
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = timeout;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    pub fn username_field(&self) -> &str {
        &self.username_field
    }

    pub fn user_fields(&self) -> &BTreeMap<String, String> {
        &self.user_fields
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn challenge_timeout(&self) -> Duration {
        self.challenge_timeout
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Cookies carry `Secure` only when the site itself is served over TLS.
    pub(crate) fn secure_cookies(&self) -> bool {
        self.origin.scheme() == "https"
    }

    /// Map a JSON request body onto user attributes.
    ///
    /// Strings are taken as-is, numbers and booleans are stringified, anything else
    /// (including missing fields) is skipped.
    pub fn extract_user_fields(&self, body: &Value) -> BTreeMap<String, String> {
        self.user_fields
            .iter()
            .filter_map(|(field, attr)| {
                let value = match body.get(field)? {
                    Value::String(s) => s.trim().to_string(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((attr.clone(), value))
            })
            .collect()
    }

    /// Extract the username from a request body, rejecting missing or blank values.
    pub fn extract_username(&self, body: &Value) -> Result<String, GateError> {
        self.extract_user_fields(body)
            .remove(&self.username_field)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| GateError::MissingField(self.username_field.clone()).log())
    }
}

/// Parse `field:attr,field:attr`. A bare `field` maps to an attribute of the same name.
fn parse_user_fields(mapping: &str) -> Result<BTreeMap<String, String>, GateError> {
    mapping
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, ':').map(str::trim);
            match (parts.next(), parts.next()) {
                (Some(field), None) if !field.is_empty() => {
                    Ok((field.to_string(), field.to_string()))
                }
                (Some(field), Some(attr)) if !field.is_empty() && !attr.is_empty() => {
                    Ok((field.to_string(), attr.to_string()))
                }
                _ => Err(GateError::Config(format!(
                    "Invalid WEBAUTHN_USER_FIELDS entry: '{pair}'"
                ))),
            }
        })
        .collect()
}

fn env_secs(key: &str) -> Result<Option<u64>, GateError> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .map(Some)
            .map_err(|_| GateError::Config(format!("{key} must be a number of seconds, got '{v}'"))),
        Err(_) => Ok(None),
    }
}

use std::sync::LazyLock;

/// Name of the cookie carrying the session id
///
/// Default: "webauthn-session"
pub static SESSION_COOKIE_NAME: LazyLock<String> = LazyLock::new(|| {
    std::env::var("SESSION_COOKIE_NAME")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or("webauthn-session".to_string())
});

/// Number of random bytes in a session id before encoding.
pub(super) const SESSION_ID_BYTES: usize = 32;

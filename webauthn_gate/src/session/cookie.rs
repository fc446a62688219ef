use std::time::Duration;

use http::header::{COOKIE, HeaderMap};

use super::config::SESSION_COOKIE_NAME;
use super::errors::SessionError;
use crate::utils::header_set_cookie;

/// Find the session cookie among all `Cookie` headers of a request.
pub fn session_id_from_headers(headers: &HeaderMap) -> Result<Option<&str>, SessionError> {
    let cookie_name = SESSION_COOKIE_NAME.as_str();

    for cookie_header in headers.get_all(COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|e| {
            tracing::error!("Invalid cookie header: {}", e);
            SessionError::HeaderError("Invalid cookie header".to_string())
        })?;

        let found = cookie_str.split(';').map(str::trim).find_map(|s| {
            let mut parts = s.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some(k), Some(v)) if k == cookie_name && !v.is_empty() => Some(v),
                _ => None,
            }
        });
        if found.is_some() {
            return Ok(found);
        }
    }

    tracing::trace!("No session cookie '{}' found", cookie_name);
    Ok(None)
}

/// `Set-Cookie` headers handing `session_id` to the browser.
pub fn session_cookie_headers(
    session_id: &str,
    ttl: Duration,
    secure: bool,
) -> Result<HeaderMap, SessionError> {
    let mut headers = HeaderMap::new();
    let max_age = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    header_set_cookie(
        &mut headers,
        SESSION_COOKIE_NAME.as_str(),
        session_id,
        max_age,
        secure,
    )?;
    Ok(headers)
}

/// `Set-Cookie` headers that make the browser drop the session cookie.
pub fn clear_session_cookie_headers(secure: bool) -> Result<HeaderMap, SessionError> {
    let mut headers = HeaderMap::new();
    header_set_cookie(
        &mut headers,
        SESSION_COOKIE_NAME.as_str(),
        "value",
        -86400,
        secure,
    )?;
    Ok(headers)
}

// ============================================================================
// Session cookie directives
// ============================================================================
//
// The session token travels in one cookie:
//   session_token=<token>; Path=/; Expires=<RFC 1123>; HttpOnly; SameSite=None
//
// SameSite=None lets the browser send it on cross-origin XHR from the
// allow-listed frontends; `Secure` is appended when configured.
//
// ============================================================================

use axum::http::{header, HeaderMap};
use chrono::{DateTime, Utc};

/// Expires value of the clearing directive
const EPOCH_EXPIRES: &str = "Thu, 01 Jan 1970 00:00:00 GMT";

/// RFC 1123 date as browsers expect in `Expires`
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Set-Cookie directive carrying a freshly issued token
pub fn session_cookie(name: &str, token: &str, expires_at: DateTime<Utc>, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Expires={}; HttpOnly; SameSite=None",
        name,
        token,
        http_date(expires_at)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Set-Cookie directive that makes the client drop the session cookie
pub fn clearing_cookie(name: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{}=; Path=/; Expires={}; Max-Age=0; HttpOnly; SameSite=None",
        name, EPOCH_EXPIRES
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Value of the named cookie across all `Cookie` headers of a request.
///
/// Empty values count as absent.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
        .find(|value| !value.is_empty())
}

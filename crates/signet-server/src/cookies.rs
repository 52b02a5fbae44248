// crates/signet-server/src/cookies.rs
// ============================================================================
// Module: Session Cookie Plumbing
// Description: Cookie header parsing and Set-Cookie emission.
// Purpose: Bind browser sessions to the sealed session cookie.
// Dependencies: axum, signet-core
// ============================================================================

//! ## Overview
//! The session cookie carries the sealed `{sid, tid, v, iat}` payload. The
//! reader tolerates absent or undecryptable cookies (both mean "no
//! session"), while the writer emits the full flag set: HttpOnly, Secure,
//! SameSite=Lax, Path=/, Max-Age, and an optional Domain. The middleware
//! re-emits the cookie whenever the sliding window refreshed the session.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::header::COOKIE;
use axum::http::header::SET_COOKIE;
use signet_core::CookieCodec;
use signet_core::CookiePayload;

// ============================================================================
// SECTION: Reading
// ============================================================================

/// Returns the raw value of the named cookie, when present.
#[must_use]
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then_some(value)
        })
        .next()
}

/// Opens the session cookie, treating any failure as "no session".
#[must_use]
pub fn read_session_cookie(
    codec: &CookieCodec,
    headers: &HeaderMap,
    name: &str,
) -> Option<CookiePayload> {
    let raw = cookie_value(headers, name)?;
    codec.open(raw).ok()
}

// ============================================================================
// SECTION: Writing
// ============================================================================

/// Cookie attributes applied to every emitted session cookie.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    /// Cookie name.
    pub name: String,
    /// Max-Age in seconds.
    pub max_age_secs: u64,
    /// Optional Domain attribute.
    pub domain: Option<String>,
    /// Whether the Secure flag is emitted.
    pub secure: bool,
}

/// Renders the Set-Cookie header value for a sealed payload.
#[must_use]
pub fn render_set_cookie(settings: &CookieSettings, sealed: &str) -> String {
    let mut cookie = format!(
        "{}={sealed}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        settings.name, settings.max_age_secs
    );
    if settings.secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &settings.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// Renders an expired Set-Cookie header value that clears the cookie.
#[must_use]
pub fn render_clear_cookie(settings: &CookieSettings) -> String {
    let mut cookie = format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", settings.name);
    if settings.secure {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &settings.domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// Appends a Set-Cookie header to a response header map.
pub fn append_set_cookie(headers: &mut HeaderMap, rendered: &str) {
    if let Ok(value) = HeaderValue::from_str(rendered) {
        headers.append(SET_COOKIE, value);
    }
}

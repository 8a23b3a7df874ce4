//! Session and grant cookies
//!
//! Two HTTP-only, Secure, SameSite=Lax cookies bind the browser to engine
//! state: `session` carries the session id across authorizations, `grant`
//! pins the in-progress grant between interaction round-trips. Both are
//! set by the authorize endpoint; `grant` is cleared on every terminal
//! authorize response and `session` on logout completion.

use chrono::{DateTime, Utc};

use oxidc_core::http::SetCookie;
use oxidc_core::{Expires, Grant, Session};

/// Cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";
/// Cookie carrying the current grant id.
pub const GRANT_COOKIE: &str = "grant";

/// `Set-Cookie` for a session, expiring with the session itself.
#[must_use]
pub fn session_cookie(session: &Session, now: DateTime<Utc>) -> SetCookie {
    SetCookie::new(
        SESSION_COOKIE,
        session.id.clone(),
        Some(session.remaining_seconds(now) as i64),
    )
}

/// `Set-Cookie` for an in-progress grant.
#[must_use]
pub fn grant_cookie(grant: &Grant, now: DateTime<Utc>) -> SetCookie {
    SetCookie::new(
        GRANT_COOKIE,
        grant.id.clone(),
        Some(grant.remaining_seconds(now) as i64),
    )
}

/// Directive clearing the grant cookie.
#[must_use]
pub fn clear_grant_cookie() -> SetCookie {
    SetCookie::expired(GRANT_COOKIE)
}

/// Directive clearing the session cookie.
#[must_use]
pub fn clear_session_cookie() -> SetCookie {
    SetCookie::expired(SESSION_COOKIE)
}

//! Escalation cookies
//!
//! One HTTP-only cookie per token purpose. `Secure` is set when the request
//! reached us over TLS, directly or through a proxy that says so.

use crate::crypto::Purpose;
use axum::http::HeaderMap;
use axum::http::header::COOKIE;

pub const PENDING_COOKIE: &str = "cv_pending";
pub const SELECTION_COOKIE: &str = "cv_selection";
pub const PRE_AUTH_COOKIE: &str = "cv_preauth";
pub const SESSION_COOKIE: &str = "cv_session";
pub const BALLOT_COOKIE: &str = "cv_ballot";

pub fn cookie_name(purpose: Purpose) -> &'static str {
    match purpose {
        Purpose::PendingCredential => PENDING_COOKIE,
        Purpose::SelectionVerified => SELECTION_COOKIE,
        Purpose::VoterPreAuth => PRE_AUTH_COOKIE,
        Purpose::FullSession => SESSION_COOKIE,
        Purpose::BallotCast => BALLOT_COOKIE,
    }
}

/// `Set-Cookie` value carrying `token` for `max_age_seconds`
pub fn set_cookie(purpose: Purpose, token: &str, max_age_seconds: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        cookie_name(purpose),
        token,
        max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that removes the cookie of `purpose`
pub fn clear_cookie(purpose: Purpose, secure: bool) -> String {
    let mut cookie = format!(
        "{}=; Path=/; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; SameSite=Strict",
        cookie_name(purpose)
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Clearing values for every escalation cookie
pub fn clear_all(secure: bool) -> Vec<String> {
    Purpose::ALL
        .iter()
        .map(|purpose| clear_cookie(*purpose, secure))
        .collect()
}

/// Value of cookie `name` from the request's `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Whether the request arrived over TLS
///
/// `scheme` is the scheme of the request URI, present for absolute-form targets.
pub fn request_is_secure(headers: &HeaderMap, scheme: Option<&str>) -> bool {
    if scheme.is_some_and(|scheme| scheme.eq_ignore_ascii_case("https")) {
        return true;
    }

    headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

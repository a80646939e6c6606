//! Anonymous browser sessions, carried in a `session` cookie.

use rand::distributions::Alphanumeric;
use rand::Rng;

pub const COOKIE_NAME: &str = "session";
pub const SESSION_ID_LEN: usize = 16;
/// One year.
pub const COOKIE_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// Fresh random session id (alphanumeric).
pub fn new_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

/// Value of the `session` cookie in a `Cookie` request header, if any.
/// An empty value counts as no session.
pub fn from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == COOKIE_NAME)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value issuing `id`.
pub fn set_cookie_value(id: &str) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
        COOKIE_NAME, id, COOKIE_MAX_AGE_SECS
    )
}

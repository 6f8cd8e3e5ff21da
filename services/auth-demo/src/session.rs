//! Signed session cookie
//!
//! The cookie value is the username. Its signature key is derived from the
//! session secret, so a cookie that was not issued by this server (or was
//! issued under a different secret) reads as "no session".

use axum_extra::extract::SignedCookieJar;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use common::Secret;
use sha2::{Digest, Sha512};

pub const SESSION_COOKIE: &str = "auth_demo_session";

/// Stretch the configured secret to the 64-byte key the cookie jar needs.
pub fn cookie_key(secret: &Secret<String>) -> Key {
    let digest = Sha512::digest(secret.expose().as_bytes());
    Key::from(digest.as_slice())
}

/// Username carried by a validly signed session cookie.
pub fn current_user(jar: &SignedCookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|u| !u.is_empty())
}

pub fn session_cookie(username: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, username.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, "")).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_secret_same_key() {
        let a = cookie_key(&Secret::new("0123456789abcdef".to_string()));
        let b = cookie_key(&Secret::new("0123456789abcdef".to_string()));
        let c = cookie_key(&Secret::new("fedcba9876543210".to_string()));
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }

    #[test]
    fn signed_cookie_round_trips_and_forgery_is_ignored() {
        let key = cookie_key(&Secret::new("0123456789abcdef".to_string()));
        let jar = SignedCookieJar::new(key.clone()).add(session_cookie("testuser"));
        assert_eq!(current_user(&jar).as_deref(), Some("testuser"));

        let signed = jar.get(SESSION_COOKIE).unwrap();
        assert_eq!(signed.value(), "testuser");

        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            format!("{SESSION_COOKIE}=testuser").parse().unwrap(),
        );
        let forged = SignedCookieJar::from_headers(&headers, key);
        assert_eq!(current_user(&forged), None);
    }

    #[test]
    fn session_cookie_attributes() {
        let cookie = session_cookie("alice");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}

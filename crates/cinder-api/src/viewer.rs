use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{Extensions, HeaderMap};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use cinder_engine::viewers;

pub const VIEWER_COOKIE: &str = "cinder_viewer";

/// Resolve the viewer identity for this request, minting one if the
/// cookie is missing or malformed. The returned jar carries the cookie
/// back to the client.
pub fn identify(jar: CookieJar, headers: &HeaderMap, extensions: &Extensions) -> (CookieJar, String) {
    let existing = jar.get(VIEWER_COOKIE).map(|c| c.value().to_string());
    let identity = viewers::identify(existing.as_deref(), &source_address(headers, extensions));

    if existing.as_deref() == Some(identity.as_str()) {
        return (jar, identity);
    }

    let mut cookie = Cookie::new(VIEWER_COOKIE, identity.clone());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.make_permanent();
    (jar.add(cookie), identity)
}

fn source_address(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    forwarded
        .or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn existing_cookie_is_reused() {
        let jar = CookieJar::new().add(Cookie::new(VIEWER_COOKIE, "abc123"));
        let (jar, id) = identify(jar, &HeaderMap::new(), &Extensions::new());
        assert_eq!(id, "abc123");
        assert_eq!(jar.get(VIEWER_COOKIE).unwrap().value(), "abc123");
    }

    #[test]
    fn fresh_identity_is_set_as_cookie() {
        let (jar, id) = identify(CookieJar::new(), &HeaderMap::new(), &Extensions::new());
        assert_eq!(jar.get(VIEWER_COOKIE).unwrap().value(), id);
    }

    #[test]
    fn forwarded_address_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(source_address(&headers, &Extensions::new()), "203.0.113.9");
        assert_eq!(source_address(&HeaderMap::new(), &Extensions::new()), "unknown");
    }
}

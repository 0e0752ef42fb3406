use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};

use courier_types::models::PublicUser;

use crate::auth::{AppState, to_public_user};
use crate::error::{ApiError, blocking};

/// The authenticated identity, inserted as a request extension by
/// `require_auth`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

/// Resolves the session token (Authorization header or `token` cookie) to a
/// user. A valid token whose user no longer exists is treated as invalid,
/// never as an anonymous identity.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())
        .or_else(|| cookie_token(req.headers()))
        .ok_or_else(|| ApiError::Unauthenticated("Missing authentication token".into()))?;

    let user_id = state.tokens.verify(&token)?;

    let db = state.clone();
    let uid = user_id.to_string();
    let row = blocking(move || db.db.get_user_by_id(&uid))
        .await?
        .ok_or_else(|| ApiError::Unauthenticated("User no longer exists".into()))?;

    req.extensions_mut().insert(AuthUser(to_public_user(row)?));
    Ok(next.run(req).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("token="))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(name, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_token_requires_the_scheme() {
        let h = headers(header::AUTHORIZATION, "Bearer abc.def.ghi");
        assert_eq!(bearer_token(&h).as_deref(), Some("abc.def.ghi"));

        let h = headers(header::AUTHORIZATION, "abc.def.ghi");
        assert!(bearer_token(&h).is_none());
    }

    #[test]
    fn cookie_token_is_found_among_other_cookies() {
        let h = headers(header::COOKIE, "theme=dark; token=abc.def.ghi; lang=en");
        assert_eq!(cookie_token(&h).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn cleared_cookie_is_no_token() {
        let h = headers(header::COOKIE, "token=");
        assert!(cookie_token(&h).is_none());
    }
}

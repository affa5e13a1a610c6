//! JWT verification, grounded on `internal/auth/jwt.go`'s `JWT.ParseToken`
//! and `middleware/auth.go`'s `GetUserInfo`. Accepts either a standard
//! `Authorization: Bearer <token>` header or the original's bare `token`
//! header (itself optionally prefixed with a scheme split on the first
//! space) — resolving spec.md's Open Question in favor of supporting both.

use axum::http::HeaderMap;
use gateway_core::CallerIdentity;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
struct CustomClaims {
    id: String,
    email: String,
    name: String,
    role: String,
}

impl From<CustomClaims> for CallerIdentity {
    fn from(claims: CustomClaims) -> Self {
        CallerIdentity {
            id: claims.id,
            email: claims.email,
            name: claims.name,
            role: claims.role,
        }
    }
}

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        let raw = value.to_str().ok()?;
        return Some(raw.strip_prefix("Bearer ").unwrap_or(raw));
    }
    let raw = headers.get("token")?.to_str().ok()?;
    match raw.split_once(' ') {
        Some((_, token)) => Some(token),
        None => Some(raw),
    }
}

/// Returns `None` when no credential is present at all; a malformed or
/// expired token is also treated as "no identity" rather than a hard
/// error — the caller decides whether the method actually requires one.
pub fn authenticate(headers: &HeaderMap, sign_key: &str) -> Option<CallerIdentity> {
    let token = extract_token(headers)?;
    let data = decode::<CustomClaims>(
        token,
        &DecodingKey::from_secret(sign_key.as_bytes()),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .ok()?;
    Some(data.claims.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(sign_key: &str) -> String {
        let claims = CustomClaims {
            id: "1".to_string(),
            email: "a@example.com".to_string(),
            name: "Ada".to_string(),
            role: "admin".to_string(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(sign_key.as_bytes())).unwrap()
    }

    #[test]
    fn authorization_bearer_header_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", token("secret")).parse().unwrap(),
        );
        let identity = authenticate(&headers, "secret").unwrap();
        assert_eq!(identity.role, "admin");
    }

    #[test]
    fn bare_token_header_with_scheme_prefix_is_accepted() {
        let mut headers = HeaderMap::new();
        headers.insert("token", format!("Bearer {}", token("secret")).parse().unwrap());
        assert!(authenticate(&headers, "secret").is_some());
    }

    #[test]
    fn missing_header_yields_no_identity() {
        let headers = HeaderMap::new();
        assert!(authenticate(&headers, "secret").is_none());
    }

    #[test]
    fn wrong_signing_key_yields_no_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {}", token("secret")).parse().unwrap(),
        );
        assert!(authenticate(&headers, "wrong").is_none());
    }
}

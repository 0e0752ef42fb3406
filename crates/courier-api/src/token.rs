use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use courier_types::api::Claims;

use crate::error::ApiError;

/// Issues and verifies stateless session tokens. Secret and lifetime are
/// injected at construction; nothing is stored server-side and there is no
/// revocation list.
#[derive(Clone)]
pub struct TokenService {
    secret: String,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(secret: impl Into<String>, lifetime_hours: i64) -> Self {
        Self {
            secret: secret.into(),
            lifetime: Duration::hours(lifetime_hours),
        }
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        let claims = Claims {
            sub: user_id,
            exp: (Utc::now() + self.lifetime).timestamp() as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    /// All-or-nothing: a bad signature, a malformed token, and an expired
    /// token all fail identically.
    pub fn verify(&self, token: &str) -> Result<Uuid, ApiError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|_| ApiError::Unauthenticated("Invalid or expired token".into()))?;
        Ok(data.claims.sub)
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime.num_seconds()
    }
}

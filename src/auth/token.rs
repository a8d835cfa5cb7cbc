//! Signed claims (HS256 JWT). Expiry is `created + ttl`, both in milliseconds.

use crate::error::AppError;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    /// Issued-at, epoch milliseconds.
    pub created: i64,
    /// Milliseconds.
    pub ttl: i64,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Claims {
    pub fn new(user_id: impl Into<String>, ttl: i64, roles: Vec<String>) -> Self {
        Claims {
            user_id: user_id.into(),
            created: chrono::Utc::now().timestamp_millis(),
            ttl,
            roles,
        }
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.created.saturating_add(self.ttl)
    }
}

pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &Claims) -> Result<String, AppError>;
    fn verify(&self, token: &str) -> Result<Claims, AppError>;
}

pub struct JwtSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtSigner {
    pub fn new(secret: &str) -> Self {
        JwtSigner {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, claims: &Claims) -> Result<String, AppError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        let claims = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))?
            .claims;
        if claims.is_expired(chrono::Utc::now().timestamp_millis()) {
            return Err(AppError::Unauthorized("token expired".into()));
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let signer = JwtSigner::new("secret");
        let claims = Claims::new("abc", 60_000, vec!["USER".into()]);
        let token = signer.sign(&claims).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), claims);
        assert!(JwtSigner::new("other").verify(&token).is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let signer = JwtSigner::new("secret");
        let mut claims = Claims::new("abc", 1_000, vec![]);
        claims.created -= 5_000;
        let token = signer.sign(&claims).unwrap();
        assert!(matches!(signer.verify(&token), Err(AppError::Unauthorized(_))));
    }
}

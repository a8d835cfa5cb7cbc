//! Extract the principal from `Authorization: Bearer <token>`.

use crate::auth::BearerToken;
use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// Principal for the request. Anonymous when no token is sent; an invalid or expired
/// token is rejected.
#[derive(Clone, Debug)]
pub struct Bearer(pub BearerToken);

#[async_trait]
impl FromRequestParts<AppState> for Bearer {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim())
            .and_then(|s| s.strip_prefix("Bearer ").or_else(|| s.strip_prefix("bearer ")))
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let Some(token) = token else {
            return Ok(Bearer(BearerToken::anonymous()));
        };
        let claims = state.runtime.signer.verify(token)?;
        Ok(Bearer(BearerToken::from_claims(&claims)))
    }
}

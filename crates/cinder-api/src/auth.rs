use axum::http::{HeaderMap, header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use cinder_types::api::Claims;

use crate::ApiError;

/// Owning principal from an optional `Authorization: Bearer` token.
///
/// Anonymous requests are fine; a token that is present but invalid is not.
pub fn optional_principal(headers: &HeaderMap, jwt_secret: &str) -> Result<Option<Uuid>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let token = value
        .to_str()
        .ok()
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    Ok(Some(token_data.claims.sub))
}

/// Like [`optional_principal`] but for owner-only routes.
pub fn require_principal(headers: &HeaderMap, jwt_secret: &str) -> Result<Uuid, ApiError> {
    optional_principal(headers, jwt_secret)?.ok_or(ApiError::Unauthorized)
}

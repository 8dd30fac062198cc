use std::sync::Arc;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;
use crate::AppState;

/// Extractor guarding the operator API with the static `ADMIN_API_TOKEN`.
///
/// Without a configured token the operator API is closed (403).
pub struct AdminAuth;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_TAG_KEY: &[u8] = b"booking-notifications/admin-token";

/// Compare tokens in constant time: both sides become fixed-length HMAC tags
/// and `verify_slice` checks them without early exit.
fn token_matches(presented: &str, expected: &str) -> bool {
    let tag = |token: &str| {
        HmacSha256::new_from_slice(TOKEN_TAG_KEY).map(|mut mac| {
            mac.update(token.as_bytes());
            mac
        })
    };

    match (tag(presented), tag(expected)) {
        (Ok(presented), Ok(expected)) => presented
            .verify_slice(&expected.finalize().into_bytes())
            .is_ok(),
        _ => false,
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.admin.api_token.as_deref().ok_or_else(|| {
            tracing::debug!("Operator API called but ADMIN_API_TOKEN is not configured");
            AppError::Forbidden
        })?;

        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::debug!("Missing or invalid Authorization header");
                AppError::Unauthorized
            })?;

        if auth_header.len() < 7 || !auth_header[..7].eq_ignore_ascii_case("bearer ") {
            tracing::debug!("Authorization header doesn't start with 'Bearer '");
            return Err(AppError::Unauthorized);
        }

        let token = auth_header[7..].trim();
        if token.is_empty() || !token_matches(token, expected) {
            tracing::debug!("Invalid operator token");
            return Err(AppError::Unauthorized);
        }

        Ok(AdminAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison() {
        assert!(token_matches("s3cret", "s3cret"));
        assert!(!token_matches("s3cret", "s3cre"));
        assert!(!token_matches("s3creT", "s3cret"));
        assert!(!token_matches("", "s3cret"));
    }
}

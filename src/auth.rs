use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::state::SharedState;

/// Proof that the request carried the operator bearer token.
#[derive(Debug, Clone, Copy)]
pub struct AdminAuth;

impl FromRequestParts<SharedState> for AdminAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .ok_or_else(|| AppError::Unauthorized("Missing authentication token".to_string()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

        let token = auth_str
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Unauthorized("Expected a Bearer token".to_string()))?;

        let expected = state.config.admin_token.as_bytes();
        if bool::from(token.as_bytes().ct_eq(expected)) {
            Ok(AdminAuth)
        } else {
            Err(AppError::Unauthorized("Invalid token".to_string()))
        }
    }
}

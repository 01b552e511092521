use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use gamekeeper_core::Caller;
use gamekeeper_types::api::Claims;
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;

/// Validates the bearer token and stores its `Claims` in the request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(AppError::TokenMissing)?;

    let token_data = decode::<Claims>(
        bearer.0.token(),
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        AppError::TokenInvalid
    })?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

pub(crate) fn caller(claims: &Claims) -> Caller {
    Caller::new(claims.sub)
}

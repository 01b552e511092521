use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{Duration, Utc};
use gamekeeper_types::api::{
    Claims, LoginRequest, LoginResponse, OnboardRequest, RegisterRequest, RegisterResponse,
    UserEnvelope,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use crate::blocking;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::caller;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let svc = state.clone();
    let email = req.email.trim().to_string();
    let user_id = blocking(move || svc.users.register(&req.email, &req.password)).await?;

    let token = create_token(&state.jwt_secret, user_id, &email, state.token_ttl)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let svc = state.clone();
    let user = blocking(move || svc.users.login(&req.email, &req.password)).await?;

    let token = create_token(&state.jwt_secret, user.user_id, &user.email, state.token_ttl)?;

    Ok(Json(LoginResponse {
        user_id: user.user_id,
        username: user.username,
        has_completed_onboarding: user.has_completed_onboarding,
        token,
    }))
}

pub async fn onboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<OnboardRequest>,
) -> Result<Json<UserEnvelope>, AppError> {
    let who = caller(&claims);
    let user = blocking(move || state.users.onboard(who, &req.username)).await?;

    Ok(Json(UserEnvelope {
        message: Some("Onboarding completed successfully".into()),
        user,
    }))
}

pub fn create_token(
    secret: &str,
    user_id: Uuid,
    email: &str,
    ttl: Duration,
) -> Result<String, AppError> {
    let expires_at = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal("token expiry out of range".into()))?;
    let exp = usize::try_from(expires_at.timestamp())
        .map_err(|e| AppError::Internal(format!("token expiry out of range: {e}")))?;
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token encoding failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn tokens_round_trip_with_the_same_secret() {
        let id = Uuid::new_v4();
        let token = create_token("s3cret", id, "a@example.com", Duration::days(1)).unwrap();

        let data = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"s3cret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(data.claims.sub, id);
        assert_eq!(data.claims.email, "a@example.com");

        assert!(
            decode::<Claims>(
                &token,
                &DecodingKey::from_secret(b"other"),
                &Validation::default(),
            )
            .is_err()
        );
    }

    #[test]
    fn oversized_ttl_is_an_error_not_a_panic() {
        let err = create_token("s3cret", Uuid::new_v4(), "a@example.com", Duration::MAX)
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }
}

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use gamekeeper_types::api::{
    Claims, ConfirmAction, ConfirmScoreRequest, CreateSessionRequest, MessageResponse,
    ResultEnvelope, SessionAction, SessionEnvelope, SubmitScoreRequest, UpdateSessionRequest,
};
use gamekeeper_types::score::ScoreSheet;

use crate::blocking;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::caller;
use crate::state::AppState;

pub async fn create_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let who = caller(&claims);
    let session = blocking(move || state.sessions.create(who, req.game_id)).await?;

    Ok((
        StatusCode::CREATED,
        Json(SessionEnvelope {
            message: Some("Session created successfully".into()),
            session,
        }),
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<SessionEnvelope>, AppError> {
    let who = caller(&claims);
    let session = blocking(move || state.sessions.get(who, &id)).await?;

    Ok(Json(SessionEnvelope {
        message: None,
        session,
    }))
}

pub async fn join_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<SessionEnvelope>, AppError> {
    let who = caller(&claims);
    let joined = blocking(move || state.sessions.join(who, &id)).await?;

    let message = if joined.newly_joined {
        "Successfully joined session"
    } else {
        "Already a participant in this session"
    };
    Ok(Json(SessionEnvelope {
        message: Some(message.into()),
        session: joined.session,
    }))
}

pub async fn update_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateSessionRequest>,
) -> Result<Json<SessionEnvelope>, AppError> {
    let who = caller(&claims);
    let (session, message) = match req.action {
        SessionAction::End => {
            let session = blocking(move || state.sessions.end(who, &id)).await?;
            (session, "Session ended successfully")
        }
    };

    Ok(Json(SessionEnvelope {
        message: Some(message.into()),
        session,
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let who = caller(&claims);
    blocking(move || state.sessions.delete(who, &id)).await?;

    Ok(Json(MessageResponse {
        message: "Session deleted successfully".into(),
    }))
}

pub async fn submit_score(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<SubmitScoreRequest>,
) -> Result<impl IntoResponse, AppError> {
    let sheet = parse_score(req.score_data)?;
    let who = caller(&claims);
    let result = blocking(move || state.sessions.submit_score(who, &id, &sheet)).await?;

    Ok((
        StatusCode::CREATED,
        Json(ResultEnvelope {
            message: "Score submitted successfully".into(),
            result,
        }),
    ))
}

pub async fn confirm_score(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    AppJson(req): AppJson<ConfirmScoreRequest>,
) -> Result<Json<ResultEnvelope>, AppError> {
    let who = caller(&claims);
    let action = req.action;
    let result = blocking(move || state.sessions.confirm_score(who, &id, action)).await?;

    let verb = match action {
        ConfirmAction::Approve => "approved",
        ConfirmAction::Reject => "rejected",
    };
    Ok(Json(ResultEnvelope {
        message: format!("Score {verb} successfully"),
        result,
    }))
}

fn parse_score(raw: Option<serde_json::Value>) -> Result<ScoreSheet, AppError> {
    let value = raw.ok_or_else(|| AppError::Validation("Score data is required".into()))?;
    if !value.is_object() {
        return Err(AppError::Validation(
            "Score data must be a JSON object".into(),
        ));
    }
    ScoreSheet::from_value(value).map_err(|e| AppError::Validation(format!("Invalid score data: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gamekeeper_types::score::Outcome;
    use serde_json::json;

    #[test]
    fn score_payload_must_be_an_object() {
        assert!(matches!(parse_score(None), Err(AppError::Validation(_))));
        assert!(matches!(
            parse_score(Some(json!(["a", "b"]))),
            Err(AppError::Validation(_))
        ));

        let sheet = parse_score(Some(json!({ "winner": "DRAW" }))).unwrap();
        assert_eq!(sheet.winner(), Some(Outcome::Draw));

        let loose = parse_score(Some(json!({ "scores": { "a": "lots" } }))).unwrap();
        assert!(loose.scores().is_empty());
        assert_eq!(loose.get("scores"), Some(&json!({ "a": "lots" })));
    }
}

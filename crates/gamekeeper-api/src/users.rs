use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use gamekeeper_types::api::{
    Claims, DeleteAccountRequest, GamesResponse, HistoryResponse, MessageResponse,
    UpdateSettingsRequest, UserEnvelope,
};
use gamekeeper_types::models::Profile;

use crate::blocking;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::caller;
use crate::state::AppState;

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserEnvelope>, AppError> {
    let who = caller(&claims);
    let user = blocking(move || state.users.settings(who)).await?;
    Ok(Json(UserEnvelope { message: None, user }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<UpdateSettingsRequest>,
) -> Result<Json<UserEnvelope>, AppError> {
    let who = caller(&claims);
    let user = blocking(move || state.users.set_private(who, req.is_private)).await?;
    Ok(Json(UserEnvelope {
        message: Some("Settings updated successfully".into()),
        user,
    }))
}

pub async fn delete_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<DeleteAccountRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let who = caller(&claims);
    blocking(move || state.users.delete_account(who, req.password.as_deref())).await?;
    Ok(Json(MessageResponse {
        message: "Account deleted successfully".into(),
    }))
}

/// Serves the caller's data as a downloadable JSON file.
pub async fn export_data(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let who = caller(&claims);
    let export = blocking(move || state.users.export(who)).await?;

    let disposition = format!(
        "attachment; filename=\"gamekeeper-export-{}.json\"",
        export.exported_at.format("%Y-%m-%d")
    );
    Ok(([(header::CONTENT_DISPOSITION, disposition)], Json(export)))
}

pub async fn history(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<HistoryResponse>, AppError> {
    let who = caller(&claims);
    let sessions = blocking(move || state.sessions.history(who)).await?;
    Ok(Json(HistoryResponse {
        total_count: sessions.len(),
        sessions,
    }))
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(username): Path<String>,
) -> Result<Json<Profile>, AppError> {
    let who = caller(&claims);
    let profile = blocking(move || state.users.profile(who, &username)).await?;
    Ok(Json(profile))
}

pub async fn list_games(State(state): State<AppState>) -> Result<Json<GamesResponse>, AppError> {
    let games = blocking(move || state.users.list_games()).await?;
    Ok(Json(GamesResponse { games }))
}

//! Row → API model conversions shared by the services.

use anyhow::{Context, anyhow};
use gamekeeper_db::models::{
    FriendRequestRow, GameRow, ParticipantRow, ResultRow, SessionRow, UserRow,
};
use gamekeeper_types::models::{
    FriendRequestStatus, Game, ParticipantView, PublicUser, ResultStatus, ResultView, UserSettings,
    UserSummary,
};
use gamekeeper_types::score::ScoreSheet;
use uuid::Uuid;

use crate::elapsed::{ResultFacts, SessionFacts};
use crate::error::ServiceResult;

pub(crate) fn parse_id(raw: &str) -> ServiceResult<Uuid> {
    Uuid::parse_str(raw)
        .with_context(|| format!("stored id is not a uuid: {raw}"))
        .map_err(Into::into)
}

pub(crate) fn game(row: &GameRow) -> ServiceResult<Game> {
    Ok(Game {
        id: parse_id(&row.id)?,
        name: row.name.clone(),
        is_active: row.is_active,
    })
}

pub(crate) fn summary(id: &str, username: Option<&str>, email: &str) -> ServiceResult<UserSummary> {
    Ok(UserSummary {
        id: parse_id(id)?,
        username: username.map(str::to_owned),
        email: email.to_owned(),
    })
}

pub(crate) fn user_summary(user: &UserRow) -> ServiceResult<UserSummary> {
    summary(&user.id, user.username.as_deref(), &user.email)
}

pub(crate) fn creator(session: &SessionRow) -> ServiceResult<UserSummary> {
    summary(
        &session.creator_id,
        session.creator_username.as_deref(),
        &session.creator_email,
    )
}

pub(crate) fn public_user(user: &UserRow) -> ServiceResult<PublicUser> {
    Ok(PublicUser {
        id: parse_id(&user.id)?,
        username: user.username.clone(),
        email: user.email.clone(),
        is_private: user.is_private,
        created_at: user.created_at,
    })
}

pub(crate) fn settings(user: &UserRow) -> ServiceResult<UserSettings> {
    Ok(UserSettings {
        id: parse_id(&user.id)?,
        email: user.email.clone(),
        username: user.username.clone(),
        is_private: user.is_private,
        has_completed_onboarding: user.has_completed_onboarding,
        created_at: user.created_at,
        updated_at: user.updated_at,
    })
}

pub(crate) fn participant(row: &ParticipantRow) -> ServiceResult<ParticipantView> {
    Ok(ParticipantView {
        user_id: parse_id(&row.user_id)?,
        joined_at: row.joined_at,
        user: summary(&row.user_id, row.username.as_deref(), &row.email)?,
    })
}

pub(crate) fn result_status(row: &ResultRow) -> ServiceResult<ResultStatus> {
    row.status
        .parse()
        .map_err(|e| anyhow!("result {}: {e}", row.id).into())
}

pub(crate) fn request_status(row: &FriendRequestRow) -> ServiceResult<FriendRequestStatus> {
    row.status
        .parse()
        .map_err(|e| anyhow!("friend request {}: {e}", row.id).into())
}

pub(crate) fn score_sheet(row: &ResultRow) -> ServiceResult<ScoreSheet> {
    serde_json::from_str(&row.score_data)
        .with_context(|| format!("result {} has unreadable score data", row.id))
        .map_err(Into::into)
}

pub(crate) fn result(row: &ResultRow) -> ServiceResult<ResultView> {
    Ok(ResultView {
        id: parse_id(&row.id)?,
        status: result_status(row)?,
        score_data: score_sheet(row)?,
        entered_by_id: parse_id(&row.entered_by_id)?,
        approved_by_id: row.approved_by_id.as_deref().map(parse_id).transpose()?,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

pub(crate) fn session_facts(session: &SessionRow) -> SessionFacts {
    SessionFacts {
        created_at: session.created_at,
        is_active: session.is_active,
        voided: session.voided_at.is_some(),
    }
}

pub(crate) fn result_facts(row: &ResultRow) -> ServiceResult<ResultFacts> {
    Ok(ResultFacts {
        status: result_status(row)?,
        created_at: row.created_at,
    })
}

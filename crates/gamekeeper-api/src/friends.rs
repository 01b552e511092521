use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use gamekeeper_types::api::{
    Claims, FriendRequestEnvelope, FriendRequestsResponse, FriendsResponse, RespondAction,
    RespondFriendRequest, SearchQuery, SearchResponse, SendFriendRequest,
};

use crate::blocking;
use crate::error::AppError;
use crate::extract::{AppJson, AppQuery};
use crate::middleware::caller;
use crate::state::AppState;

pub async fn send_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<SendFriendRequest>,
) -> Result<impl IntoResponse, AppError> {
    let who = caller(&claims);
    let friend_request = blocking(move || state.friends.send_request(who, req.to_user_id)).await?;

    Ok((
        StatusCode::CREATED,
        Json(FriendRequestEnvelope {
            message: "Friend request sent successfully".into(),
            friend_request,
        }),
    ))
}

pub async fn respond(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppJson(req): AppJson<RespondFriendRequest>,
) -> Result<Json<FriendRequestEnvelope>, AppError> {
    let who = caller(&claims);
    let action = req.action;
    let friend_request =
        blocking(move || state.friends.respond(who, req.request_id, action)).await?;

    let verb = match action {
        RespondAction::Accept => "accepted",
        RespondAction::Reject => "rejected",
    };
    Ok(Json(FriendRequestEnvelope {
        message: format!("Friend request {verb}"),
        friend_request,
    }))
}

pub async fn list_friends(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FriendsResponse>, AppError> {
    let who = caller(&claims);
    let friends = blocking(move || state.friends.list_friends(who)).await?;

    Ok(Json(FriendsResponse {
        total_count: friends.len(),
        friends,
    }))
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<FriendRequestsResponse>, AppError> {
    let who = caller(&claims);
    let lists = blocking(move || state.friends.list_requests(who)).await?;

    Ok(Json(FriendRequestsResponse {
        received: lists.received,
        sent: lists.sent,
    }))
}

pub async fn search_users(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    AppQuery(query): AppQuery<SearchQuery>,
) -> Result<Json<SearchResponse>, AppError> {
    let who = caller(&claims);
    let q = query.q.unwrap_or_default();
    let users = blocking(move || state.friends.search(who, &q, query.limit)).await?;

    Ok(Json(SearchResponse {
        total_count: users.len(),
        users,
    }))
}

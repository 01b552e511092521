use axum::{
    Json, Router, middleware,
    routing::{delete, get, post},
};
use serde_json::{Value, json};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, friends, sessions, users};

/// The full HTTP surface: public auth and catalogue routes, everything else
/// behind the bearer-token middleware.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/games", get(users::list_games))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/onboard", post(auth::onboard))
        // Sessions
        .route("/sessions", post(sessions::create_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session)
                .patch(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/sessions/{id}/join", post(sessions::join_session))
        .route("/sessions/{id}/submit-score", post(sessions::submit_score))
        .route("/sessions/{id}/confirm-score", post(sessions::confirm_score))
        // Friends
        .route("/friends/request", post(friends::send_request))
        .route("/friends/respond", post(friends::respond))
        .route("/friends/list", get(friends::list_friends))
        .route("/friends/requests", get(friends::list_requests))
        .route("/users/search", get(friends::search_users))
        // Account
        .route(
            "/user/settings",
            get(users::get_settings).patch(users::update_settings),
        )
        .route("/user/account", delete(users::delete_account))
        .route("/user/export", get(users::export_data))
        .route("/user/history", get(users::history))
        .route("/profile/{username}", get(users::profile))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

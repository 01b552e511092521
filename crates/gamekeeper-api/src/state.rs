use std::sync::Arc;

use chrono::Duration;
use gamekeeper_core::{Clock, ElapsedPolicy, FriendService, SessionService, UserService};
use gamekeeper_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub sessions: SessionService,
    pub friends: FriendService,
    pub users: UserService,
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        clock: Arc<dyn Clock>,
        policy: ElapsedPolicy,
        jwt_secret: String,
        token_ttl: Duration,
    ) -> AppState {
        Arc::new(Self {
            sessions: SessionService::new(db.clone(), clock.clone(), policy),
            friends: FriendService::new(db.clone(), clock.clone()),
            users: UserService::new(db, clock, policy),
            jwt_secret,
            token_ttl,
        })
    }
}

//! Database row types. These map directly to SQLite rows and stay independent
//! of the API models in gamekeeper-types.

use chrono::{DateTime, Utc};

/// What a guarded write actually did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The row was written.
    Applied,
    /// A UNIQUE constraint already holds a row for this key.
    Conflict,
    /// The guard did not match (already transitioned, not found, not addressed to the caller).
    Skipped,
}

impl WriteOutcome {
    pub fn applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub is_private: bool,
    pub has_completed_onboarding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct GameRow {
    pub id: String,
    pub name: String,
    pub is_active: bool,
}

/// A session joined with its game and creator.
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub code: String,
    pub game: GameRow,
    pub creator_id: String,
    pub creator_username: Option<String>,
    pub creator_email: String,
    pub is_active: bool,
    pub voided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A session seen from one participant.
#[derive(Debug, Clone)]
pub struct ParticipationRow {
    pub session: SessionRow,
    pub joined_at: DateTime<Utc>,
    pub participant_count: i64,
}

#[derive(Debug, Clone)]
pub struct ParticipantRow {
    pub game_session_id: String,
    pub user_id: String,
    pub username: Option<String>,
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResultRow {
    pub id: String,
    pub game_session_id: String,
    pub entered_by_id: String,
    pub approved_by_id: Option<String>,
    pub score_data: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FriendRequestRow {
    pub id: String,
    pub from_user_id: String,
    pub to_user_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A friend request joined with the user on the other side of it.
#[derive(Debug, Clone)]
pub struct PeerRequestRow {
    pub request: FriendRequestRow,
    pub peer: UserRow,
}

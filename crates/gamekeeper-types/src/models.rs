use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::score::{PlayerOutcome, ScoreSheet};

/// Returned when a stored status string is not one we know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownStatus;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownStatus(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

status_enum!(
    /// Lifecycle of the single score record of a session.
    ResultStatus {
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
    }
);

status_enum!(
    /// Effective status of a session as reported to clients.
    SessionStatus {
        Active => "ACTIVE",
        Pending => "PENDING",
        Approved => "APPROVED",
        Rejected => "REJECTED",
        Void => "VOID",
        Inactive => "INACTIVE",
    }
);

status_enum!(
    FriendRequestStatus {
        Pending => "PENDING",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
    }
);

status_enum!(
    /// Relationship between the caller and another user, seen from the caller.
    FriendshipStatus {
        None => "NONE",
        Pending => "PENDING",
        PendingReceived => "PENDING_RECEIVED",
        Accepted => "ACCEPTED",
        Rejected => "REJECTED",
    }
);

impl From<ResultStatus> for SessionStatus {
    fn from(status: ResultStatus) -> Self {
        match status {
            ResultStatus::Pending => SessionStatus::Pending,
            ResultStatus::Approved => SessionStatus::Approved,
            ResultStatus::Rejected => SessionStatus::Rejected,
        }
    }
}

// -- Users --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    pub id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub is_private: bool,
    pub has_completed_onboarding: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Games & sessions --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub id: Uuid,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantView {
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub user: UserSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultView {
    pub id: Uuid,
    pub status: ResultStatus,
    pub score_data: ScoreSheet,
    pub entered_by_id: Uuid,
    pub approved_by_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A session with its participants, result and freshly resolved status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: Uuid,
    pub code: String,
    pub game: Game,
    pub created_by: UserSummary,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<ParticipantView>,
    pub result: Option<ResultView>,
    pub session_status: SessionStatus,
    /// Hours since the session was created.
    pub time_elapsed: f64,
    pub time_elapsed_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub code: String,
    pub game: Game,
    pub created_by: UserSummary,
    pub created_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    pub participant_count: usize,
    pub result: Option<ResultView>,
    pub is_active: bool,
    pub status: SessionStatus,
    pub time_elapsed: f64,
    pub is_creator: bool,
}

// -- Friends --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestView {
    pub id: Uuid,
    pub status: FriendRequestStatus,
    pub from_user: UserSummary,
    pub to_user: UserSummary,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row of the received/sent request lists; `user` is the other party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntry {
    pub id: Uuid,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub user: PublicUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friend {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub friendship_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub id: Uuid,
    pub username: Option<String>,
    pub email: String,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
    pub friendship_status: FriendshipStatus,
}

// -- Profiles --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUser {
    pub id: Uuid,
    pub username: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameTally {
    pub total: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub total_games: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
    /// Percentage, rounded to one decimal.
    pub win_rate: f64,
    pub game_stats: BTreeMap<String, GameTally>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSession {
    pub id: Uuid,
    pub code: String,
    pub game: Game,
    pub created_at: DateTime<Utc>,
    pub participant_count: usize,
    pub is_creator: bool,
    pub status: SessionStatus,
    pub outcome: PlayerOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user: ProfileUser,
    pub is_private: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<ProfileStats>,
    pub recent_sessions: Vec<ProfileSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// -- Export --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSession {
    pub id: Uuid,
    pub code: String,
    pub game_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub participants: Vec<UserSummary>,
    pub result: Option<ResultView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedRequests {
    pub sent: Vec<FriendRequestView>,
    pub received: Vec<FriendRequestView>,
}

/// Everything stored about one user, for the data export download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExport {
    pub user: UserSettings,
    pub game_sessions: Vec<ExportedSession>,
    pub participations: Vec<ExportedSession>,
    pub friend_requests: ExportedRequests,
    pub exported_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_round_trip_through_text() {
        for status in [ResultStatus::Pending, ResultStatus::Approved, ResultStatus::Rejected] {
            assert_eq!(status.as_str().parse::<ResultStatus>().unwrap(), status);
        }
        assert_eq!(
            "PENDING_RECEIVED".parse::<FriendshipStatus>().unwrap(),
            FriendshipStatus::PendingReceived
        );
        assert!("MAYBE".parse::<FriendRequestStatus>().is_err());
    }

    #[test]
    fn serde_uses_the_same_spelling_as_storage() {
        let json = serde_json::to_string(&SessionStatus::Void).unwrap();
        assert_eq!(json, "\"VOID\"");
        let json = serde_json::to_string(&FriendshipStatus::PendingReceived).unwrap();
        assert_eq!(json, "\"PENDING_RECEIVED\"");
    }
}

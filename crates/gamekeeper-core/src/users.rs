use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use gamekeeper_db::{Database, WriteOutcome};
use gamekeeper_db::models::{ParticipantRow, ResultRow, SessionRow, UserRow};
use gamekeeper_types::models::{
    ExportedRequests, ExportedSession, Game, GameTally, Profile, ProfileSession, ProfileStats,
    ProfileUser, SessionStatus, UserExport, UserSettings,
};
use gamekeeper_types::score::PlayerOutcome;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::convert;
use crate::elapsed::ElapsedPolicy;
use crate::error::{ServiceError, ServiceResult};
use crate::friends::FriendService;
use crate::sessions::SessionService;
use crate::Caller;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;

/// Sessions that feed the profile statistics.
pub const PROFILE_RECENT_SESSIONS: u32 = 10;

pub const PRIVATE_PROFILE_MESSAGE: &str = "This profile is private.";

/// Identity facts handed back on a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user_id: Uuid,
    pub email: String,
    pub username: Option<String>,
    pub has_completed_onboarding: bool,
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    sessions: SessionService,
    friends: FriendService,
}

impl UserService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, policy: ElapsedPolicy) -> Self {
        Self {
            sessions: SessionService::new(db.clone(), clock.clone(), policy),
            friends: FriendService::new(db.clone(), clock.clone()),
            db,
            clock,
        }
    }

    // -- Accounts --

    pub fn register(&self, email: &str, password: &str) -> ServiceResult<Uuid> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::validation("A valid email address is required"));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ServiceError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hash = hash_password(password)?;
        let user_id = Uuid::new_v4();
        let outcome =
            self.db
                .create_user(&user_id.to_string(), email, Some(&hash), self.clock.now())?;
        if !outcome.applied() {
            return Err(ServiceError::conflict("Email is already registered"));
        }

        info!(%user_id, "User registered");
        Ok(user_id)
    }

    pub fn login(&self, email: &str, password: &str) -> ServiceResult<LoginOutcome> {
        let invalid = || ServiceError::unauthorized("Invalid email or password");

        let user = self.db.get_user_by_email(email.trim())?.ok_or_else(invalid)?;
        let hash = user.password.as_deref().ok_or_else(invalid)?;
        if !verify_password(password, hash)? {
            return Err(invalid());
        }

        Ok(LoginOutcome {
            user_id: convert::parse_id(&user.id)?,
            email: user.email,
            username: user.username,
            has_completed_onboarding: user.has_completed_onboarding,
        })
    }

    /// Claims a username. Allowed once per account.
    pub fn onboard(&self, caller: Caller, username: &str) -> ServiceResult<UserSettings> {
        let username = username.trim();
        if !USERNAME_LEN.contains(&username.chars().count()) {
            return Err(ServiceError::Validation(format!(
                "Username must be between {} and {} characters",
                USERNAME_LEN.start(),
                USERNAME_LEN.end()
            )));
        }

        let user = self.user(caller)?;
        if user.has_completed_onboarding {
            return Err(ServiceError::validation("Onboarding is already completed"));
        }

        let outcome = self
            .db
            .complete_onboarding(&user.id, username, self.clock.now())?;
        match outcome {
            WriteOutcome::Applied => {}
            WriteOutcome::Conflict => {
                return Err(ServiceError::conflict("Username is already taken"));
            }
            WriteOutcome::Skipped => {
                return Err(ServiceError::validation("Onboarding is already completed"));
            }
        }

        info!(user_id = %caller.user_id, %username, "Onboarding completed");
        self.settings(caller)
    }

    pub fn settings(&self, caller: Caller) -> ServiceResult<UserSettings> {
        convert::settings(&self.user(caller)?)
    }

    pub fn set_private(&self, caller: Caller, is_private: bool) -> ServiceResult<UserSettings> {
        if !self
            .db
            .set_private(&caller.id(), is_private, self.clock.now())?
        {
            return Err(ServiceError::not_found("User not found"));
        }
        info!(user_id = %caller.user_id, is_private, "Privacy updated");
        self.settings(caller)
    }

    /// Deletes the account and everything hanging off it. Accounts with a
    /// password must confirm it.
    pub fn delete_account(&self, caller: Caller, password: Option<&str>) -> ServiceResult<()> {
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ServiceError::validation("Password is required to delete account"))?;

        let user = self.user(caller)?;
        if let Some(hash) = user.password.as_deref() {
            if !verify_password(password, hash)? {
                return Err(ServiceError::validation("Incorrect password"));
            }
        }

        self.db.delete_user(&user.id)?;
        info!(user_id = %caller.user_id, "Account deleted");
        Ok(())
    }

    /// Everything stored about the caller.
    pub fn export(&self, caller: Caller) -> ServiceResult<UserExport> {
        let user = self.user(caller)?;

        let created = self.db.sessions_created_by(&user.id)?;
        let joined: Vec<SessionRow> = self
            .db
            .sessions_for_participant(&user.id, None)?
            .into_iter()
            .map(|p| p.session)
            .collect();

        let (sent, received) = self.friends.export_requests(&user.id)?;

        Ok(UserExport {
            user: convert::settings(&user)?,
            game_sessions: self.exported_sessions(&created)?,
            participations: self.exported_sessions(&joined)?,
            friend_requests: ExportedRequests { sent, received },
            exported_at: self.clock.now(),
        })
    }

    // -- Profiles --

    /// Public profile with stats over the most recent sessions. Private
    /// profiles of other users come back with the user card only.
    pub fn profile(&self, caller: Caller, username: &str) -> ServiceResult<Profile> {
        let user = self
            .db
            .get_user_by_username(username)?
            .filter(|u| u.has_completed_onboarding)
            .ok_or_else(|| ServiceError::not_found("User not found"))?;

        let card = ProfileUser {
            id: convert::parse_id(&user.id)?,
            username: user.username.clone(),
            is_private: user.is_private,
            created_at: user.created_at,
        };

        if user.is_private && card.id != caller.user_id {
            return Ok(Profile {
                user: card,
                is_private: true,
                stats: None,
                recent_sessions: Vec::new(),
                message: Some(PRIVATE_PROFILE_MESSAGE.to_string()),
            });
        }

        let rows = self
            .db
            .sessions_for_participant(&user.id, Some(PROFILE_RECENT_SESSIONS))?;
        let ids: Vec<String> = rows.iter().map(|r| r.session.id.clone()).collect();
        let results = index_results(self.db.results_for_sessions(&ids)?);

        let now = self.clock.now();
        let mut recent = Vec::with_capacity(rows.len());
        for row in &rows {
            let session = &row.session;
            let result = results.get(&session.id);
            let status = self.sessions.derived_status(now, session, result)?;
            let outcome = match result {
                Some(r) if status == SessionStatus::Approved => {
                    convert::score_sheet(r)?.outcome_for(&user.id)
                }
                _ => PlayerOutcome::Unknown,
            };
            recent.push(ProfileSession {
                id: convert::parse_id(&session.id)?,
                code: session.code.clone(),
                game: convert::game(&session.game)?,
                created_at: session.created_at,
                participant_count: usize::try_from(row.participant_count).unwrap_or_default(),
                is_creator: session.creator_id == user.id,
                status,
                outcome,
            });
        }

        Ok(Profile {
            user: card,
            is_private: false,
            stats: Some(tally(&recent)),
            recent_sessions: recent,
            message: None,
        })
    }

    // -- Games --

    pub fn list_games(&self) -> ServiceResult<Vec<Game>> {
        self.db
            .list_active_games()?
            .iter()
            .map(convert::game)
            .collect()
    }

    fn user(&self, caller: Caller) -> ServiceResult<UserRow> {
        self.db
            .get_user_by_id(&caller.id())?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    fn exported_sessions(&self, sessions: &[SessionRow]) -> ServiceResult<Vec<ExportedSession>> {
        let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
        let mut participants: HashMap<String, Vec<ParticipantRow>> = HashMap::new();
        for p in self.db.participants_for_sessions(&ids)? {
            participants
                .entry(p.game_session_id.clone())
                .or_default()
                .push(p);
        }
        let results = index_results(self.db.results_for_sessions(&ids)?);

        sessions
            .iter()
            .map(|s| {
                Ok(ExportedSession {
                    id: convert::parse_id(&s.id)?,
                    code: s.code.clone(),
                    game_name: s.game.name.clone(),
                    is_active: s.is_active,
                    created_at: s.created_at,
                    participants: participants
                        .get(&s.id)
                        .map(Vec::as_slice)
                        .unwrap_or_default()
                        .iter()
                        .map(|p| convert::summary(&p.user_id, p.username.as_deref(), &p.email))
                        .collect::<ServiceResult<Vec<_>>>()?,
                    result: results.get(&s.id).map(convert::result).transpose()?,
                })
            })
            .collect()
    }
}

fn index_results(rows: Vec<ResultRow>) -> HashMap<String, ResultRow> {
    rows.into_iter()
        .map(|r| (r.game_session_id.clone(), r))
        .collect()
}

/// Totals over `sessions`. Every listed session counts toward the totals;
/// only settled outcomes count as wins, losses or draws.
fn tally(sessions: &[ProfileSession]) -> ProfileStats {
    let mut stats = ProfileStats::default();
    let mut per_game: BTreeMap<String, GameTally> = BTreeMap::new();

    for s in sessions {
        let game = per_game.entry(s.game.name.clone()).or_default();
        stats.total_games += 1;
        game.total += 1;
        match s.outcome {
            PlayerOutcome::Win => {
                stats.wins += 1;
                game.wins += 1;
            }
            PlayerOutcome::Loss => {
                stats.losses += 1;
                game.losses += 1;
            }
            PlayerOutcome::Draw => {
                stats.draws += 1;
                game.draws += 1;
            }
            PlayerOutcome::Unknown => {}
        }
    }

    if stats.total_games > 0 {
        let rate = f64::from(stats.wins) / f64::from(stats.total_games) * 100.0;
        stats.win_rate = (rate * 10.0).round() / 10.0;
    }
    stats.game_stats = per_game;
    stats
}

pub fn hash_password(password: &str) -> ServiceResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(password: &str, hash: &str) -> ServiceResult<bool> {
    let parsed =
        PasswordHash::new(hash).map_err(|e| anyhow::anyhow!("stored password hash is invalid: {e}"))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

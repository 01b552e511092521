use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use gamekeeper_db::Database;
use gamekeeper_db::models::{ResultRow, SessionRow};
use gamekeeper_types::api::ConfirmAction;
use gamekeeper_types::models::{HistoryEntry, ResultStatus, ResultView, SessionStatus, SessionView};
use gamekeeper_types::score::ScoreSheet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::code::allocate_code;
use crate::convert;
use crate::elapsed::{ElapsedPolicy, format_time_elapsed, hours_elapsed};
use crate::error::{ServiceError, ServiceResult};
use crate::Caller;

/// Outcome of a join: the session as it now stands, and whether the caller was
/// added by this call.
#[derive(Debug)]
pub struct Joined {
    pub session: SessionView,
    pub newly_joined: bool,
}

/// Counts from one sweeper pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub approved: usize,
    pub voided: usize,
}

/// A session with its result after any due time-based transitions ran.
struct Resolved {
    session: SessionRow,
    result: Option<ResultRow>,
}

#[derive(Clone)]
pub struct SessionService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    policy: ElapsedPolicy,
}

impl SessionService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>, policy: ElapsedPolicy) -> Self {
        Self { db, clock, policy }
    }

    pub fn policy(&self) -> ElapsedPolicy {
        self.policy
    }

    pub fn create(&self, caller: Caller, game_id: Uuid) -> ServiceResult<SessionView> {
        let game = self
            .db
            .get_game(&game_id.to_string())?
            .filter(|g| g.is_active)
            .ok_or_else(|| ServiceError::not_found("Game not found"))?;

        let session_id = Uuid::new_v4().to_string();
        let creator_id = caller.id();
        let now = self.clock.now();

        let code = allocate_code(&mut rand::rng(), |code| {
            if self.db.session_code_exists(code)? {
                return Ok(false);
            }
            let participant_id = Uuid::new_v4().to_string();
            let outcome = self.db.create_session(
                &session_id,
                code,
                &game.id,
                &creator_id,
                &participant_id,
                now,
            )?;
            Ok(outcome.applied())
        })?;

        info!(session_id = %session_id, %code, game = %game.name, creator = %creator_id, "Session created");
        self.get(caller, &session_id)
    }

    /// Fetches a session, applying any due auto-approval or auto-void first.
    pub fn get(&self, _caller: Caller, id_or_code: &str) -> ServiceResult<SessionView> {
        let session = self.load(id_or_code)?;
        let resolved = self.resolve(session)?;
        self.view(resolved)
    }

    pub fn join(&self, caller: Caller, id_or_code: &str) -> ServiceResult<Joined> {
        let session = self.load(id_or_code)?;
        let resolved = self.resolve(session)?;
        if !resolved.session.is_active {
            return Err(ServiceError::not_found("Session not found or inactive"));
        }

        let outcome = self.db.add_participant(
            &Uuid::new_v4().to_string(),
            &resolved.session.id,
            &caller.id(),
            self.clock.now(),
        )?;
        let newly_joined = outcome.applied();
        if newly_joined {
            info!(session_id = %resolved.session.id, user = %caller.user_id, "Participant joined");
        }

        Ok(Joined {
            session: self.view(resolved)?,
            newly_joined,
        })
    }

    pub fn submit_score(
        &self,
        caller: Caller,
        id_or_code: &str,
        score: &ScoreSheet,
    ) -> ServiceResult<ResultView> {
        let session = self.load(id_or_code)?;
        let user_id = caller.id();
        if !self.db.is_participant(&session.id, &user_id)? {
            return Err(ServiceError::forbidden(
                "You must be a participant to submit a score",
            ));
        }

        let resolved = self.resolve(session)?;
        if !resolved.session.is_active {
            return Err(ServiceError::validation("Session is not active"));
        }
        if resolved.result.is_some() {
            return Err(ServiceError::conflict(
                "A score has already been submitted for this session",
            ));
        }

        let score_data = serde_json::to_string(score).map_err(anyhow::Error::from)?;
        let result_id = Uuid::new_v4().to_string();
        let outcome = self.db.insert_result(
            &result_id,
            &resolved.session.id,
            &user_id,
            &score_data,
            self.clock.now(),
        )?;
        if !outcome.applied() {
            warn!(session_id = %resolved.session.id, "Concurrent score submission lost the race");
            return Err(ServiceError::conflict(
                "A score has already been submitted for this session",
            ));
        }

        info!(session_id = %resolved.session.id, result_id = %result_id, entered_by = %user_id, "Score submitted");
        self.current_result(&resolved.session.id)
    }

    pub fn confirm_score(
        &self,
        caller: Caller,
        id_or_code: &str,
        action: ConfirmAction,
    ) -> ServiceResult<ResultView> {
        let session = self.load(id_or_code)?;
        let user_id = caller.id();
        if !self.db.is_participant(&session.id, &user_id)? {
            return Err(ServiceError::forbidden(
                "You must be a participant to confirm a score",
            ));
        }

        let resolved = self.resolve(session)?;
        let result = resolved
            .result
            .as_ref()
            .ok_or_else(|| ServiceError::validation("No score has been submitted for this session"))?;
        if result.entered_by_id == user_id {
            return Err(ServiceError::forbidden(
                "You cannot confirm your own score submission",
            ));
        }
        if !resolved.session.is_active {
            return Err(ServiceError::validation("Session is not active"));
        }
        if convert::result_status(result)? != ResultStatus::Pending {
            return Err(ServiceError::validation("Score has already been confirmed"));
        }

        let status = match action {
            ConfirmAction::Approve => ResultStatus::Approved,
            ConfirmAction::Reject => ResultStatus::Rejected,
        };
        let outcome = self.db.settle_result(
            &result.id,
            status.as_str(),
            Some(&user_id),
            self.clock.now(),
        )?;
        if !outcome.applied() {
            warn!(result_id = %result.id, "Result left PENDING before confirmation landed");
            return Err(ServiceError::validation("Score has already been confirmed"));
        }

        info!(result_id = %result.id, %status, by = %user_id, "Score confirmed");
        self.current_result(&resolved.session.id)
    }

    pub fn end(&self, caller: Caller, id_or_code: &str) -> ServiceResult<SessionView> {
        let session = self.load(id_or_code)?;
        self.require_creator(caller, &session, "end")?;

        self.db.end_session(&session.id)?;
        info!(session_id = %session.id, "Session ended");

        let session = self.load(&session.id)?;
        let resolved = self.resolve(session)?;
        self.view(resolved)
    }

    pub fn delete(&self, caller: Caller, id_or_code: &str) -> ServiceResult<()> {
        let session = self.load(id_or_code)?;
        self.require_creator(caller, &session, "delete")?;

        self.db.delete_session(&session.id)?;
        info!(session_id = %session.id, "Session deleted");
        Ok(())
    }

    /// Every session the caller takes part in, newest first. Statuses are
    /// derived without writing.
    pub fn history(&self, caller: Caller) -> ServiceResult<Vec<HistoryEntry>> {
        let user_id = caller.id();
        let rows = self.db.sessions_for_participant(&user_id, None)?;
        let ids: Vec<String> = rows.iter().map(|r| r.session.id.clone()).collect();
        let mut results: HashMap<String, ResultRow> = self
            .db
            .results_for_sessions(&ids)?
            .into_iter()
            .map(|r| (r.game_session_id.clone(), r))
            .collect();

        let now = self.clock.now();
        rows.into_iter()
            .map(|row| {
                let session = &row.session;
                let result = results.remove(&session.id);
                let status = self.derived_status(now, session, result.as_ref())?;
                Ok(HistoryEntry {
                    id: convert::parse_id(&session.id)?,
                    code: session.code.clone(),
                    game: convert::game(&session.game)?,
                    created_by: convert::creator(session)?,
                    created_at: session.created_at,
                    joined_at: row.joined_at,
                    participant_count: usize::try_from(row.participant_count).unwrap_or_default(),
                    result: result.as_ref().map(convert::result).transpose()?,
                    is_active: session.is_active,
                    status,
                    time_elapsed: hours_elapsed(now, session.created_at),
                    is_creator: session.creator_id == user_id,
                })
            })
            .collect()
    }

    /// Applies every due transition across the whole store. Uses the same
    /// guarded writes as the read path, so it can run next to live traffic.
    pub fn sweep(&self) -> ServiceResult<SweepReport> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for result in self.db.pending_results()? {
            if self.policy.should_auto_approve(now, result.created_at)
                && self
                    .db
                    .settle_result(&result.id, ResultStatus::Approved.as_str(), None, now)?
                    .applied()
            {
                report.approved += 1;
            }
        }

        for (session_id, created_at) in self.db.unresulted_active_sessions()? {
            if self.policy.should_auto_void(now, created_at)
                && self.db.void_session_if_unresulted(&session_id, now)?
            {
                report.voided += 1;
            }
        }

        Ok(report)
    }

    pub(crate) fn derived_status(
        &self,
        now: DateTime<Utc>,
        session: &SessionRow,
        result: Option<&ResultRow>,
    ) -> ServiceResult<SessionStatus> {
        let result = result.map(convert::result_facts).transpose()?;
        Ok(self
            .policy
            .derive_status(now, convert::session_facts(session), result))
    }

    fn load(&self, id_or_code: &str) -> ServiceResult<SessionRow> {
        self.db
            .find_session(id_or_code)?
            .ok_or_else(|| ServiceError::not_found("Session not found"))
    }

    fn require_creator(&self, caller: Caller, session: &SessionRow, verb: &str) -> ServiceResult<()> {
        if session.creator_id == caller.id() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "Only the session creator can {verb} this session"
            )))
        }
    }

    /// Runs the lazy 24-hour rules for one session. Both writes are
    /// conditional, so concurrent readers apply each transition at most once.
    fn resolve(&self, mut session: SessionRow) -> ServiceResult<Resolved> {
        let now = self.clock.now();
        let mut result = self.db.get_result(&session.id)?;

        let due_for_approval = result
            .as_ref()
            .filter(|r| {
                r.status == ResultStatus::Pending.as_str()
                    && self.policy.should_auto_approve(now, r.created_at)
            })
            .map(|r| r.id.clone());

        if let Some(result_id) = due_for_approval {
            let outcome =
                self.db
                    .settle_result(&result_id, ResultStatus::Approved.as_str(), None, now)?;
            if outcome.applied() {
                info!(session_id = %session.id, %result_id, "Result auto-approved");
            }
            result = self.db.get_result(&session.id)?;
        } else if result.is_none()
            && session.is_active
            && self.policy.should_auto_void(now, session.created_at)
        {
            if self.db.void_session_if_unresulted(&session.id, now)? {
                info!(session_id = %session.id, "Session auto-voided");
            }
            // A submission may have landed first; re-read both.
            session = self.load(&session.id)?;
            result = self.db.get_result(&session.id)?;
        }

        Ok(Resolved { session, result })
    }

    fn current_result(&self, session_id: &str) -> ServiceResult<ResultView> {
        let row = self
            .db
            .get_result(session_id)?
            .ok_or_else(|| anyhow::anyhow!("result for session {session_id} vanished"))?;
        convert::result(&row)
    }

    fn view(&self, resolved: Resolved) -> ServiceResult<SessionView> {
        let Resolved { session, result } = resolved;
        let now = self.clock.now();
        let participants = self
            .db
            .list_participants(&session.id)?
            .iter()
            .map(convert::participant)
            .collect::<ServiceResult<Vec<_>>>()?;
        let session_status = self.derived_status(now, &session, result.as_ref())?;
        let time_elapsed = hours_elapsed(now, session.created_at);

        Ok(SessionView {
            id: convert::parse_id(&session.id)?,
            code: session.code.clone(),
            game: convert::game(&session.game)?,
            created_by: convert::creator(&session)?,
            is_active: session.is_active,
            created_at: session.created_at,
            participants,
            result: result.as_ref().map(convert::result).transpose()?,
            session_status,
            time_elapsed,
            time_elapsed_label: format_time_elapsed(time_elapsed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use gamekeeper_types::score::Outcome;
    use serde_json::json;

    const CHESS: &str = "00000000-0000-0000-0000-0000000000c1";

    struct Fixture {
        service: SessionService,
        clock: Arc<ManualClock>,
        alice: Caller,
        bob: Caller,
        carol: Caller,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new("2026-05-01T09:00:00Z".parse().unwrap()));
        let mut callers = Vec::new();
        for name in ["alice", "bob", "carol"] {
            let id = Uuid::new_v4();
            db.create_user(&id.to_string(), &format!("{name}@example.com"), None, clock.now())
                .unwrap();
            db.complete_onboarding(&id.to_string(), name, clock.now())
                .unwrap();
            callers.push(Caller::new(id));
        }
        Fixture {
            service: SessionService::new(db, clock.clone(), ElapsedPolicy::default()),
            clock,
            alice: callers[0],
            bob: callers[1],
            carol: callers[2],
        }
    }

    fn chess() -> Uuid {
        CHESS.parse().unwrap()
    }

    fn sheet(winner: Caller, loser: Caller) -> ScoreSheet {
        ScoreSheet::from_value(json!({
            "winner": winner.user_id.to_string(),
            "scores": { winner.user_id.to_string(): 1, loser.user_id.to_string(): 0 }
        }))
        .unwrap()
    }

    #[test]
    fn create_issues_a_code_and_enrolls_the_creator() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();

        assert!(crate::code::is_valid_code(&session.code));
        assert_eq!(session.session_status, SessionStatus::Active);
        assert_eq!(session.participants.len(), 1);
        assert_eq!(session.participants[0].user_id, f.alice.user_id);
        assert_eq!(session.created_by.id, f.alice.user_id);
        assert_eq!(session.game.name, "Chess");
        assert_eq!(session.time_elapsed_label, "0 minutes");
    }

    #[test]
    fn create_rejects_unknown_games() {
        let f = fixture();
        let err = f.service.create(f.alice, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn join_by_code_is_idempotent() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();

        let first = f.service.join(f.bob, &session.code).unwrap();
        assert!(first.newly_joined);
        assert_eq!(first.session.participants.len(), 2);

        let again = f.service.join(f.bob, &session.code).unwrap();
        assert!(!again.newly_joined);
        assert_eq!(again.session.participants.len(), 2);
    }

    #[test]
    fn join_refuses_ended_sessions() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.end(f.alice, &session.code).unwrap();

        let err = f.service.join(f.bob, &session.code).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn end_to_end_approval() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();

        let result = f
            .service
            .submit_score(f.alice, &session.code, &sheet(f.alice, f.bob))
            .unwrap();
        assert_eq!(result.status, ResultStatus::Pending);
        assert_eq!(result.entered_by_id, f.alice.user_id);

        let confirmed = f
            .service
            .confirm_score(f.bob, &session.id.to_string(), ConfirmAction::Approve)
            .unwrap();
        assert_eq!(confirmed.status, ResultStatus::Approved);
        assert_eq!(confirmed.approved_by_id, Some(f.bob.user_id));

        let view = f.service.get(f.alice, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Approved);
        let stored = view.result.unwrap();
        assert_eq!(stored.approved_by_id, Some(f.bob.user_id));
        assert_eq!(
            stored.score_data.winner(),
            Some(Outcome::Winner(f.alice.user_id.to_string()))
        );
    }

    #[test]
    fn outsiders_cannot_submit_or_confirm() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();

        let err = f
            .service
            .submit_score(f.carol, &session.code, &ScoreSheet::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        f.service
            .submit_score(f.alice, &session.code, &ScoreSheet::default())
            .unwrap();
        let err = f
            .service
            .confirm_score(f.carol, &session.code, ConfirmAction::Approve)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }

    #[test]
    fn second_submission_is_a_conflict() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();

        f.service
            .submit_score(f.alice, &session.code, &sheet(f.alice, f.bob))
            .unwrap();
        let err = f
            .service
            .submit_score(f.bob, &session.code, &sheet(f.bob, f.alice))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn submitter_never_confirms() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();
        f.service
            .submit_score(f.alice, &session.code, &sheet(f.alice, f.bob))
            .unwrap();

        for action in [ConfirmAction::Approve, ConfirmAction::Reject] {
            let err = f
                .service
                .confirm_score(f.alice, &session.code, action)
                .unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden(_)));
        }
    }

    #[test]
    fn confirm_without_result_is_a_validation_error() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();

        let err = f
            .service
            .confirm_score(f.bob, &session.code, ConfirmAction::Approve)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn settled_results_stay_settled() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();
        f.service.join(f.carol, &session.code).unwrap();
        f.service
            .submit_score(f.alice, &session.code, &sheet(f.alice, f.bob))
            .unwrap();

        let rejected = f
            .service
            .confirm_score(f.bob, &session.code, ConfirmAction::Reject)
            .unwrap();
        assert_eq!(rejected.status, ResultStatus::Rejected);

        let err = f
            .service
            .confirm_score(f.carol, &session.code, ConfirmAction::Approve)
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        f.clock.advance(Duration::hours(48));
        let view = f.service.get(f.alice, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Rejected);
    }

    #[test]
    fn unattended_session_voids_at_the_threshold() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();

        f.clock.advance(Duration::hours(23) + Duration::minutes(59));
        let view = f.service.get(f.alice, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Active);
        assert!(view.is_active);

        f.clock.advance(Duration::minutes(1));
        let view = f.service.get(f.alice, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Void);
        assert!(!view.is_active);
        assert_eq!(view.time_elapsed_label, "1 day");

        // Stays VOID on later reads, unlike a manual end.
        let view = f.service.get(f.bob, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Void);
    }

    #[test]
    fn pending_result_auto_approves_at_the_threshold() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();
        f.service
            .submit_score(f.alice, &session.code, &sheet(f.alice, f.bob))
            .unwrap();

        f.clock.advance(Duration::hours(23) + Duration::minutes(59));
        let view = f.service.get(f.bob, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Pending);

        f.clock.advance(Duration::minutes(1));
        let view = f.service.get(f.bob, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Approved);
        let result = view.result.unwrap();
        assert_eq!(result.status, ResultStatus::Approved);
        assert_eq!(result.approved_by_id, None);

        // The session itself is not voided by the time rule once a result exists.
        assert!(view.is_active);
    }

    #[test]
    fn void_happens_before_a_late_submission() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.clock.advance(Duration::hours(25));

        let err = f
            .service
            .submit_score(f.alice, &session.code, &ScoreSheet::default())
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn manual_end_reports_inactive() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        let ended = f.service.end(f.alice, &session.code).unwrap();
        assert!(!ended.is_active);
        assert_eq!(ended.session_status, SessionStatus::Inactive);

        f.clock.advance(Duration::hours(30));
        let view = f.service.get(f.alice, &session.code).unwrap();
        assert_eq!(view.session_status, SessionStatus::Inactive);
    }

    #[test]
    fn only_the_creator_ends_or_deletes() {
        let f = fixture();
        let session = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &session.code).unwrap();

        assert!(matches!(
            f.service.end(f.bob, &session.code).unwrap_err(),
            ServiceError::Forbidden(_)
        ));
        assert!(matches!(
            f.service.delete(f.bob, &session.code).unwrap_err(),
            ServiceError::Forbidden(_)
        ));

        f.service.delete(f.alice, &session.code).unwrap();
        assert!(matches!(
            f.service.get(f.alice, &session.code).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn history_derives_status_without_writing() {
        let f = fixture();
        let first = f.service.create(f.alice, chess()).unwrap();
        f.clock.advance(Duration::hours(1));
        let second = f.service.create(f.bob, chess()).unwrap();
        f.service.join(f.alice, &second.code).unwrap();

        f.clock.advance(Duration::hours(24));
        let history = f.service.history(f.alice).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert!(!history[0].is_creator);
        assert_eq!(history[0].participant_count, 2);
        assert_eq!(history[1].id, first.id);
        assert!(history[1].is_creator);
        assert_eq!(history[1].status, SessionStatus::Void);

        // Not persisted: the row is still active until something resolves it.
        assert!(history[1].is_active);
    }

    #[test]
    fn sweep_applies_due_transitions_once() {
        let f = fixture();
        let idle = f.service.create(f.alice, chess()).unwrap();
        let scored = f.service.create(f.alice, chess()).unwrap();
        f.service.join(f.bob, &scored.code).unwrap();
        f.service
            .submit_score(f.alice, &scored.code, &sheet(f.alice, f.bob))
            .unwrap();

        assert_eq!(f.service.sweep().unwrap(), SweepReport::default());

        f.clock.advance(Duration::hours(24));
        let report = f.service.sweep().unwrap();
        assert_eq!(report, SweepReport { approved: 1, voided: 1 });
        assert_eq!(f.service.sweep().unwrap(), SweepReport::default());

        let idle = f.service.get(f.alice, &idle.code).unwrap();
        assert_eq!(idle.session_status, SessionStatus::Void);
        let scored = f.service.get(f.alice, &scored.code).unwrap();
        assert_eq!(scored.session_status, SessionStatus::Approved);
    }
}

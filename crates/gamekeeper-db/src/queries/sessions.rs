use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};

use super::{game_at, is_unique_violation, placeholders};
use crate::Database;
use crate::models::{ParticipantRow, ParticipationRow, ResultRow, SessionRow, WriteOutcome};

const SESSION_SELECT: &str = "SELECT s.id, s.code, g.id, g.name, g.is_active, s.creator_id,
        u.username, u.email, s.is_active, s.voided_at, s.created_at
     FROM game_sessions s
     JOIN games g ON g.id = s.game_id
     JOIN users u ON u.id = s.creator_id";

const SESSION_COLUMN_COUNT: usize = 11;

const RESULT_COLUMNS: &str =
    "id, game_session_id, entered_by_id, approved_by_id, score_data, status, created_at, updated_at";

impl Database {
    // -- Sessions --

    pub fn session_code_exists(&self, code: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM game_sessions WHERE code = ?1)",
                [code],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Inserts the session and its creator's participant row in one transaction.
    /// `Conflict` means the code was taken between the existence check and the insert.
    pub fn create_session(
        &self,
        id: &str,
        code: &str,
        game_id: &str,
        creator_id: &str,
        participant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT INTO game_sessions (id, code, game_id, creator_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, code, game_id, creator_id, now],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Ok(WriteOutcome::Conflict),
                Err(e) => return Err(e.into()),
            }
            tx.execute(
                "INSERT INTO participants (id, game_session_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![participant_id, id, creator_id, now],
            )?;
            tx.commit()?;
            Ok(WriteOutcome::Applied)
        })
    }

    /// Looks a session up by internal id or by its shareable code.
    pub fn find_session(&self, id_or_code: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            let sql = format!("{SESSION_SELECT} WHERE s.id = ?1 OR s.code = ?1 LIMIT 1");
            let row = conn
                .query_row(&sql, [id_or_code], |row| session_at(row, 0))
                .optional()?;
            Ok(row)
        })
    }

    pub fn end_session(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE game_sessions SET is_active = 0 WHERE id = ?1",
                [id],
            )?;
            Ok(updated == 1)
        })
    }

    /// Deactivates a session that never received a result. Safe to race: only
    /// the first caller sees `true`.
    pub fn void_session_if_unresulted(&self, id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE game_sessions SET is_active = 0, voided_at = ?2
                 WHERE id = ?1
                   AND is_active = 1
                   AND NOT EXISTS (SELECT 1 FROM results WHERE game_session_id = ?1)",
                rusqlite::params![id, now],
            )?;
            Ok(updated == 1)
        })
    }

    /// Deletes the session; participants and result cascade.
    pub fn delete_session(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM game_sessions WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    /// Active sessions with no result, for the sweeper.
    pub fn unresulted_active_sessions(&self) -> Result<Vec<(String, DateTime<Utc>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.created_at FROM game_sessions s
                 WHERE s.is_active = 1
                   AND NOT EXISTS (SELECT 1 FROM results r WHERE r.game_session_id = s.id)",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sessions a user takes part in, newest first.
    pub fn sessions_for_participant(
        &self,
        user_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<ParticipationRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SESSION_SELECT}
                 JOIN participants me ON me.game_session_id = s.id AND me.user_id = ?1
                 ORDER BY s.created_at DESC, s.rowid DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let limit = limit.map(i64::from).unwrap_or(-1);
            let sessions = stmt
                .query_map(rusqlite::params![user_id, limit], |row| session_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            sessions
                .into_iter()
                .map(|session| -> Result<ParticipationRow> {
                    let (joined_at, participant_count) = conn.query_row(
                        "SELECT
                            (SELECT joined_at FROM participants
                             WHERE game_session_id = ?1 AND user_id = ?2),
                            (SELECT COUNT(*) FROM participants WHERE game_session_id = ?1)",
                        rusqlite::params![session.id, user_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )?;
                    Ok(ParticipationRow {
                        session,
                        joined_at,
                        participant_count,
                    })
                })
                .collect()
        })
    }

    pub fn sessions_created_by(&self, user_id: &str) -> Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{SESSION_SELECT} WHERE s.creator_id = ?1 ORDER BY s.created_at DESC, s.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| session_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Participants --

    /// Adds a participant; re-joining is a `Conflict`, not an error.
    pub fn add_participant(
        &self,
        id: &str,
        session_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO participants (id, game_session_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(game_session_id, user_id) DO NOTHING",
                rusqlite::params![id, session_id, user_id, now],
            )?;
            Ok(if inserted == 1 {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Conflict
            })
        })
    }

    pub fn is_participant(&self, session_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM participants WHERE game_session_id = ?1 AND user_id = ?2)",
                [session_id, user_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn list_participants(&self, session_id: &str) -> Result<Vec<ParticipantRow>> {
        self.participants_for_sessions(&[session_id.to_string()])
    }

    /// Batch-fetch participants (with user details) for a set of sessions.
    pub fn participants_for_sessions(&self, session_ids: &[String]) -> Result<Vec<ParticipantRow>> {
        if session_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT p.game_session_id, p.user_id, u.username, u.email, p.joined_at
                 FROM participants p
                 JOIN users u ON u.id = p.user_id
                 WHERE p.game_session_id IN ({})
                 ORDER BY p.joined_at ASC, p.rowid ASC",
                placeholders(1, session_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(session_ids), |row| {
                    Ok(ParticipantRow {
                        game_session_id: row.get(0)?,
                        user_id: row.get(1)?,
                        username: row.get(2)?,
                        email: row.get(3)?,
                        joined_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Results --

    pub fn get_result(&self, session_id: &str) -> Result<Option<ResultRow>> {
        self.with_conn(|conn| query_result(conn, session_id))
    }

    /// Batch-fetch results for a set of sessions.
    pub fn results_for_sessions(&self, session_ids: &[String]) -> Result<Vec<ResultRow>> {
        if session_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {RESULT_COLUMNS} FROM results WHERE game_session_id IN ({})",
                placeholders(1, session_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(session_ids), result_at)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Inserts the one result a session may ever have. The UNIQUE constraint on
    /// `game_session_id` turns a second submission into `Conflict`.
    pub fn insert_result(
        &self,
        id: &str,
        session_id: &str,
        entered_by_id: &str,
        score_data: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO results (id, game_session_id, entered_by_id, score_data, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'PENDING', ?5, ?5)
                 ON CONFLICT(game_session_id) DO NOTHING",
                rusqlite::params![id, session_id, entered_by_id, score_data, now],
            )?;
            Ok(if inserted == 1 {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Conflict
            })
        })
    }

    /// Moves a result out of PENDING. `approved_by_id` is `None` for automatic
    /// approval. `Skipped` means the result had already left PENDING.
    pub fn settle_result(
        &self,
        result_id: &str,
        status: &str,
        approved_by_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE results SET status = ?2, approved_by_id = ?3, updated_at = ?4
                 WHERE id = ?1 AND status = 'PENDING'",
                rusqlite::params![result_id, status, approved_by_id, now],
            )?;
            Ok(if updated == 1 {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Skipped
            })
        })
    }

    /// PENDING results, for the sweeper.
    pub fn pending_results(&self) -> Result<Vec<ResultRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {RESULT_COLUMNS} FROM results WHERE status = 'PENDING'");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], result_at)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn session_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(offset)?,
        code: row.get(offset + 1)?,
        game: game_at(row, offset + 2)?,
        creator_id: row.get(offset + 5)?,
        creator_username: row.get(offset + 6)?,
        creator_email: row.get(offset + 7)?,
        is_active: row.get(offset + 8)?,
        voided_at: row.get(offset + 9)?,
        created_at: row.get(offset + SESSION_COLUMN_COUNT - 1)?,
    })
}

fn result_at(row: &Row<'_>) -> rusqlite::Result<ResultRow> {
    Ok(ResultRow {
        id: row.get(0)?,
        game_session_id: row.get(1)?,
        entered_by_id: row.get(2)?,
        approved_by_id: row.get(3)?,
        score_data: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn query_result(conn: &Connection, session_id: &str) -> Result<Option<ResultRow>> {
    let sql = format!("SELECT {RESULT_COLUMNS} FROM results WHERE game_session_id = ?1");
    let row = conn.query_row(&sql, [session_id], result_at).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const CHESS: &str = "00000000-0000-0000-0000-0000000000c1";

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.create_user("alice", "alice@example.com", None, now).unwrap();
        db.create_user("bob", "bob@example.com", None, now).unwrap();
        db.create_session("s1", "AB123456", CHESS, "alice", "p1", now)
            .unwrap();
        db
    }

    #[test]
    fn session_is_found_by_id_or_code() {
        let db = setup();
        let by_id = db.find_session("s1").unwrap().unwrap();
        let by_code = db.find_session("AB123456").unwrap().unwrap();
        assert_eq!(by_id.id, by_code.id);
        assert_eq!(by_id.game.name, "Chess");
        assert_eq!(by_id.creator_email, "alice@example.com");
        assert!(db.find_session("ZZ000000").unwrap().is_none());
    }

    #[test]
    fn duplicate_code_is_a_conflict() {
        let db = setup();
        let outcome = db
            .create_session("s2", "AB123456", CHESS, "bob", "p2", Utc::now())
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
        assert!(db.find_session("s2").unwrap().is_none());
    }

    #[test]
    fn creator_is_first_participant_and_joins_are_unique() {
        let db = setup();
        assert!(db.is_participant("s1", "alice").unwrap());
        let now = Utc::now();
        assert_eq!(
            db.add_participant("p2", "s1", "bob", now).unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            db.add_participant("p3", "s1", "bob", now).unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(db.list_participants("s1").unwrap().len(), 2);
    }

    #[test]
    fn only_one_result_per_session() {
        let db = setup();
        let now = Utc::now();
        assert_eq!(
            db.insert_result("r1", "s1", "alice", "{}", now).unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            db.insert_result("r2", "s1", "bob", "{}", now).unwrap(),
            WriteOutcome::Conflict
        );
    }

    #[test]
    fn settled_results_never_move_again() {
        let db = setup();
        let now = Utc::now();
        db.insert_result("r1", "s1", "alice", "{}", now).unwrap();
        assert_eq!(
            db.settle_result("r1", "REJECTED", Some("bob"), now).unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            db.settle_result("r1", "APPROVED", None, now).unwrap(),
            WriteOutcome::Skipped
        );
        let result = db.get_result("s1").unwrap().unwrap();
        assert_eq!(result.status, "REJECTED");
        assert_eq!(result.approved_by_id.as_deref(), Some("bob"));
    }

    #[test]
    fn void_only_applies_to_active_sessions_without_result() {
        let db = setup();
        let later = Utc::now() + Duration::hours(25);
        assert!(db.void_session_if_unresulted("s1", later).unwrap());
        assert!(!db.void_session_if_unresulted("s1", later).unwrap());

        let session = db.find_session("s1").unwrap().unwrap();
        assert!(!session.is_active);
        assert_eq!(session.voided_at, Some(later));
    }

    #[test]
    fn deleting_a_session_cascades() {
        let db = setup();
        let now = Utc::now();
        db.add_participant("p2", "s1", "bob", now).unwrap();
        db.insert_result("r1", "s1", "alice", "{}", now).unwrap();

        assert!(db.delete_session("s1").unwrap());
        assert!(db.list_participants("s1").unwrap().is_empty());
        assert!(db.get_result("s1").unwrap().is_none());
    }

    #[test]
    fn participation_rows_carry_counts() {
        let db = setup();
        db.add_participant("p2", "s1", "bob", Utc::now()).unwrap();
        let rows = db.sessions_for_participant("bob", None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].participant_count, 2);
        assert_eq!(rows[0].session.code, "AB123456");
    }
}

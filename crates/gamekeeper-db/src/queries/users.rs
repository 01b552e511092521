use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};

use super::{USER_COLUMNS, game_at, is_unique_violation, user_at};
use crate::Database;
use crate::models::{GameRow, UserRow, WriteOutcome};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(email) DO NOTHING",
                rusqlite::params![id, email, password_hash, now],
            )?;
            Ok(if inserted == 1 {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Conflict
            })
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    /// Sets the username once. `Skipped` means the user is missing or already onboarded.
    pub fn complete_onboarding(
        &self,
        id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users
                 SET username = ?2, has_completed_onboarding = 1, updated_at = ?3
                 WHERE id = ?1 AND has_completed_onboarding = 0",
                rusqlite::params![id, username, now],
            );
            match updated {
                Ok(1) => Ok(WriteOutcome::Applied),
                Ok(_) => Ok(WriteOutcome::Skipped),
                Err(e) if is_unique_violation(&e) => Ok(WriteOutcome::Conflict),
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn set_private(&self, id: &str, is_private: bool, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET is_private = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, is_private, now],
            )?;
            Ok(updated == 1)
        })
    }

    /// Deletes the user; sessions, participations, results and requests cascade.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    /// Case-insensitive substring search over username and email, skipping the
    /// caller and anyone who has not finished onboarding.
    pub fn search_users(&self, caller_id: &str, needle: &str, limit: u32) -> Result<Vec<UserRow>> {
        let pattern = like_pattern(needle);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id <> ?1
                   AND has_completed_onboarding = 1
                   AND (username LIKE ?2 ESCAPE '\\' OR email LIKE ?2 ESCAPE '\\')
                 ORDER BY username COLLATE NOCASE ASC
                 LIMIT ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![caller_id, pattern, limit], |row| {
                    user_at(row, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Games --

    pub fn list_active_games(&self) -> Result<Vec<GameRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, is_active FROM games WHERE is_active = 1 ORDER BY name ASC",
            )?;
            let rows = stmt
                .query_map([], |row| game_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_game(&self, id: &str) -> Result<Option<GameRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, is_active FROM games WHERE id = ?1",
                    [id],
                    |row| game_at(row, 0),
                )
                .optional()?;
            Ok(row)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let row = conn
        .query_row(&sql, [value], |row| user_at(row, 0))
        .optional()?;
    Ok(row)
}

/// Wraps `needle` in `%` after escaping LIKE wildcards.
fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        for (id, email, username) in [
            ("u1", "alice@example.com", Some("alice")),
            ("u2", "bob@example.com", Some("Bob_the_builder")),
            ("u3", "carol@example.com", None),
        ] {
            db.create_user(id, email, None, now).unwrap();
            if let Some(name) = username {
                db.complete_onboarding(id, name, now).unwrap();
            }
        }
        db
    }

    #[test]
    fn duplicate_email_is_a_conflict() {
        let db = db_with_users();
        let outcome = db.create_user("u9", "ALICE@example.com", None, Utc::now()).unwrap();
        assert_eq!(outcome, WriteOutcome::Conflict);
    }

    #[test]
    fn onboarding_is_one_shot_and_usernames_are_unique() {
        let db = db_with_users();
        let now = Utc::now();
        assert_eq!(
            db.complete_onboarding("u1", "alice2", now).unwrap(),
            WriteOutcome::Skipped
        );
        assert_eq!(
            db.complete_onboarding("u3", "ALICE", now).unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(
            db.complete_onboarding("u3", "carol", now).unwrap(),
            WriteOutcome::Applied
        );
    }

    #[test]
    fn search_skips_caller_and_unonboarded_users() {
        let db = db_with_users();
        let hits = db.search_users("u1", "EXAMPLE", 10).unwrap();
        let ids: Vec<_> = hits.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u2"]);
    }

    #[test]
    fn search_treats_wildcards_literally() {
        let db = db_with_users();
        assert_eq!(db.search_users("u1", "b_b", 10).unwrap().len(), 0);
        assert_eq!(db.search_users("u1", "b_the", 10).unwrap().len(), 1);
        assert_eq!(db.search_users("u1", "%", 10).unwrap().len(), 0);
    }

    #[test]
    fn active_games_are_sorted_by_name() {
        let db = Database::open_in_memory().unwrap();
        let names: Vec<_> = db
            .list_active_games()
            .unwrap()
            .into_iter()
            .map(|g| g.name)
            .collect();
        assert_eq!(names, vec!["Chess", "Darts", "FIFA", "Pool", "Table Tennis"]);
    }
}

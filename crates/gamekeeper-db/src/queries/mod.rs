mod friends;
mod sessions;
mod users;

pub use friends::RequestFilter;

use rusqlite::{Row, ffi};

use crate::models::{GameRow, UserRow};

const USER_COLUMNS: &str =
    "id, email, username, password, is_private, has_completed_onboarding, created_at, updated_at";

/// True when a write failed on a UNIQUE or PRIMARY KEY constraint.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error(),
        Some(e) if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
            || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    )
}

/// `?1, ?2, ...` for an `IN (...)` list starting at `first`.
fn placeholders(first: usize, count: usize) -> String {
    (first..first + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads a user from eight consecutive columns starting at `offset`.
fn user_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(offset)?,
        email: row.get(offset + 1)?,
        username: row.get(offset + 2)?,
        password: row.get(offset + 3)?,
        is_private: row.get(offset + 4)?,
        has_completed_onboarding: row.get(offset + 5)?,
        created_at: row.get(offset + 6)?,
        updated_at: row.get(offset + 7)?,
    })
}

fn game_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<GameRow> {
    Ok(GameRow {
        id: row.get(offset)?,
        name: row.get(offset + 1)?,
        is_active: row.get(offset + 2)?,
    })
}

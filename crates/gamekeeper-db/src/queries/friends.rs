use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};

use super::{USER_COLUMNS, user_at};
use crate::Database;
use crate::models::{FriendRequestRow, PeerRequestRow, WriteOutcome};

const REQUEST_COLUMNS: &str = "fr.id, fr.from_user_id, fr.to_user_id, fr.status, fr.created_at, fr.updated_at";

/// Which requests around a user to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFilter {
    /// ACCEPTED requests in either direction; the peer is the other party.
    Accepted,
    /// PENDING requests addressed to the user; the peer is the sender.
    ReceivedPending,
    /// Every request addressed to the user, any status.
    Received,
    /// Every request the user sent, any status; the peer is the recipient.
    Sent,
}

impl RequestFilter {
    fn clause(self) -> &'static str {
        match self {
            RequestFilter::Accepted => {
                "(fr.from_user_id = ?1 OR fr.to_user_id = ?1) AND fr.status = 'ACCEPTED'
                 ORDER BY fr.updated_at DESC, fr.rowid DESC"
            }
            RequestFilter::ReceivedPending => {
                "fr.to_user_id = ?1 AND fr.status = 'PENDING'
                 ORDER BY fr.created_at DESC, fr.rowid DESC"
            }
            RequestFilter::Received => {
                "fr.to_user_id = ?1 ORDER BY fr.created_at DESC, fr.rowid DESC"
            }
            RequestFilter::Sent => {
                "fr.from_user_id = ?1 ORDER BY fr.created_at DESC, fr.rowid DESC"
            }
        }
    }
}

impl Database {
    // -- Friend requests --

    /// Inserts a PENDING request. The pair is stored in canonical order, so a
    /// request in either direction between the same two users is a `Conflict`.
    pub fn insert_friend_request(
        &self,
        id: &str,
        from_user_id: &str,
        to_user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let (low, high) = canonical_pair(from_user_id, to_user_id);
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO friend_requests
                    (id, from_user_id, to_user_id, user_low, user_high, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'PENDING', ?6, ?6)
                 ON CONFLICT(user_low, user_high) DO NOTHING",
                rusqlite::params![id, from_user_id, to_user_id, low, high, now],
            )?;
            Ok(if inserted == 1 {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Conflict
            })
        })
    }

    pub fn get_friend_request(&self, id: &str) -> Result<Option<FriendRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {REQUEST_COLUMNS} FROM friend_requests fr WHERE fr.id = ?1");
            let row = conn.query_row(&sql, [id], |row| request_at(row, 0)).optional()?;
            Ok(row)
        })
    }

    /// The request between two users, whichever of them sent it.
    pub fn find_request_between(&self, a: &str, b: &str) -> Result<Option<FriendRequestRow>> {
        let (low, high) = canonical_pair(a, b);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friend_requests fr
                 WHERE fr.user_low = ?1 AND fr.user_high = ?2"
            );
            let row = conn
                .query_row(&sql, [low, high], |row| request_at(row, 0))
                .optional()?;
            Ok(row)
        })
    }

    /// Settles a PENDING request addressed to `to_user_id`. Anything else
    /// (wrong recipient, already settled, unknown id) is `Skipped`.
    pub fn respond_to_friend_request(
        &self,
        id: &str,
        to_user_id: &str,
        status: &str,
        now: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE friend_requests SET status = ?3, updated_at = ?4
                 WHERE id = ?1 AND to_user_id = ?2 AND status = 'PENDING'",
                rusqlite::params![id, to_user_id, status, now],
            )?;
            Ok(if updated == 1 {
                WriteOutcome::Applied
            } else {
                WriteOutcome::Skipped
            })
        })
    }

    /// Requests around `user_id`, each joined with the user on the other side.
    pub fn friend_requests_for(
        &self,
        user_id: &str,
        filter: RequestFilter,
    ) -> Result<Vec<PeerRequestRow>> {
        self.with_conn(|conn| {
            let peer_columns = USER_COLUMNS
                .split(", ")
                .map(|c| format!("u.{c}"))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "SELECT {REQUEST_COLUMNS}, {peer_columns}
                 FROM friend_requests fr
                 JOIN users u ON u.id = CASE WHEN fr.from_user_id = ?1
                                             THEN fr.to_user_id
                                             ELSE fr.from_user_id END
                 WHERE {}",
                filter.clause()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(PeerRequestRow {
                        request: request_at(row, 0)?,
                        peer: user_at(row, 6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn canonical_pair<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a <= b { (a, b) } else { (b, a) }
}

fn request_at(row: &Row<'_>, offset: usize) -> rusqlite::Result<FriendRequestRow> {
    Ok(FriendRequestRow {
        id: row.get(offset)?,
        from_user_id: row.get(offset + 1)?,
        to_user_id: row.get(offset + 2)?,
        status: row.get(offset + 3)?,
        created_at: row.get(offset + 4)?,
        updated_at: row.get(offset + 5)?,
    })
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                          TEXT PRIMARY KEY,
                email                       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                username                    TEXT UNIQUE COLLATE NOCASE,
                password                    TEXT,
                is_private                  INTEGER NOT NULL DEFAULT 0,
                has_completed_onboarding    INTEGER NOT NULL DEFAULT 0,
                created_at                  TEXT NOT NULL,
                updated_at                  TEXT NOT NULL
            );

            CREATE TABLE games (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                is_active   INTEGER NOT NULL DEFAULT 1
            );

            CREATE TABLE game_sessions (
                id          TEXT PRIMARY KEY,
                code        TEXT NOT NULL UNIQUE,
                game_id     TEXT NOT NULL REFERENCES games(id),
                creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                is_active   INTEGER NOT NULL DEFAULT 1,
                voided_at   TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_game_sessions_creator
                ON game_sessions(creator_id);

            CREATE TABLE participants (
                id              TEXT PRIMARY KEY,
                game_session_id TEXT NOT NULL REFERENCES game_sessions(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                joined_at       TEXT NOT NULL,
                UNIQUE(game_session_id, user_id)
            );

            CREATE INDEX idx_participants_user
                ON participants(user_id);

            CREATE TABLE results (
                id              TEXT PRIMARY KEY,
                game_session_id TEXT NOT NULL UNIQUE REFERENCES game_sessions(id) ON DELETE CASCADE,
                entered_by_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                approved_by_id  TEXT REFERENCES users(id) ON DELETE SET NULL,
                score_data      TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'PENDING'
                                CHECK (status IN ('PENDING', 'APPROVED', 'REJECTED')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            -- user_low/user_high hold the pair in canonical order so one UNIQUE
            -- index covers both directions.
            CREATE TABLE friend_requests (
                id              TEXT PRIMARY KEY,
                from_user_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                to_user_id      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user_low        TEXT NOT NULL,
                user_high       TEXT NOT NULL,
                status          TEXT NOT NULL DEFAULT 'PENDING'
                                CHECK (status IN ('PENDING', 'ACCEPTED', 'REJECTED')),
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL,
                CHECK (from_user_id <> to_user_id),
                CHECK (user_low = min(from_user_id, to_user_id)
                   AND user_high = max(from_user_id, to_user_id)),
                UNIQUE(user_low, user_high)
            );

            CREATE INDEX idx_friend_requests_to
                ON friend_requests(to_user_id, status);

            -- Reference data
            INSERT OR IGNORE INTO games (id, name) VALUES
                ('00000000-0000-0000-0000-0000000000c1', 'Chess'),
                ('00000000-0000-0000-0000-0000000000c2', 'FIFA'),
                ('00000000-0000-0000-0000-0000000000c3', 'Pool'),
                ('00000000-0000-0000-0000-0000000000c4', 'Table Tennis'),
                ('00000000-0000-0000-0000-0000000000c5', 'Darts');

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

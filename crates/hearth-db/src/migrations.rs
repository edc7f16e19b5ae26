use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS profiles (
            id                TEXT PRIMARY KEY,
            name              TEXT NOT NULL UNIQUE,
            password          TEXT NOT NULL,
            is_child_account  INTEGER NOT NULL DEFAULT 0,
            created_at        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS family_memberships (
            profile_id              TEXT NOT NULL REFERENCES profiles(id),
            family_id               TEXT NOT NULL,
            role                    TEXT NOT NULL,
            status                  TEXT NOT NULL DEFAULT 'active',
            allow_parent_messaging  INTEGER NOT NULL DEFAULT 0,
            allow_family_chat       INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(profile_id, family_id)
        );

        CREATE INDEX IF NOT EXISTS idx_memberships_family
            ON family_memberships(family_id);

        CREATE TABLE IF NOT EXISTS message_threads (
            id             TEXT PRIMARY KEY,
            family_id      TEXT NOT NULL,
            kind           TEXT NOT NULL,
            participant_a  TEXT,
            participant_b  TEXT,
            name           TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Canonical direct-thread identity: participants are stored sorted,
        -- so one row per unordered pair per family.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_direct
            ON message_threads(family_id, participant_a, participant_b)
            WHERE kind = 'direct_message';

        -- Singleton family channel per family.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_threads_family_channel
            ON message_threads(family_id)
            WHERE kind = 'family_channel';

        CREATE TABLE IF NOT EXISTS group_chat_participants (
            thread_id   TEXT NOT NULL REFERENCES message_threads(id),
            profile_id  TEXT NOT NULL REFERENCES profiles(id),
            UNIQUE(thread_id, profile_id)
        );

        CREATE INDEX IF NOT EXISTS idx_group_participants_profile
            ON group_chat_participants(profile_id);

        CREATE TABLE IF NOT EXISTS thread_messages (
            seq          INTEGER PRIMARY KEY AUTOINCREMENT,
            id           TEXT NOT NULL UNIQUE,
            thread_id    TEXT NOT NULL REFERENCES message_threads(id),
            sender_id    TEXT NOT NULL REFERENCES profiles(id),
            sender_role  TEXT NOT NULL,
            content      TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_thread
            ON thread_messages(thread_id, created_at, seq);

        CREATE TABLE IF NOT EXISTS message_read_receipts (
            message_id  TEXT NOT NULL REFERENCES thread_messages(id),
            reader_id   TEXT NOT NULL REFERENCES profiles(id),
            read_at     TEXT NOT NULL,
            UNIQUE(message_id, reader_id)
        );

        CREATE INDEX IF NOT EXISTS idx_receipts_reader
            ON message_read_receipts(reader_id);

        CREATE TABLE IF NOT EXISTS typing_indicators (
            thread_id   TEXT NOT NULL,
            profile_id  TEXT NOT NULL,
            started_at  TEXT NOT NULL,
            UNIQUE(thread_id, profile_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

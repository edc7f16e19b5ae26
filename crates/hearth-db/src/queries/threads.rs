use crate::models::ThreadRow;
use crate::queries::OptionalExt;
use crate::time;
use crate::Database;
use anyhow::{anyhow, Result};

impl Database {
    /// Find-or-create the direct thread for an unordered participant pair.
    /// The pair is canonicalized by sorting, so (a, b) and (b, a) resolve to
    /// the same row. On a creation race the unique index rejects the loser's
    /// insert (OR IGNORE) and the follow-up select returns the winner's row.
    pub fn get_or_create_direct_thread(
        &self,
        id_candidate: &str,
        family_id: &str,
        a: &str,
        b: &str,
    ) -> Result<ThreadRow> {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_threads
                     (id, family_id, kind, participant_a, participant_b, created_at)
                 VALUES (?1, ?2, 'direct_message', ?3, ?4, ?5)",
                rusqlite::params![id_candidate, family_id, lo, hi, time::now_ts()],
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, family_id, kind, participant_a, participant_b, name, created_at
                 FROM message_threads
                 WHERE family_id = ?1 AND kind = 'direct_message'
                   AND participant_a = ?2 AND participant_b = ?3",
            )?;
            let row = stmt
                .query_row(rusqlite::params![family_id, lo, hi], map_thread)
                .optional()?;

            row.ok_or_else(|| anyhow!("direct thread vanished after insert"))
        })
    }

    /// Singleton family channel, find-or-create with the same detect-and-reuse
    /// recovery as direct threads.
    pub fn get_or_create_family_channel(
        &self,
        id_candidate: &str,
        family_id: &str,
    ) -> Result<ThreadRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO message_threads (id, family_id, kind, name, created_at)
                 VALUES (?1, ?2, 'family_channel', 'Family', ?3)",
                rusqlite::params![id_candidate, family_id, time::now_ts()],
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, family_id, kind, participant_a, participant_b, name, created_at
                 FROM message_threads
                 WHERE family_id = ?1 AND kind = 'family_channel'",
            )?;
            let row = stmt.query_row([family_id], map_thread).optional()?;

            row.ok_or_else(|| anyhow!("family channel vanished after insert"))
        })
    }

    /// Create a group chat and its participant rows in one transaction, so a
    /// thread without memberships can never be observed.
    pub fn create_group_chat(
        &self,
        id: &str,
        family_id: &str,
        name: &str,
        participant_ids: &[String],
    ) -> Result<ThreadRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO message_threads (id, family_id, kind, name, created_at)
                 VALUES (?1, ?2, 'group_chat', ?3, ?4)",
                rusqlite::params![id, family_id, name, time::now_ts()],
            )?;

            for pid in participant_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO group_chat_participants (thread_id, profile_id)
                     VALUES (?1, ?2)",
                    rusqlite::params![id, pid],
                )?;
            }

            let row = tx.query_row(
                "SELECT id, family_id, kind, participant_a, participant_b, name, created_at
                 FROM message_threads WHERE id = ?1",
                [id],
                map_thread,
            )?;

            tx.commit()?;
            Ok(row)
        })
    }

    pub fn get_thread(&self, id: &str) -> Result<Option<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, family_id, kind, participant_a, participant_b, name, created_at
                 FROM message_threads WHERE id = ?1",
            )?;
            Ok(stmt.query_row([id], map_thread).optional()?)
        })
    }

    /// Threads visible to a profile: direct threads by participant match,
    /// group chats by membership row, the family channel always.
    pub fn list_threads_for_user(&self, profile_id: &str, family_id: &str) -> Result<Vec<ThreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, family_id, kind, participant_a, participant_b, name, created_at
                 FROM message_threads t
                 WHERE t.family_id = ?1
                   AND (
                     t.kind = 'family_channel'
                     OR (t.kind = 'direct_message'
                         AND (t.participant_a = ?2 OR t.participant_b = ?2))
                     OR (t.kind = 'group_chat' AND EXISTS (
                         SELECT 1 FROM group_chat_participants g
                         WHERE g.thread_id = t.id AND g.profile_id = ?2))
                   )
                 ORDER BY t.created_at ASC",
            )?;
            let rows = stmt
                .query_map([family_id, profile_id], map_thread)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Whether a profile may read/write this thread. Direct threads check the
    /// embedded pair; group chats check the membership relation; the family
    /// channel checks for an active family membership.
    pub fn is_thread_participant(&self, thread: &ThreadRow, profile_id: &str) -> Result<bool> {
        match thread.kind.as_str() {
            "direct_message" => Ok(thread.participant_a.as_deref() == Some(profile_id)
                || thread.participant_b.as_deref() == Some(profile_id)),
            "group_chat" => self.with_conn(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM group_chat_participants
                     WHERE thread_id = ?1 AND profile_id = ?2",
                    rusqlite::params![thread.id, profile_id],
                    |row| row.get(0),
                )?;
                Ok(n > 0)
            }),
            "family_channel" => {
                Ok(self.membership_for(profile_id, &thread.family_id)?.is_some())
            }
            other => Err(anyhow!("unknown thread kind: {}", other)),
        }
    }

    /// Everyone who should be notified about a message in this thread,
    /// excluding the sender.
    pub fn thread_recipient_ids(&self, thread: &ThreadRow, exclude: &str) -> Result<Vec<String>> {
        let ids = match thread.kind.as_str() {
            "direct_message" => [&thread.participant_a, &thread.participant_b]
                .into_iter()
                .flatten()
                .cloned()
                .collect(),
            "group_chat" => self.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT profile_id FROM group_chat_participants WHERE thread_id = ?1",
                )?;
                let ids = stmt
                    .query_map([&thread.id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<String>, _>>()?;
                Ok(ids)
            })?,
            "family_channel" => self.family_member_ids(&thread.family_id)?,
            other => return Err(anyhow!("unknown thread kind: {}", other)),
        };

        Ok(ids.into_iter().filter(|id| id != exclude).collect())
    }
}

fn map_thread(row: &rusqlite::Row<'_>) -> std::result::Result<ThreadRow, rusqlite::Error> {
    Ok(ThreadRow {
        id: row.get(0)?,
        family_id: row.get(1)?,
        kind: row.get(2)?,
        participant_a: row.get(3)?,
        participant_b: row.get(4)?,
        name: row.get(5)?,
        created_at: row.get(6)?,
    })
}

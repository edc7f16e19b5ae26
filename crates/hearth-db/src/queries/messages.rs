use crate::models::{MessageRow, ThreadUnreadRow};
use crate::queries::OptionalExt;
use crate::Database;
use anyhow::Result;

impl Database {
    /// Append a message to a thread's log. The caller has already authorized
    /// the sender; this assigns the insertion sequence that breaks timestamp
    /// ties.
    pub fn insert_message(
        &self,
        id: &str,
        thread_id: &str,
        sender_id: &str,
        sender_role: &str,
        content: &str,
        created_at: &str,
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO thread_messages (id, thread_id, sender_id, sender_role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, thread_id, sender_id, sender_role, content, created_at],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.seq, m.id, m.thread_id, m.sender_id, p.name, m.sender_role,
                        m.content, m.created_at
                 FROM thread_messages m
                 JOIN profiles p ON p.id = m.sender_id
                 WHERE m.id = ?1",
            )?;
            Ok(stmt.query_row([id], map_message).optional()?)
        })
    }

    /// Full thread history, ascending by (created_at, seq). The log is
    /// append-only, so this order is the order messages were accepted.
    pub fn get_history(&self, thread_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.seq, m.id, m.thread_id, m.sender_id, p.name, m.sender_role,
                        m.content, m.created_at
                 FROM thread_messages m
                 JOIN profiles p ON p.id = m.sender_id
                 WHERE m.thread_id = ?1
                 ORDER BY m.created_at ASC, m.seq ASC",
            )?;
            let rows = stmt
                .query_map([thread_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Per-thread unread counts for a profile: messages from someone else
    /// with no receipt by this profile, restricted to threads the profile can
    /// access. Derived entirely from messages + receipts; there is no
    /// separate unread table to drift out of sync.
    pub fn unread_by_thread(&self, profile_id: &str, family_id: &str) -> Result<Vec<ThreadUnreadRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.kind, COUNT(m.seq), MAX(m.created_at)
                 FROM thread_messages m
                 JOIN message_threads t ON t.id = m.thread_id
                 WHERE t.family_id = ?1
                   AND m.sender_id != ?2
                   AND (
                     t.kind = 'family_channel'
                     OR (t.kind = 'direct_message'
                         AND (t.participant_a = ?2 OR t.participant_b = ?2))
                     OR (t.kind = 'group_chat' AND EXISTS (
                         SELECT 1 FROM group_chat_participants g
                         WHERE g.thread_id = t.id AND g.profile_id = ?2))
                   )
                   AND NOT EXISTS (
                     SELECT 1 FROM message_read_receipts r
                     WHERE r.message_id = m.id AND r.reader_id = ?2)
                 GROUP BY t.id, t.kind
                 ORDER BY MAX(m.created_at) DESC",
            )?;
            let rows = stmt
                .query_map([family_id, profile_id], |row| {
                    Ok(ThreadUnreadRow {
                        thread_id: row.get(0)?,
                        kind: row.get(1)?,
                        count: row.get::<_, i64>(2)? as u64,
                        last_message_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_message(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        thread_id: row.get(2)?,
        sender_id: row.get(3)?,
        sender_name: row.get(4)?,
        sender_role: row.get(5)?,
        content: row.get(6)?,
        created_at: row.get(7)?,
    })
}

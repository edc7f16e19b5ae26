use crate::models::TypingRow;
use crate::queries::OptionalExt;
use crate::time;
use crate::Database;
use anyhow::Result;
use chrono::{Duration, Utc};

/// Writes more frequent than this are dropped; keystroke handlers call
/// set_typing freely and the store absorbs the chatter.
const THROTTLE_SECS: i64 = 1;

/// Read-time staleness window. An indicator older than this is treated as
/// gone even if its owner crashed before cleaning up.
const STALE_AFTER_SECS: i64 = 5;

impl Database {
    /// Refresh the typing indicator for (thread, profile). Returns true when
    /// a write happened; false means the existing row is fresh enough and the
    /// caller should skip fan-out too.
    pub fn set_typing(&self, thread_id: &str, profile_id: &str) -> Result<bool> {
        let now = Utc::now();
        let throttle_floor = time::format_ts(now - Duration::seconds(THROTTLE_SECS));

        self.with_conn_mut(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT started_at FROM typing_indicators
                     WHERE thread_id = ?1 AND profile_id = ?2",
                    [thread_id, profile_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(started_at) = existing {
                if started_at >= throttle_floor {
                    return Ok(false);
                }
            }

            conn.execute(
                "INSERT INTO typing_indicators (thread_id, profile_id, started_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id, profile_id) DO UPDATE SET
                     started_at = excluded.started_at",
                rusqlite::params![thread_id, profile_id, time::format_ts(now)],
            )?;
            Ok(true)
        })
    }

    /// Explicit delete, called on send, blur, or unmount. Returns true when a
    /// row was removed.
    pub fn clear_typing(&self, thread_id: &str, profile_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "DELETE FROM typing_indicators WHERE thread_id = ?1 AND profile_id = ?2",
                [thread_id, profile_id],
            )?;
            Ok(n > 0)
        })
    }

    /// Live typers in a thread, excluding the requester. The staleness filter
    /// is applied at read time, so a crashed client's indicator disappears
    /// for everyone else without any cleanup write.
    pub fn list_typing(&self, thread_id: &str, exclude_profile_id: &str) -> Result<Vec<TypingRow>> {
        let cutoff = time::format_ts(Utc::now() - Duration::seconds(STALE_AFTER_SECS));

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT i.thread_id, i.profile_id, p.name, i.started_at
                 FROM typing_indicators i
                 JOIN profiles p ON p.id = i.profile_id
                 WHERE i.thread_id = ?1 AND i.profile_id != ?2 AND i.started_at > ?3
                 ORDER BY i.started_at ASC",
            )?;
            let rows = stmt
                .query_map([thread_id, exclude_profile_id, cutoff.as_str()], |row| {
                    Ok(TypingRow {
                        thread_id: row.get(0)?,
                        profile_id: row.get(1)?,
                        name: row.get(2)?,
                        started_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

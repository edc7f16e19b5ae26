use crate::models::ReceiptRow;
use crate::Database;
use anyhow::Result;

impl Database {
    /// Idempotent receipt upsert keyed by (message_id, reader_id). A sender
    /// never receipts their own message — the guard is in the insert itself
    /// so concurrent callers cannot slip past it. Returns true only when a
    /// row was actually created, so fan-out fires once.
    pub fn insert_receipt(&self, message_id: &str, reader_id: &str, read_at: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO message_read_receipts (message_id, reader_id, read_at)
                 SELECT ?1, ?2, ?3
                 WHERE EXISTS (
                     SELECT 1 FROM thread_messages m
                     WHERE m.id = ?1 AND m.sender_id != ?2)",
                rusqlite::params![message_id, reader_id, read_at],
            )?;
            Ok(n > 0)
        })
    }

    /// Batch-fetch receipts for a set of message IDs.
    pub fn receipts_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReceiptRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT r.message_id, r.reader_id, p.name, r.read_at
                 FROM message_read_receipts r
                 JOIN profiles p ON p.id = r.reader_id
                 WHERE r.message_id IN ({})
                 ORDER BY r.read_at ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ReceiptRow {
                        message_id: row.get(0)?,
                        reader_id: row.get(1)?,
                        reader_name: row.get(2)?,
                        read_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

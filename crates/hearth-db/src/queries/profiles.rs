use crate::models::ProfileRow;
use crate::queries::OptionalExt;
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    pub fn create_profile(
        &self,
        id: &str,
        name: &str,
        password_hash: &str,
        is_child_account: bool,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO profiles (id, name, password, is_child_account) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, name, password_hash, is_child_account],
            )?;
            Ok(())
        })
    }

    pub fn get_profile_by_name(&self, name: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "name", name))
    }

    pub fn get_profile_by_id(&self, id: &str) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, "id", id))
    }
}

fn query_profile(conn: &Connection, column: &str, value: &str) -> Result<Option<ProfileRow>> {
    let sql = format!(
        "SELECT id, name, password, is_child_account, created_at FROM profiles WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(ProfileRow {
                id: row.get(0)?,
                name: row.get(1)?,
                password: row.get(2)?,
                is_child_account: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

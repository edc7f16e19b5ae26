use crate::models::MembershipRow;
use crate::queries::OptionalExt;
use crate::Database;
use anyhow::Result;

impl Database {
    /// Create or update a membership row. Flags only matter for child
    /// accounts but are stored unconditionally.
    pub fn upsert_membership(
        &self,
        profile_id: &str,
        family_id: &str,
        role: &str,
        allow_parent_messaging: bool,
        allow_family_chat: bool,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO family_memberships
                     (profile_id, family_id, role, status, allow_parent_messaging, allow_family_chat)
                 VALUES (?1, ?2, ?3, 'active', ?4, ?5)
                 ON CONFLICT(profile_id, family_id) DO UPDATE SET
                     role = excluded.role,
                     status = 'active',
                     allow_parent_messaging = excluded.allow_parent_messaging,
                     allow_family_chat = excluded.allow_family_chat",
                rusqlite::params![profile_id, family_id, role, allow_parent_messaging, allow_family_chat],
            )?;
            Ok(())
        })
    }

    /// Active membership for a profile in a family, or None. Resolved per
    /// request — roles switch immediately when the active family changes.
    pub fn membership_for(&self, profile_id: &str, family_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.profile_id, m.family_id, m.role, m.status,
                        m.allow_parent_messaging, m.allow_family_chat, p.is_child_account
                 FROM family_memberships m
                 JOIN profiles p ON p.id = m.profile_id
                 WHERE m.profile_id = ?1 AND m.family_id = ?2 AND m.status = 'active'",
            )?;

            let row = stmt
                .query_row([profile_id, family_id], |row| {
                    Ok(MembershipRow {
                        profile_id: row.get(0)?,
                        family_id: row.get(1)?,
                        role: row.get(2)?,
                        status: row.get(3)?,
                        allow_parent_messaging: row.get(4)?,
                        allow_family_chat: row.get(5)?,
                        is_child_account: row.get(6)?,
                    })
                })
                .optional()?;

            Ok(row)
        })
    }

    /// Ids of all active members of a family.
    pub fn family_member_ids(&self, family_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT profile_id FROM family_memberships
                 WHERE family_id = ?1 AND status = 'active'",
            )?;
            let ids = stmt
                .query_map([family_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

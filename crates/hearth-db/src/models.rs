/// Database row types — these map directly to SQLite rows.
/// Distinct from hearth-types API models to keep the DB layer independent.

pub struct ProfileRow {
    pub id: String,
    pub name: String,
    pub password: String,
    pub is_child_account: bool,
    pub created_at: String,
}

pub struct MembershipRow {
    pub profile_id: String,
    pub family_id: String,
    pub role: String,
    pub status: String,
    pub allow_parent_messaging: bool,
    pub allow_family_chat: bool,
    /// Joined from profiles — account type is a profile property, not a
    /// membership property.
    pub is_child_account: bool,
}

pub struct ThreadRow {
    pub id: String,
    pub family_id: String,
    pub kind: String,
    pub participant_a: Option<String>,
    pub participant_b: Option<String>,
    pub name: Option<String>,
    pub created_at: String,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: String,
    pub content: String,
    pub created_at: String,
}

pub struct ReceiptRow {
    pub message_id: String,
    pub reader_id: String,
    pub reader_name: String,
    pub read_at: String,
}

pub struct TypingRow {
    pub thread_id: String,
    pub profile_id: String,
    pub name: String,
    pub started_at: String,
}

pub struct ThreadUnreadRow {
    pub thread_id: String,
    pub kind: String,
    pub count: u64,
    pub last_message_at: String,
}

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Role, ThreadKind};
use crate::permissions::ChildPermissionFlags;

// -- JWT Claims --

/// JWT claims shared between hearth-api (REST middleware) and hearth-gateway
/// (WebSocket authentication). Canonical definition lives here in hearth-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub is_child_account: bool,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub profile_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub profile_id: Uuid,
    pub name: String,
    pub token: String,
}

// -- Membership --

#[derive(Debug, Serialize)]
pub struct CreateFamilyResponse {
    pub family_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub profile_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub allow_parent_messaging: bool,
    #[serde(default)]
    pub allow_family_chat: bool,
}

#[derive(Debug, Serialize)]
pub struct MembershipResponse {
    pub profile_id: Uuid,
    pub family_id: Uuid,
    pub role: Role,
    pub is_child_account: bool,
    pub child_flags: ChildPermissionFlags,
}

// -- Threads --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenDirectThreadRequest {
    pub other_profile_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupChatRequest {
    pub name: String,
    pub participant_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadResponse {
    pub id: Uuid,
    pub family_id: Uuid,
    pub kind: ThreadKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_a: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub participant_b: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_role: Role,
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub read_by: Vec<ReceiptEntry>,
}

// -- Read receipts --

#[derive(Debug, Clone, Serialize)]
pub struct ReceiptEntry {
    pub reader_id: Uuid,
    pub reader_name: String,
    pub read_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    /// False when the receipt already existed (repeat call, no-op) or the
    /// reader is the sender.
    pub created: bool,
}

// -- Unread --

#[derive(Debug, Serialize)]
pub struct UnreadSummary {
    pub total: u64,
    pub threads: Vec<ThreadUnread>,
    pub by_kind: Vec<KindUnread>,
}

#[derive(Debug, Serialize)]
pub struct ThreadUnread {
    pub thread_id: Uuid,
    pub kind: ThreadKind,
    pub count: u64,
    pub last_message_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct KindUnread {
    pub kind: ThreadKind,
    pub count: u64,
}

// -- Typing --

#[derive(Debug, Clone, Serialize)]
pub struct TypingEntry {
    pub profile_id: Uuid,
    pub name: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct TypingStateResponse {
    pub entries: Vec<TypingEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub banner: Option<String>,
}

/// Banner text for the people currently typing in a thread.
pub fn typing_banner(names: &[String]) -> Option<String> {
    match names {
        [] => None,
        [one] => Some(format!("{} is typing…", one)),
        [one, two] => Some(format!("{} and {} are typing…", one, two)),
        many => Some(format!("{} people are typing…", many.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::typing_banner;

    #[test]
    fn banner_formats_by_count() {
        assert_eq!(typing_banner(&[]), None);
        assert_eq!(
            typing_banner(&["Ana".into()]),
            Some("Ana is typing…".into())
        );
        assert_eq!(
            typing_banner(&["Ana".into(), "Ben".into()]),
            Some("Ana and Ben are typing…".into())
        );
        assert_eq!(
            typing_banner(&["Ana".into(), "Ben".into(), "Cleo".into()]),
            Some("3 people are typing…".into())
        );
    }
}

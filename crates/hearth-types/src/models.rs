use serde::{Deserialize, Serialize};

/// Role a profile holds inside one family. Per-membership, not global —
/// the same profile can be a parent in one family and a third party in another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Guardian,
    ThirdParty,
    Child,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Guardian => "guardian",
            Role::ThirdParty => "third_party",
            Role::Child => "child",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "parent" => Some(Role::Parent),
            "guardian" => Some(Role::Guardian),
            "third_party" => Some(Role::ThirdParty),
            "child" => Some(Role::Child),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadKind {
    DirectMessage,
    GroupChat,
    FamilyChannel,
}

impl ThreadKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::DirectMessage => "direct_message",
            ThreadKind::GroupChat => "group_chat",
            ThreadKind::FamilyChannel => "family_channel",
        }
    }

    pub fn parse(s: &str) -> Option<ThreadKind> {
        match s {
            "direct_message" => Some(ThreadKind::DirectMessage),
            "group_chat" => Some(ThreadKind::GroupChat),
            "family_channel" => Some(ThreadKind::FamilyChannel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Active,
    Inactive,
}

impl MembershipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Active => "active",
            MembershipStatus::Inactive => "inactive",
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::models::{Role, ThreadKind};

/// Per-child messaging switches set by a parent on the membership row.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ChildPermissionFlags {
    pub allow_parent_messaging: bool,
    pub allow_family_chat: bool,
}

/// Capability set derived from role x account type x child flags.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PermissionFlags {
    pub can_send_messages: bool,
    pub can_mutate_other_domains: bool,
}

/// Actions outside messaging that the gate still has to answer for, so the
/// caller can render inline feedback instead of handling an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestrictedAction {
    SendMessage,
    CreateExpense,
    UploadDocument,
    EditCalendar,
}

/// Outcome of a restricted-action check. Returned, never thrown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    pub fn allow() -> Self {
        Decision { allowed: true, reason: None }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Decision { allowed: false, reason: Some(reason.into()) }
    }
}

/// Decision table:
///
/// | condition                       | send | mutate other domains |
/// |---------------------------------|------|----------------------|
/// | parent/guardian, adult account  | yes  | yes                  |
/// | third_party                     | yes  | no                   |
/// | child account                   | flag | no                   |
pub fn derive(role: Role, is_child_account: bool, child_flags: ChildPermissionFlags) -> PermissionFlags {
    if is_child_account || role == Role::Child {
        return PermissionFlags {
            can_send_messages: child_flags.allow_parent_messaging || child_flags.allow_family_chat,
            can_mutate_other_domains: false,
        };
    }

    match role {
        Role::Parent | Role::Guardian => PermissionFlags {
            can_send_messages: true,
            can_mutate_other_domains: true,
        },
        Role::ThirdParty => PermissionFlags {
            can_send_messages: true,
            can_mutate_other_domains: false,
        },
        // Child role on an adult account still gets the restricted set.
        Role::Child => PermissionFlags {
            can_send_messages: child_flags.allow_parent_messaging || child_flags.allow_family_chat,
            can_mutate_other_domains: false,
        },
    }
}

impl PermissionFlags {
    pub fn check(&self, action: RestrictedAction) -> Decision {
        match action {
            RestrictedAction::SendMessage => {
                if self.can_send_messages {
                    Decision::allow()
                } else {
                    Decision::deny("messaging is not enabled for this account")
                }
            }
            RestrictedAction::CreateExpense
            | RestrictedAction::UploadDocument
            | RestrictedAction::EditCalendar => {
                if self.can_mutate_other_domains {
                    Decision::allow()
                } else {
                    Decision::deny("this account cannot modify family records")
                }
            }
        }
    }
}

/// Thread-kind gating on top of the base capability: a child account needs
/// allow_parent_messaging for direct messages, and allow_family_chat for the
/// family channel and group chats.
pub fn can_send_in(
    role: Role,
    is_child_account: bool,
    child_flags: ChildPermissionFlags,
    kind: ThreadKind,
) -> Decision {
    let flags = derive(role, is_child_account, child_flags);
    let base = flags.check(RestrictedAction::SendMessage);
    if !base.allowed {
        return base;
    }

    if is_child_account || role == Role::Child {
        let ok = match kind {
            ThreadKind::DirectMessage => child_flags.allow_parent_messaging,
            ThreadKind::FamilyChannel | ThreadKind::GroupChat => child_flags.allow_family_chat,
        };
        if !ok {
            return Decision::deny("a parent has not enabled this chat for your account");
        }
    }

    Decision::allow()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_has_full_capability() {
        let flags = derive(Role::Parent, false, ChildPermissionFlags::default());
        assert!(flags.can_send_messages);
        assert!(flags.can_mutate_other_domains);
        assert!(flags.check(RestrictedAction::CreateExpense).allowed);
    }

    #[test]
    fn third_party_cannot_mutate_other_domains() {
        let flags = derive(Role::ThirdParty, false, ChildPermissionFlags::default());
        assert!(flags.can_send_messages);
        let decision = flags.check(RestrictedAction::CreateExpense);
        assert!(!decision.allowed);
        assert!(decision.reason.is_some());
    }

    #[test]
    fn child_account_messaging_follows_flags() {
        let none = derive(Role::Child, true, ChildPermissionFlags::default());
        assert!(!none.can_send_messages);

        let dm_only = derive(
            Role::Child,
            true,
            ChildPermissionFlags { allow_parent_messaging: true, allow_family_chat: false },
        );
        assert!(dm_only.can_send_messages);
        assert!(!dm_only.can_mutate_other_domains);
    }

    #[test]
    fn child_thread_gating_distinguishes_kinds() {
        let flags = ChildPermissionFlags { allow_parent_messaging: true, allow_family_chat: false };

        assert!(can_send_in(Role::Child, true, flags, ThreadKind::DirectMessage).allowed);
        assert!(!can_send_in(Role::Child, true, flags, ThreadKind::FamilyChannel).allowed);
        assert!(!can_send_in(Role::Child, true, flags, ThreadKind::GroupChat).allowed);
    }

    #[test]
    fn guardian_on_child_account_is_still_restricted() {
        let flags = derive(Role::Guardian, true, ChildPermissionFlags::default());
        assert!(!flags.can_mutate_other_domains);
    }
}

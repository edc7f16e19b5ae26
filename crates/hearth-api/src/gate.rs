use uuid::Uuid;

use hearth_db::models::ThreadRow;
use hearth_db::Database;
use hearth_types::error::CoreError;
use hearth_types::models::{Role, ThreadKind};
use hearth_types::permissions;

use crate::membership::resolve_role;
use crate::threads::load_authorized_thread;

/// Blocking write gate shared by message sends and typing indicators: the
/// caller must be a participant of the thread and pass the permission check
/// for its kind. Anything that publishes into a thread goes through here.
pub fn ensure_send_allowed(
    db: &Database,
    thread_id: Uuid,
    profile_id: Uuid,
) -> Result<(ThreadRow, Role), CoreError> {
    let thread = load_authorized_thread(db, thread_id, profile_id)?;

    let family_id: Uuid = thread
        .family_id
        .parse()
        .map_err(|_| CoreError::Transient(format!("corrupt family_id on thread {}", thread.id)))?;
    let caller = resolve_role(db, profile_id, family_id)?;

    let kind = ThreadKind::parse(&thread.kind)
        .ok_or_else(|| CoreError::Transient(format!("corrupt kind on thread {}", thread.id)))?;
    let decision =
        permissions::can_send_in(caller.role, caller.is_child_account, caller.child_flags, kind);
    if !decision.allowed {
        return Err(CoreError::Authorization(
            decision.reason.unwrap_or_else(|| "sending is not allowed".into()),
        ));
    }

    Ok((thread, caller.role))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid() -> Uuid {
        Uuid::new_v4()
    }

    fn member(
        db: &Database,
        family: Uuid,
        role: &str,
        is_child: bool,
        allow_parent_messaging: bool,
        allow_family_chat: bool,
    ) -> Uuid {
        let id = uid();
        db.create_profile(&id.to_string(), &format!("p-{}", id), "hash", is_child)
            .unwrap();
        db.upsert_membership(
            &id.to_string(),
            &family.to_string(),
            role,
            allow_parent_messaging,
            allow_family_chat,
        )
        .unwrap();
        id
    }

    #[test]
    fn child_without_family_chat_cannot_publish_in_the_family_channel() {
        let db = Database::open_in_memory().unwrap();
        let family = uid();
        let _parent = member(&db, family, "parent", false, false, false);
        let muted_child = member(&db, family, "child", true, false, false);

        let chan = db
            .get_or_create_family_channel(&uid().to_string(), &family.to_string())
            .unwrap();
        let chan_id: Uuid = chan.id.parse().unwrap();

        // Typing indicators share this gate with sends, so the muted child
        // can neither post nor appear as typing there.
        let denied = ensure_send_allowed(&db, chan_id, muted_child);
        assert!(matches!(denied, Err(CoreError::Authorization(_))));
    }

    #[test]
    fn direct_messages_follow_the_parent_messaging_flag() {
        let db = Database::open_in_memory().unwrap();
        let family = uid();
        let parent = member(&db, family, "parent", false, false, false);
        let child = member(&db, family, "child", true, true, false);

        let dm = db
            .get_or_create_direct_thread(
                &uid().to_string(),
                &family.to_string(),
                &child.to_string(),
                &parent.to_string(),
            )
            .unwrap();
        let dm_id: Uuid = dm.id.parse().unwrap();
        assert!(ensure_send_allowed(&db, dm_id, child).is_ok());

        let chan = db
            .get_or_create_family_channel(&uid().to_string(), &family.to_string())
            .unwrap();
        let chan_id: Uuid = chan.id.parse().unwrap();
        assert!(matches!(
            ensure_send_allowed(&db, chan_id, child),
            Err(CoreError::Authorization(_))
        ));
    }

    #[test]
    fn non_participants_are_rejected_before_permissions() {
        let db = Database::open_in_memory().unwrap();
        let family_a = uid();
        let family_b = uid();
        let _member_a = member(&db, family_a, "parent", false, false, false);
        let member_b = member(&db, family_b, "parent", false, false, false);

        let chan_a = db
            .get_or_create_family_channel(&uid().to_string(), &family_a.to_string())
            .unwrap();
        let chan_a_id: Uuid = chan_a.id.parse().unwrap();

        assert!(matches!(
            ensure_send_allowed(&db, chan_a_id, member_b),
            Err(CoreError::Authorization(_))
        ));
    }
}

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use hearth_db::models::ThreadRow;
use hearth_db::{time, Database};
use hearth_types::api::{CreateGroupChatRequest, OpenDirectThreadRequest, ThreadResponse};
use hearth_types::error::CoreError;
use hearth_types::models::ThreadKind;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::membership::{resolve_role, ResolvedMembership};
use crate::middleware::Claims;

/// POST /families/{family_id}/threads/direct — find-or-create the direct
/// thread between the caller and another family member. Canonical identity:
/// (a, b) and (b, a) resolve to the same thread; a concurrent create loses
/// the insert race and reuses the winner's row.
pub async fn open_direct_thread(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<OpenDirectThreadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.other_profile_id == claims.sub {
        return Err(CoreError::Validation("cannot open a direct thread with yourself".into()).into());
    }

    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || {
        // Server-side re-validation: both ends must hold active memberships.
        // The client-asserted participant is never trusted for authorization.
        resolve_role(&db, claims.sub, family_id)?;
        resolve_role(&db, req.other_profile_id, family_id).map_err(|_| {
            CoreError::Validation("the other participant is not an active family member".into())
        })?;

        db.get_or_create_direct_thread(
            &Uuid::new_v4().to_string(),
            &family_id.to_string(),
            &claims.sub.to_string(),
            &req.other_profile_id.to_string(),
        )
        .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    Ok((StatusCode::OK, Json(thread_response(row))))
}

/// POST /families/{family_id}/threads/family-channel — singleton broadcast
/// thread for the family, lazily created on first resolution.
pub async fn open_family_channel(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || {
        resolve_role(&db, claims.sub, family_id)?;
        db.get_or_create_family_channel(&Uuid::new_v4().to_string(), &family_id.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    Ok((StatusCode::OK, Json(thread_response(row))))
}

/// POST /families/{family_id}/threads/group — creates the thread row plus one
/// membership row per participant in a single transaction. The caller is
/// always included as a participant.
pub async fn create_group_chat(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(CoreError::Validation("group chat needs a name".into()).into());
    }

    let db = state.db.clone();
    let row = tokio::task::spawn_blocking(move || {
        let caller = resolve_role(&db, claims.sub, family_id)?;
        ensure_group_create_allowed(&caller)?;

        // Deduplicate and re-validate every participant server-side.
        let mut ids: Vec<Uuid> = req.participant_ids.clone();
        ids.push(claims.sub);
        ids.sort();
        ids.dedup();

        for id in &ids {
            resolve_role(&db, *id, family_id).map_err(|_| {
                CoreError::Validation(format!("{} is not an active family member", id))
            })?;
        }

        let participant_ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        db.create_group_chat(
            &Uuid::new_v4().to_string(),
            &family_id.to_string(),
            req.name.trim(),
            &participant_ids,
        )
        .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    Ok((StatusCode::CREATED, Json(thread_response(row))))
}

/// GET /families/{family_id}/threads — direct threads by participant match,
/// group chats by membership, the family channel always.
pub async fn list_threads(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || {
        resolve_role(&db, claims.sub, family_id)?;
        db.list_threads_for_user(&claims.sub.to_string(), &family_id.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    let threads: Vec<ThreadResponse> = rows.into_iter().map(thread_response).collect();
    Ok(Json(threads))
}

/// Creating a group chat requires the same permission as sending in one: a
/// caller who could not post to the resulting thread cannot create it either.
fn ensure_group_create_allowed(caller: &ResolvedMembership) -> Result<(), CoreError> {
    let decision = hearth_types::permissions::can_send_in(
        caller.role,
        caller.is_child_account,
        caller.child_flags,
        ThreadKind::GroupChat,
    );
    if !decision.allowed {
        return Err(CoreError::Authorization(
            decision.reason.unwrap_or_else(|| "group chats are not allowed".into()),
        ));
    }
    Ok(())
}

/// Shared blocking helper: load a thread and check the caller may access it.
pub fn load_authorized_thread(
    db: &Database,
    thread_id: Uuid,
    profile_id: Uuid,
) -> Result<ThreadRow, CoreError> {
    let thread = db
        .get_thread(&thread_id.to_string())
        .map_err(|e| CoreError::Transient(e.to_string()))?
        .ok_or_else(|| CoreError::NotFound(format!("thread {}", thread_id)))?;

    let ok = db
        .is_thread_participant(&thread, &profile_id.to_string())
        .map_err(|e| CoreError::Transient(e.to_string()))?;
    if !ok {
        return Err(CoreError::Authorization(
            "not a participant of this thread".into(),
        ));
    }

    Ok(thread)
}

pub(crate) fn thread_response(row: ThreadRow) -> ThreadResponse {
    ThreadResponse {
        id: parse_uuid(&row.id, "thread id"),
        family_id: parse_uuid(&row.family_id, "family_id"),
        kind: ThreadKind::parse(&row.kind).unwrap_or_else(|| {
            warn!("Corrupt thread kind '{}' on thread '{}'", row.kind, row.id);
            ThreadKind::GroupChat
        }),
        participant_a: row.participant_a.as_deref().map(|s| parse_uuid(s, "participant_a")),
        participant_b: row.participant_b.as_deref().map(|s| parse_uuid(s, "participant_b")),
        name: row.name,
        created_at: parse_created_at(&row.created_at, &row.id),
    }
}

pub(crate) fn parse_uuid(s: &str, what: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, s, e);
        Uuid::default()
    })
}

pub(crate) fn parse_created_at(s: &str, row_id: &str) -> chrono::DateTime<chrono::Utc> {
    time::parse_ts(s).unwrap_or_else(|e| {
        warn!("Corrupt created_at '{}' on row '{}': {}", s, row_id, e);
        chrono::DateTime::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_types::models::Role;
    use hearth_types::permissions::ChildPermissionFlags;

    fn child(allow_parent_messaging: bool, allow_family_chat: bool) -> ResolvedMembership {
        ResolvedMembership {
            profile_id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            role: Role::Child,
            is_child_account: true,
            child_flags: ChildPermissionFlags {
                allow_parent_messaging,
                allow_family_chat,
            },
        }
    }

    #[test]
    fn group_creation_needs_the_group_send_permission() {
        // allow_parent_messaging covers direct messages only; a child with
        // just that flag cannot create a group chat they could not post in.
        assert!(ensure_group_create_allowed(&child(true, false)).is_err());
        assert!(ensure_group_create_allowed(&child(false, true)).is_ok());

        let parent = ResolvedMembership {
            profile_id: Uuid::new_v4(),
            family_id: Uuid::new_v4(),
            role: Role::Parent,
            is_child_account: false,
            child_flags: ChildPermissionFlags::default(),
        };
        assert!(ensure_group_create_allowed(&parent).is_ok());
    }
}

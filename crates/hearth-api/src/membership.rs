use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use axum::http::StatusCode;

use hearth_db::Database;
use hearth_types::api::{AddMemberRequest, CreateFamilyResponse, MembershipResponse};
use hearth_types::error::CoreError;
use hearth_types::models::Role;
use hearth_types::permissions::{self, ChildPermissionFlags};

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::middleware::Claims;

/// A membership resolved against the active family: the identity everything
/// downstream keys permissions off. Never cached across family switches —
/// each request resolves it fresh.
#[derive(Debug, Clone)]
pub struct ResolvedMembership {
    pub profile_id: Uuid,
    pub family_id: Uuid,
    pub role: Role,
    pub is_child_account: bool,
    pub child_flags: ChildPermissionFlags,
}

/// Blocking resolver shared by every handler that needs a role. NotFound when
/// the profile has no active membership in the family.
pub fn resolve_role(
    db: &Database,
    profile_id: Uuid,
    family_id: Uuid,
) -> Result<ResolvedMembership, CoreError> {
    let row = db
        .membership_for(&profile_id.to_string(), &family_id.to_string())
        .map_err(|e| CoreError::Transient(e.to_string()))?
        .ok_or_else(|| {
            CoreError::NotFound(format!("no active membership for {} in {}", profile_id, family_id))
        })?;

    let role = Role::parse(&row.role)
        .ok_or_else(|| CoreError::Transient(format!("corrupt role '{}' on membership", row.role)))?;

    Ok(ResolvedMembership {
        profile_id,
        family_id,
        role,
        is_child_account: row.is_child_account,
        child_flags: ChildPermissionFlags {
            allow_parent_messaging: row.allow_parent_messaging,
            allow_family_chat: row.allow_family_chat,
        },
    })
}

/// POST /families — start a new family with the caller as its first parent.
pub async fn create_family(
    State(state): State<Arc<AppStateInner>>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let family_id = Uuid::new_v4();
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || {
        db.upsert_membership(
            &claims.sub.to_string(),
            &family_id.to_string(),
            Role::Parent.as_str(),
            false,
            false,
        )
        .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    Ok((StatusCode::CREATED, Json(CreateFamilyResponse { family_id })))
}

/// POST /families/{family_id}/members — add or update a member. Restricted
/// to roles that can mutate family records (parents and guardians).
pub async fn add_member(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    tokio::task::spawn_blocking(move || {
        let caller = resolve_role(&db, claims.sub, family_id)?;
        let flags = permissions::derive(caller.role, caller.is_child_account, caller.child_flags);
        if !flags.can_mutate_other_domains {
            return Err(CoreError::Authorization(
                "only parents and guardians can manage members".into(),
            ));
        }

        if db
            .get_profile_by_id(&req.profile_id.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .is_none()
        {
            return Err(CoreError::NotFound(format!("profile {}", req.profile_id)));
        }

        db.upsert_membership(
            &req.profile_id.to_string(),
            &family_id.to_string(),
            req.role.as_str(),
            req.allow_parent_messaging,
            req.allow_family_chat,
        )
        .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /families/{family_id}/membership — the caller's own role and flags.
pub async fn get_membership(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let resolved = tokio::task::spawn_blocking(move || resolve_role(&db, claims.sub, family_id))
        .await??;

    Ok(Json(MembershipResponse {
        profile_id: resolved.profile_id,
        family_id: resolved.family_id,
        role: resolved.role,
        is_child_account: resolved.is_child_account,
        child_flags: resolved.child_flags,
    }))
}

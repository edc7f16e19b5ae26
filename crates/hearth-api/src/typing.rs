use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use hearth_types::api::{typing_banner, TypingEntry, TypingStateResponse};
use hearth_types::error::CoreError;
use hearth_types::events::GatewayEvent;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::gate;
use crate::middleware::Claims;
use crate::threads::{load_authorized_thread, parse_created_at, parse_uuid};

/// GET /threads/{thread_id}/typing — live typers excluding the requester.
/// The staleness window is applied at read time, so this is also the poll
/// fallback that keeps typing state eventually consistent when the realtime
/// connection lapses.
pub async fn list_typing(
    State(state): State<Arc<AppStateInner>>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let rows = tokio::task::spawn_blocking(move || {
        let thread = load_authorized_thread(&db, thread_id, claims.sub)?;
        db.list_typing(&thread.id, &claims.sub.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    let entries: Vec<TypingEntry> = rows
        .into_iter()
        .map(|r| TypingEntry {
            profile_id: parse_uuid(&r.profile_id, "profile_id"),
            name: r.name,
            started_at: parse_created_at(&r.started_at, &r.thread_id),
        })
        .collect();

    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    let banner = typing_banner(&names);

    Ok(Json(TypingStateResponse { entries, banner }))
}

/// POST /threads/{thread_id}/typing — REST mirror of the gateway StartTyping
/// command. Gated like a message send (a caller who cannot post cannot
/// appear as typing), then throttled to one write per second in the store.
pub async fn set_typing(
    State(state): State<Arc<AppStateInner>>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let wrote = tokio::task::spawn_blocking(move || {
        let (thread, _role) = gate::ensure_send_allowed(&db, thread_id, claims.sub)?;
        db.set_typing(&thread.id, &claims.sub.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    if wrote {
        state.dispatcher.broadcast(GatewayEvent::TypingStart {
            thread_id,
            profile_id: claims.sub,
            name: claims.name.clone(),
        });
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /threads/{thread_id}/typing — explicit clear on send, blur, or
/// unmount.
pub async fn clear_typing(
    State(state): State<Arc<AppStateInner>>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let removed = tokio::task::spawn_blocking(move || {
        let thread = load_authorized_thread(&db, thread_id, claims.sub)?;
        db.clear_typing(&thread.id, &claims.sub.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    if removed {
        state.dispatcher.broadcast(GatewayEvent::TypingStop {
            thread_id,
            profile_id: claims.sub,
        });
    }

    Ok(StatusCode::NO_CONTENT)
}

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use hearth_db::time;
use hearth_types::api::MarkReadResponse;
use hearth_types::error::CoreError;
use hearth_types::events::GatewayEvent;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::middleware::Claims;
use crate::threads::{load_authorized_thread, parse_created_at, parse_uuid};

/// POST /messages/{message_id}/read — idempotent acknowledgment keyed by
/// (message, reader). Repeat calls are no-ops; the sender's own messages
/// never produce a receipt. Fan-out fires only on the first read.
pub async fn mark_read(
    State(state): State<Arc<AppStateInner>>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let read_at = time::now_ts();
    let read_at_db = read_at.clone();

    let (created, thread_id) = tokio::task::spawn_blocking(move || {
        let message = db
            .get_message(&message_id.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .ok_or_else(|| CoreError::NotFound(format!("message {}", message_id)))?;

        let thread_id: Uuid = message
            .thread_id
            .parse()
            .map_err(|_| CoreError::Transient(format!("corrupt thread_id on message {}", message.id)))?;

        // Readers must be participants of the thread the message lives in.
        load_authorized_thread(&db, thread_id, claims.sub)?;

        let created = db
            .insert_receipt(&message.id, &claims.sub.to_string(), &read_at_db)
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        Ok::<_, CoreError>((created, thread_id))
    })
    .await??;

    if created {
        state.dispatcher.broadcast(GatewayEvent::ReceiptCreate {
            message_id,
            thread_id,
            reader_id: claims.sub,
            reader_name: claims.name.clone(),
            read_at: parse_created_at(&read_at, &message_id.to_string()),
        });
    }

    Ok(Json(MarkReadResponse { created }))
}

/// GET /threads/{thread_id}/receipts — batch fetch: every receipt for every
/// message in the thread, flat, for clients rebuilding state after reconnect.
pub async fn thread_receipts(
    State(state): State<Arc<AppStateInner>>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let rows = tokio::task::spawn_blocking(move || {
        let thread = load_authorized_thread(&db, thread_id, claims.sub)?;

        let message_ids: Vec<String> = db
            .get_history(&thread.id)
            .map_err(|e| CoreError::Transient(e.to_string()))?
            .into_iter()
            .map(|m| m.id)
            .collect();

        db.receipts_for_messages(&message_ids)
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    #[derive(serde::Serialize)]
    struct FlatReceipt {
        message_id: Uuid,
        reader_id: Uuid,
        reader_name: String,
        read_at: chrono::DateTime<chrono::Utc>,
    }

    let receipts: Vec<FlatReceipt> = rows
        .into_iter()
        .map(|r| FlatReceipt {
            message_id: parse_uuid(&r.message_id, "message_id"),
            reader_id: parse_uuid(&r.reader_id, "reader_id"),
            reader_name: r.reader_name,
            read_at: parse_created_at(&r.read_at, &r.message_id),
        })
        .collect();

    Ok(Json(receipts))
}

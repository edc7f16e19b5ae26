use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use hearth_db::time;
use hearth_types::api::{MessageResponse, ReceiptEntry, SendMessageRequest};
use hearth_types::error::CoreError;
use hearth_types::events::GatewayEvent;
use hearth_types::models::Role;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::gate;
use crate::middleware::Claims;
use crate::notify;
use crate::threads::{load_authorized_thread, parse_created_at, parse_uuid};

/// POST /threads/{thread_id}/messages — append to the thread's log. The
/// sender must be a participant and pass the permission gate for the thread's
/// kind; the timestamp is server-assigned. Fire-and-forget from the caller's
/// perspective: no automatic retry, re-invoke on failure.
pub async fn send_message(
    State(state): State<Arc<AppStateInner>>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(CoreError::Validation("message content is empty".into()).into());
    }

    let message_id = Uuid::new_v4();
    let db = state.db.clone();
    let content_db = content.clone();

    let (thread, role, created_at, typing_cleared) = tokio::task::spawn_blocking(move || {
        let (thread, role) = gate::ensure_send_allowed(&db, thread_id, claims.sub)?;

        let created_at = time::now_ts();
        db.insert_message(
            &message_id.to_string(),
            &thread.id,
            &claims.sub.to_string(),
            role.as_str(),
            &content_db,
            &created_at,
        )
        .map_err(|e| CoreError::Transient(e.to_string()))?;

        // Sending ends composing: drop the sender's typing indicator in the
        // same operation so it cannot linger past the message itself.
        let typing_cleared = db
            .clear_typing(&thread.id, &claims.sub.to_string())
            .unwrap_or(false);

        Ok::<_, CoreError>((thread, role, created_at, typing_cleared))
    })
    .await??;

    let now = parse_created_at(&created_at, &message_id.to_string());
    let family_id = parse_uuid(&thread.family_id, "family_id");

    if typing_cleared {
        state.dispatcher.broadcast(GatewayEvent::TypingStop {
            thread_id,
            profile_id: claims.sub,
        });
    }

    // Broadcast to subscribed WebSocket clients
    state.dispatcher.broadcast(GatewayEvent::MessageCreate {
        id: message_id,
        thread_id,
        family_id,
        sender_id: claims.sub,
        sender_name: claims.name.clone(),
        sender_role: role,
        content: content.clone(),
        created_at: now,
    });

    // Notification contract for the external delivery service
    notify::emit_message_notifications(
        &state.dispatcher,
        &state.db,
        &thread,
        thread_id,
        claims.sub,
        &claims.name,
        &content,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            thread_id,
            sender_id: claims.sub,
            sender_name: claims.name.clone(),
            sender_role: role,
            content,
            created_at: now,
            read_by: vec![],
        }),
    ))
}

/// GET /threads/{thread_id}/messages — full history ascending by
/// (created_at, insertion order), each message carrying its receipts.
pub async fn get_history(
    State(state): State<Arc<AppStateInner>>,
    Path(thread_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let (rows, receipt_rows) = tokio::task::spawn_blocking(move || {
        let thread = load_authorized_thread(&db, thread_id, claims.sub)?;

        let rows = db
            .get_history(&thread.id)
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        let message_ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let receipt_rows = db
            .receipts_for_messages(&message_ids)
            .map_err(|e| CoreError::Transient(e.to_string()))?;

        Ok::<_, CoreError>((rows, receipt_rows))
    })
    .await??;

    // Group receipts by message_id (cheap in-memory work, fine on async thread)
    let mut receipt_map: HashMap<String, Vec<ReceiptEntry>> = HashMap::new();
    for r in receipt_rows {
        let entry = ReceiptEntry {
            reader_id: parse_uuid(&r.reader_id, "reader_id"),
            reader_name: r.reader_name,
            read_at: parse_created_at(&r.read_at, &r.message_id),
        };
        receipt_map.entry(r.message_id).or_default().push(entry);
    }

    let messages: Vec<MessageResponse> = rows
        .into_iter()
        .map(|row| {
            let read_by = receipt_map.remove(&row.id).unwrap_or_default();
            MessageResponse {
                id: parse_uuid(&row.id, "message id"),
                thread_id: parse_uuid(&row.thread_id, "thread_id"),
                sender_id: parse_uuid(&row.sender_id, "sender_id"),
                sender_name: row.sender_name,
                sender_role: Role::parse(&row.sender_role).unwrap_or_else(|| {
                    warn!("Corrupt sender_role '{}' on message '{}'", row.sender_role, row.id);
                    Role::ThirdParty
                }),
                content: row.content,
                created_at: parse_created_at(&row.created_at, &row.id),
                read_by,
            }
        })
        .collect();

    Ok(Json(messages))
}

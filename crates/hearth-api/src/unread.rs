use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::warn;
use uuid::Uuid;

use hearth_db::models::ThreadUnreadRow;
use hearth_types::api::{KindUnread, ThreadUnread, UnreadSummary};
use hearth_types::error::CoreError;
use hearth_types::models::ThreadKind;

use crate::auth::AppStateInner;
use crate::error::ApiError;
use crate::membership::resolve_role;
use crate::middleware::Claims;
use crate::threads::{parse_created_at, parse_uuid};

/// GET /families/{family_id}/unread — per-thread and per-kind unread counts
/// for the caller. Derived entirely from the message log and receipt store;
/// marking everything read drives this to zero with no separate bookkeeping.
pub async fn compute_unread(
    State(state): State<Arc<AppStateInner>>,
    Path(family_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();

    let rows = tokio::task::spawn_blocking(move || {
        resolve_role(&db, claims.sub, family_id)?;
        db.unread_by_thread(&claims.sub.to_string(), &family_id.to_string())
            .map_err(|e| CoreError::Transient(e.to_string()))
    })
    .await??;

    Ok(Json(summarize(rows)))
}

/// Fold per-thread rows into the summary. Thread order comes from the query
/// (newest unread first); the kind breakdown is sorted by kind name so the
/// payload is stable across requests.
fn summarize(rows: Vec<ThreadUnreadRow>) -> UnreadSummary {
    let mut total: u64 = 0;
    let mut kind_counts: HashMap<ThreadKind, u64> = HashMap::new();
    let mut threads = Vec::with_capacity(rows.len());

    for row in rows {
        let kind = ThreadKind::parse(&row.kind).unwrap_or_else(|| {
            warn!("Corrupt thread kind '{}' on thread '{}'", row.kind, row.thread_id);
            ThreadKind::GroupChat
        });

        total += row.count;
        *kind_counts.entry(kind).or_default() += row.count;
        threads.push(ThreadUnread {
            thread_id: parse_uuid(&row.thread_id, "thread_id"),
            kind,
            count: row.count,
            last_message_at: parse_created_at(&row.last_message_at, &row.thread_id),
        });
    }

    let mut by_kind: Vec<KindUnread> = kind_counts
        .into_iter()
        .map(|(kind, count)| KindUnread { kind, count })
        .collect();
    by_kind.sort_by_key(|entry| entry.kind.as_str());

    UnreadSummary { total, threads, by_kind }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_db::time;

    fn row(kind: &str, count: u64) -> ThreadUnreadRow {
        ThreadUnreadRow {
            thread_id: Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            count,
            last_message_at: time::now_ts(),
        }
    }

    #[test]
    fn kind_breakdown_has_a_stable_order() {
        let rows = vec![
            row("group_chat", 2),
            row("direct_message", 1),
            row("family_channel", 4),
            row("direct_message", 3),
        ];

        let summary = summarize(rows);
        assert_eq!(summary.total, 10);

        let kinds: Vec<ThreadKind> = summary.by_kind.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ThreadKind::DirectMessage,
                ThreadKind::FamilyChannel,
                ThreadKind::GroupChat,
            ]
        );
        assert_eq!(summary.by_kind[0].count, 4);
        assert_eq!(summary.by_kind[1].count, 4);
        assert_eq!(summary.by_kind[2].count, 2);
    }
}

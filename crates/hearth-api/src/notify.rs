use tracing::warn;
use uuid::Uuid;

use hearth_db::models::ThreadRow;
use hearth_db::Database;
use hearth_gateway::dispatcher::Dispatcher;
use hearth_types::events::GatewayEvent;

/// Preview length for notification payloads.
const PREVIEW_CHARS: usize = 80;

/// Emit the notification contract for a new message: one targeted payload per
/// recipient (every participant except the sender). Delivery is the external
/// notification service's job — the core only emits the event. Failures here
/// never fail the send.
pub async fn emit_message_notifications(
    dispatcher: &Dispatcher,
    db: &Database,
    thread: &ThreadRow,
    thread_id: Uuid,
    sender_id: Uuid,
    sender_name: &str,
    content: &str,
) {
    let recipients = match db.thread_recipient_ids(thread, &sender_id.to_string()) {
        Ok(ids) => ids,
        Err(e) => {
            warn!("notification recipient lookup failed (dropped): {}", e);
            return;
        }
    };

    let preview = preview_of(content);
    for recipient in recipients {
        let Ok(recipient_id) = recipient.parse::<Uuid>() else {
            warn!("Corrupt recipient id '{}' on thread '{}'", recipient, thread.id);
            continue;
        };
        dispatcher
            .send_to_user(
                recipient_id,
                GatewayEvent::Notification {
                    recipient_id,
                    sender_name: sender_name.to_string(),
                    preview: preview.clone(),
                    thread_id,
                },
            )
            .await;
    }
}

/// Truncate on a character boundary with an ellipsis.
fn preview_of(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let cut: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{}…", cut)
}

#[cfg(test)]
mod tests {
    use super::preview_of;

    #[test]
    fn short_content_is_untouched() {
        assert_eq!(preview_of("Pickup at 6pm"), "Pickup at 6pm");
    }

    #[test]
    fn long_content_is_truncated_on_char_boundary() {
        let long = "ä".repeat(200);
        let preview = preview_of(&long);
        assert_eq!(preview.chars().count(), 81);
        assert!(preview.ends_with('…'));
    }
}

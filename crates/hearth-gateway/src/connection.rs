use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use hearth_db::Database;
use hearth_types::events::{GatewayCommand, GatewayEvent};
use hearth_types::models::{Role, ThreadKind};
use hearth_types::permissions::{self, ChildPermissionFlags};

use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a single WebSocket connection: Identify handshake, Ready, then the
/// event loop. Clients reconnecting after a drop must refetch history and
/// receipts — delivery here is at-least-once, never exactly-once.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    // Step 1: Wait for Identify command with JWT
    let (profile_id, name) = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to identify, closing");
            return;
        }
    };

    info!("{} ({}) connected to gateway", name, profile_id);

    // Step 2: Send Ready event
    let ready = GatewayEvent::Ready {
        profile_id,
        name: name.clone(),
    };
    let Ok(ready_json) = serde_json::to_string(&ready) else {
        return;
    };
    if sender.send(Message::Text(ready_json.into())).await.is_err() {
        return;
    }

    // Register per-user channel for targeted notification payloads
    let (conn_id, mut user_rx) = dispatcher.register_user_channel(profile_id).await;

    // Subscribe to broadcasts and relay to this client
    let mut broadcast_rx = dispatcher.subscribe();
    let dispatcher_clone = dispatcher.clone();

    // Per-connection thread subscriptions (shared between send and recv tasks).
    let subscribed_threads: Arc<std::sync::RwLock<HashSet<Uuid>>> =
        Arc::new(std::sync::RwLock::new(HashSet::new()));
    let send_subscriptions = subscribed_threads.clone();

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Spawn task to forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = broadcast_rx.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Broadcast receiver lagged by {} events", n);
                            continue;
                        }
                        Err(_) => break,
                    };

                    // Thread-scoped events only go to subscribed threads
                    if let Some(thread_id) = event.thread_id() {
                        let subs = send_subscriptions.read()
                            .expect("subscription lock poisoned");
                        if !subs.contains(&thread_id) {
                            continue;
                        }
                    }

                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };

                    let Ok(text) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let name_recv = name.clone();
    let recv_subscriptions = subscribed_threads.clone();
    let db_recv = db.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<GatewayCommand>(&text) {
                        Ok(cmd) => {
                            handle_command(
                                &dispatcher_clone,
                                &db_recv,
                                profile_id,
                                &name_recv,
                                cmd,
                                &recv_subscriptions,
                            )
                            .await;
                        }
                        Err(e) => {
                            warn!(
                                "{} ({}) bad command: {} -- raw: {}",
                                name_recv,
                                profile_id,
                                e,
                                truncate_for_log(&text)
                            );
                        }
                    }
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister_user_channel(profile_id, conn_id).await;

    // Scoped resource release: a dropped connection must not leave a live
    // typing indicator behind in its subscribed threads. Best-effort — the
    // read-time staleness filter covers anything missed here.
    let thread_ids: Vec<Uuid> = subscribed_threads
        .read()
        .map(|s| s.iter().copied().collect())
        .unwrap_or_default();
    for thread_id in thread_ids {
        clear_typing(&dispatcher, &db, thread_id, profile_id).await;
    }

    info!("{} ({}) disconnected from gateway", name, profile_id);
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<(Uuid, String)> {
    use hearth_types::api::Claims;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Text(text) = msg {
                if let Ok(GatewayCommand::Identify { token }) =
                    serde_json::from_str::<GatewayCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;

                    return Some((token_data.claims.sub, token_data.claims.name));
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    profile_id: Uuid,
    name: &str,
    cmd: GatewayCommand,
    subscriptions: &Arc<std::sync::RwLock<HashSet<Uuid>>>,
) {
    match cmd {
        GatewayCommand::Identify { .. } => {} // Already handled

        GatewayCommand::Subscribe { thread_ids } => {
            // A subscription is a read: every requested thread passes the
            // same participant check the REST handlers apply, and ids that
            // fail it are dropped before they enter the filter set.
            let requested = thread_ids.len();
            let db = db.clone();
            let allowed = tokio::task::spawn_blocking(move || {
                filter_authorized_threads(&db, profile_id, thread_ids)
            })
            .await
            .unwrap_or_default();

            if allowed.len() < requested {
                warn!(
                    "{} ({}) subscribe dropped {} of {} threads (not a participant)",
                    name,
                    profile_id,
                    requested - allowed.len(),
                    requested
                );
            }
            info!(
                "{} ({}) subscribing to {} threads",
                name,
                profile_id,
                allowed.len()
            );
            let mut subs = subscriptions.write().expect("subscription lock poisoned");
            *subs = allowed.into_iter().collect();
        }

        GatewayCommand::StartTyping { thread_id } => {
            // Gated like a message send, then throttled in the store: only
            // an actual write fans out, so keystroke-rate commands cost one
            // broadcast per second at most.
            let db = db.clone();
            let wrote = tokio::task::spawn_blocking(move || {
                if !may_publish_typing(&db, thread_id, profile_id) {
                    return Ok(false);
                }
                db.set_typing(&thread_id.to_string(), &profile_id.to_string())
            })
            .await;

            match wrote {
                Ok(Ok(true)) => {
                    dispatcher.broadcast(GatewayEvent::TypingStart {
                        thread_id,
                        profile_id,
                        name: name.to_string(),
                    });
                }
                Ok(Ok(false)) => {} // throttled or not allowed
                Ok(Err(e)) => warn!("set_typing failed (dropped): {}", e),
                Err(e) => warn!("spawn_blocking join error: {}", e),
            }
        }

        GatewayCommand::StopTyping { thread_id } => {
            let db_check = db.clone();
            let participant = tokio::task::spawn_blocking(move || {
                is_participant(&db_check, thread_id, profile_id)
            })
            .await
            .unwrap_or(false);

            if participant {
                clear_typing(dispatcher, db, thread_id, profile_id).await;
            }
        }
    }
}

/// Cap logged client input without splitting a multi-byte character.
fn truncate_for_log(text: &str) -> &str {
    const MAX_BYTES: usize = 200;
    if text.len() <= MAX_BYTES {
        return text;
    }
    let mut end = MAX_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Blocking participant check. Unknown threads and store errors both count
/// as not-a-participant and the command is dropped.
fn is_participant(db: &Database, thread_id: Uuid, profile_id: Uuid) -> bool {
    match db.get_thread(&thread_id.to_string()) {
        Ok(Some(thread)) => db
            .is_thread_participant(&thread, &profile_id.to_string())
            .unwrap_or(false),
        Ok(None) => false,
        Err(e) => {
            warn!("participant check failed for thread {}: {}", thread_id, e);
            false
        }
    }
}

fn filter_authorized_threads(db: &Database, profile_id: Uuid, thread_ids: Vec<Uuid>) -> Vec<Uuid> {
    thread_ids
        .into_iter()
        .filter(|tid| is_participant(db, *tid, profile_id))
        .collect()
}

/// Typing writes use the same gate as message sends: thread participation
/// plus the role and account-type permission for the thread's kind.
fn may_publish_typing(db: &Database, thread_id: Uuid, profile_id: Uuid) -> bool {
    let thread = match db.get_thread(&thread_id.to_string()) {
        Ok(Some(thread)) => thread,
        _ => return false,
    };
    if !db
        .is_thread_participant(&thread, &profile_id.to_string())
        .unwrap_or(false)
    {
        return false;
    }

    let Ok(Some(membership)) = db.membership_for(&profile_id.to_string(), &thread.family_id)
    else {
        return false;
    };
    let (Some(role), Some(kind)) = (
        Role::parse(&membership.role),
        ThreadKind::parse(&thread.kind),
    ) else {
        return false;
    };

    let flags = ChildPermissionFlags {
        allow_parent_messaging: membership.allow_parent_messaging,
        allow_family_chat: membership.allow_family_chat,
    };
    permissions::can_send_in(role, membership.is_child_account, flags, kind).allowed
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
    fn subscriptions_drop_threads_the_profile_cannot_read() {
        let db = Database::open_in_memory().unwrap();
        let family_a = uid();
        let family_b = uid();
        let member_a = member(&db, family_a, "parent", false, false, false);
        let _member_b = member(&db, family_b, "parent", false, false, false);

        let chan_a = db
            .get_or_create_family_channel(&uid().to_string(), &family_a.to_string())
            .unwrap();
        let chan_b = db
            .get_or_create_family_channel(&uid().to_string(), &family_b.to_string())
            .unwrap();
        let chan_a_id: Uuid = chan_a.id.parse().unwrap();
        let chan_b_id: Uuid = chan_b.id.parse().unwrap();

        // The other family's channel and an unknown id are both dropped.
        let kept = filter_authorized_threads(&db, member_a, vec![chan_a_id, chan_b_id, uid()]);
        assert_eq!(kept, vec![chan_a_id]);
    }

    #[test]
    fn typing_gate_matches_the_message_send_gate() {
        let db = Database::open_in_memory().unwrap();
        let family = uid();
        let parent = member(&db, family, "parent", false, false, false);
        let muted_child = member(&db, family, "child", true, false, false);
        let outsider = uid();
        db.create_profile(&outsider.to_string(), "outsider", "hash", false)
            .unwrap();

        let chan = db
            .get_or_create_family_channel(&uid().to_string(), &family.to_string())
            .unwrap();
        let chan_id: Uuid = chan.id.parse().unwrap();

        assert!(may_publish_typing(&db, chan_id, parent));
        assert!(!may_publish_typing(&db, chan_id, muted_child));
        assert!(!may_publish_typing(&db, chan_id, outsider));
    }

    #[test]
    fn log_truncation_never_splits_a_character() {
        let long = "€".repeat(100); // 300 bytes of 3-byte chars
        let shown = truncate_for_log(&long);
        assert!(shown.len() <= 200);
        assert!(long.starts_with(shown));
        assert_eq!(shown.chars().count(), 66);

        assert_eq!(truncate_for_log("hello"), "hello");
    }
}

/// Delete the typing row and announce the stop if a row was actually live.
/// Failures are swallowed — the staleness filter bounds the cost of a missed
/// cleanup.
async fn clear_typing(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    thread_id: Uuid,
    profile_id: Uuid,
) {
    let db = db.clone();
    let removed = tokio::task::spawn_blocking(move || {
        db.clear_typing(&thread_id.to_string(), &profile_id.to_string())
    })
    .await;

    match removed {
        Ok(Ok(true)) => {
            dispatcher.broadcast(GatewayEvent::TypingStop {
                thread_id,
                profile_id,
            });
        }
        Ok(Ok(false)) => {}
        Ok(Err(e)) => warn!("clear_typing failed (dropped): {}", e),
        Err(e) => warn!("spawn_blocking join error: {}", e),
    }
}

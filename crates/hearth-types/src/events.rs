use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { profile_id: Uuid, name: String },

    /// A new message was appended to a thread
    MessageCreate {
        id: Uuid,
        thread_id: Uuid,
        family_id: Uuid,
        sender_id: Uuid,
        sender_name: String,
        sender_role: Role,
        content: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },

    /// A reader acknowledged a message for the first time
    ReceiptCreate {
        message_id: Uuid,
        thread_id: Uuid,
        reader_id: Uuid,
        reader_name: String,
        read_at: chrono::DateTime<chrono::Utc>,
    },

    /// A user started (or refreshed) typing in a thread
    TypingStart {
        thread_id: Uuid,
        profile_id: Uuid,
        name: String,
    },

    /// A user stopped typing (send, blur, or unmount)
    TypingStop { thread_id: Uuid, profile_id: Uuid },

    /// Targeted payload for the external notification service. Delivery is
    /// someone else's job; the core only emits the contract.
    Notification {
        recipient_id: Uuid,
        sender_name: String,
        preview: String,
        thread_id: Uuid,
    },
}

impl GatewayEvent {
    /// Returns the thread_id if this event is scoped to a specific thread.
    /// Events that return `None` are delivered regardless of subscriptions.
    pub fn thread_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageCreate { thread_id, .. } => Some(*thread_id),
            Self::ReceiptCreate { thread_id, .. } => Some(*thread_id),
            Self::TypingStart { thread_id, .. } => Some(*thread_id),
            Self::TypingStop { thread_id, .. } => Some(*thread_id),
            // Ready and Notification are connection/user scoped
            _ => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Replace this connection's thread subscriptions. Only thread-scoped
    /// events for subscribed threads are forwarded.
    Subscribe { thread_ids: Vec<Uuid> },

    /// Indicate typing in a thread
    StartTyping { thread_id: Uuid },

    /// Explicitly clear a typing indicator
    StopTyping { thread_id: Uuid },
}

/// Per-thread subscription lifecycle as observed by a client. Delivery is
/// at-least-once: on Reconnecting -> Active the client must refetch history
/// and receipts and merge by message id, never by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    Subscribing,
    Active,
    Reconnecting,
    Closed,
}

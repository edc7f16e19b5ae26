pub mod auth;
pub mod error;
pub mod gate;
pub mod membership;
pub mod messages;
pub mod middleware;
pub mod notify;
pub mod receipts;
pub mod threads;
pub mod typing;
pub mod unread;

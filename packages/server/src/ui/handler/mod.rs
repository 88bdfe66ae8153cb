//! HTTP and WebSocket handlers.

mod http;
mod websocket;

pub use http::{delete_message, get_messages, get_perms, health_check, list_users, post_message};
pub use websocket::websocket_handler;

//! HTTP / WebSocket surface.

mod auth;
mod config;
mod error;
mod handler;
mod server;
mod signal;
pub mod state;

pub use auth::{AuthUser, SESSION_HEADER, split_credentials};
pub use config::ServerConfig;
pub use error::ApiError;
pub use server::{SERVER_CLOSING, Server, ServerError};

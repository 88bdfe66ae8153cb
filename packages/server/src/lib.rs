//! Sasayaki chat server library.
//!
//! A multi-room broadcast chat backend: messages are posted over HTTP, kept in
//! a bounded in-memory history backed by an append-only log, and pushed live
//! to WebSocket listeners scoped by public room and whisper recipient.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

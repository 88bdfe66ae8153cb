//! Live delivery of messages to connected clients.
//!
//! - [`Connection`]: one live socket, serialized writes, liveness pings
//! - [`RoomTree`]: path-addressed rooms of connections, scoped broadcast
//! - [`spawn_liveness_sweeper`]: periodic ping / prune over the tree

pub mod connection;
pub mod room_tree;
pub mod sweeper;

pub use connection::{Connection, LivenessConfig};
pub use room_tree::{ALL_ROOM, RoomTree, whisper_room};
pub use sweeper::{SweepConfig, spawn_liveness_sweeper};

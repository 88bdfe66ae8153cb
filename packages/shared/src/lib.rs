//! Shared utilities for the Sasayaki chat server and its tooling.

pub mod logger;
pub mod shutdown;

//! Server configuration.

use std::{path::PathBuf, time::Duration};

use crate::infrastructure::fanout::{LivenessConfig, SweepConfig};

/// Settings for one server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Users config file (TOML).
    pub users_path: PathBuf,
    /// Message log file.
    pub store_path: PathBuf,
    /// Size of the in-memory history.
    pub max_messages: usize,
    pub flush_interval: Duration,
    pub sweep: SweepConfig,
    pub liveness: LivenessConfig,
    /// Accept users without a token. Development only.
    pub disable_token_check: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            users_path: PathBuf::from("users.yaml"),
            store_path: PathBuf::from("messages.log"),
            max_messages: 300,
            flush_interval: Duration::from_secs(5 * 60),
            sweep: SweepConfig::default(),
            liveness: LivenessConfig::default(),
            disable_token_check: false,
        }
    }
}

//! Layered node configuration: compiled-in presets, optional TOML file,
//! then `NUMI_*` environment variable overrides — in that order, mirroring
//! the teacher's `Config::production()`/`development()`/`testnet()` plus
//! `apply_env_overrides()` layering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Every tunable the node's components need at startup. Grouped as one
/// flat struct (rather than the teacher's per-subsystem structs) since
/// the core has far fewer independent concerns than the teacher's P2P +
/// RPC + mining stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Directory holding the genesis file and the chain log.
    pub data_dir: PathBuf,
    /// HTTP listen port for the node's own facade.
    pub listen_port: u16,
    /// `ip:port` strings seeded into the peer registry at startup.
    pub bootstrap_peers: Vec<String>,
    /// Required leading hex zeros for a block hash to be valid.
    pub difficulty: u32,
    /// Fixed amount credited to a block's miner, on top of fees.
    pub block_reward: u64,
    /// Sync-loop period.
    pub sync_interval_secs: u64,
    /// Fork-check-loop period.
    pub fork_check_interval_secs: u64,
    /// Mining-ticker period.
    pub mining_tick_secs: u64,
    /// Timeout applied to every outbound peer HTTP call.
    pub peer_request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            listen_port: 8080,
            bootstrap_peers: Vec::new(),
            difficulty: 2,
            block_reward: 100,
            sync_interval_secs: 10,
            fork_check_interval_secs: 10,
            mining_tick_secs: 1,
            peer_request_timeout_secs: 5,
        }
    }
}

impl NodeConfig {
    /// Hardened defaults for a long-running public node: higher
    /// difficulty, stricter peer timeout.
    pub fn production() -> Self {
        Self {
            difficulty: 4,
            peer_request_timeout_secs: 5,
            ..Default::default()
        }
    }

    /// Fast local iteration: trivial difficulty, tight loop periods.
    pub fn development() -> Self {
        Self {
            data_dir: PathBuf::from("./dev-data"),
            difficulty: 1,
            sync_interval_secs: 2,
            fork_check_interval_secs: 2,
            mining_tick_secs: 1,
            peer_request_timeout_secs: 2,
            ..Default::default()
        }
    }

    /// Shared multi-node testing: moderate difficulty, default periods.
    pub fn testnet() -> Self {
        Self {
            data_dir: PathBuf::from("./testnet-data"),
            difficulty: 2,
            sync_interval_secs: 5,
            fork_check_interval_secs: 5,
            ..Default::default()
        }
    }

    /// Load a TOML file, then apply environment overrides on top.
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: NodeConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Overlay `NUMI_*` environment variables on top of the current
    /// values. Malformed values are ignored rather than rejected, since
    /// an operator's stray env var should not take the node down.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NUMI_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("NUMI_LISTEN_PORT") {
            if let Ok(port) = v.parse() {
                self.listen_port = port;
            }
        }
        if let Ok(v) = std::env::var("NUMI_BOOTSTRAP_PEERS") {
            self.bootstrap_peers = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("NUMI_DIFFICULTY") {
            if let Ok(d) = v.parse() {
                self.difficulty = d;
            }
        }
        if let Ok(v) = std::env::var("NUMI_BLOCK_REWARD") {
            if let Ok(r) = v.parse() {
                self.block_reward = r;
            }
        }
        if let Ok(v) = std::env::var("NUMI_SYNC_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.sync_interval_secs = s;
            }
        }
        if let Ok(v) = std::env::var("NUMI_FORK_CHECK_INTERVAL_SECS") {
            if let Ok(s) = v.parse() {
                self.fork_check_interval_secs = s;
            }
        }
        if let Ok(v) = std::env::var("NUMI_MINING_TICK_SECS") {
            if let Ok(s) = v.parse() {
                self.mining_tick_secs = s;
            }
        }
        if let Ok(v) = std::env::var("NUMI_PEER_REQUEST_TIMEOUT_SECS") {
            if let Ok(s) = v.parse() {
                self.peer_request_timeout_secs = s;
            }
        }
    }

    /// Sanity-check the loaded configuration before the node starts.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.listen_port == 0 {
            return Err("listen_port cannot be 0".to_string());
        }
        if self.difficulty > 64 {
            return Err("difficulty cannot exceed 64 (longer than a hash's hex encoding)".to_string());
        }
        if self.sync_interval_secs == 0 || self.fork_check_interval_secs == 0 || self.mining_tick_secs == 0 {
            return Err("loop periods must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(NodeConfig::default().validate().is_ok());
    }

    #[test]
    fn production_uses_higher_difficulty_than_development() {
        assert!(NodeConfig::production().difficulty > NodeConfig::development().difficulty);
    }

    #[test]
    fn zero_listen_port_fails_validation() {
        let mut cfg = NodeConfig::default();
        cfg.listen_port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_override_replaces_difficulty() {
        std::env::set_var("NUMI_DIFFICULTY", "7");
        let mut cfg = NodeConfig::default();
        cfg.apply_env_overrides();
        assert_eq!(cfg.difficulty, 7);
        std::env::remove_var("NUMI_DIFFICULTY");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("node.toml");
        let cfg = NodeConfig::testnet();
        cfg.save_to_file(&path).unwrap();
        let loaded = NodeConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.difficulty, cfg.difficulty);
        assert_eq!(loaded.sync_interval_secs, cfg.sync_interval_secs);
    }
}

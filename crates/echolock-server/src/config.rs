//! Server configuration — parsed from a TOML file, then overridden by
//! `ECHOLOCK_*` environment variables, then validated.
//!
//! Priority: environment variables > config file > defaults.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use echolock_chain::Network;

pub const MIN_RELAY_COUNT: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub relay: RelaySection,
    #[serde(default)]
    pub explorer: ExplorerSection,
    #[serde(default)]
    pub crypto: CryptoSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_scan_interval")]
    pub check_in_scan_interval_secs: u64,
    /// Gates whether `crypto.service_master_key` is mandatory.
    #[serde(default)]
    pub production: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            check_in_scan_interval_secs: default_scan_interval(),
            production: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_min_quorum")]
    pub min_publish_quorum: usize,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            min_publish_quorum: default_min_quorum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerSection {
    #[serde(default = "default_explorer_url")]
    pub url: String,
    #[serde(default)]
    pub network: Network,
    #[serde(default)]
    pub unsafe_mainnet: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_confirmation_target")]
    pub confirmation_target: u32,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default = "default_dropped_threshold")]
    pub dropped_threshold_secs: u64,
    #[serde(default = "default_max_monitor")]
    pub max_monitor_secs: u64,
    #[serde(default = "default_explorer_timeout")]
    pub timeout_secs: u64,
}

impl Default for ExplorerSection {
    fn default() -> Self {
        Self {
            url: default_explorer_url(),
            network: Network::default(),
            unsafe_mainnet: false,
            poll_interval_secs: default_poll_interval(),
            confirmation_target: default_confirmation_target(),
            max_wait_secs: default_max_wait(),
            dropped_threshold_secs: default_dropped_threshold(),
            max_monitor_secs: default_max_monitor(),
            timeout_secs: default_explorer_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoSection {
    /// 32-byte hex. Required whenever `server.production` is set.
    pub service_master_key: Option<String>,
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

impl Default for CryptoSection {
    fn default() -> Self {
        Self {
            service_master_key: None,
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_scan_interval() -> u64 {
    300
}
fn default_min_quorum() -> usize {
    echolock_relay::DEFAULT_MIN_PUBLISH_QUORUM
}
fn default_explorer_url() -> String {
    "https://blockstream.info/testnet/api".to_string()
}
fn default_poll_interval() -> u64 {
    30
}
fn default_confirmation_target() -> u32 {
    1
}
fn default_max_wait() -> u64 {
    3600
}
fn default_dropped_threshold() -> u64 {
    600
}
fn default_max_monitor() -> u64 {
    7200
}
fn default_explorer_timeout() -> u64 {
    5
}
fn default_pbkdf2_iterations() -> u32 {
    echolock_primitives::kdf::DEFAULT_PBKDF2_ITERATIONS
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).context("failed to parse TOML config")?;
        Ok(config)
    }

    /// Supported overrides:
    /// - `ECHOLOCK_LOG_LEVEL`
    /// - `ECHOLOCK_CHECK_IN_SCAN_INTERVAL_SECS`
    /// - `ECHOLOCK_SERVICE_MASTER_KEY`
    /// - `RELAY_URLS` (comma-separated)
    /// - `EXPLORER_URL`
    /// - `MIN_PUBLISH_QUORUM`
    /// - `PBKDF2_ITERATIONS`
    /// - `ECHOLOCK_ALLOW_MAINNET` is consulted directly by
    ///   `echolock_chain::ChainConfig::validate`, not here.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ECHOLOCK_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("ECHOLOCK_CHECK_IN_SCAN_INTERVAL_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.check_in_scan_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("ECHOLOCK_SERVICE_MASTER_KEY") {
            self.crypto.service_master_key = Some(v);
        }
        if let Ok(v) = std::env::var("RELAY_URLS") {
            self.relay.urls = v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        if let Ok(v) = std::env::var("EXPLORER_URL") {
            self.explorer.url = v;
        }
        if let Ok(v) = std::env::var("MIN_PUBLISH_QUORUM") {
            if let Ok(q) = v.parse::<usize>() {
                self.relay.min_publish_quorum = q;
            }
        }
        if let Ok(v) = std::env::var("PBKDF2_ITERATIONS") {
            if let Ok(iters) = v.parse::<u32>() {
                self.crypto.pbkdf2_iterations = iters;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.relay.urls.len() >= MIN_RELAY_COUNT,
            "relay.urls must list at least {MIN_RELAY_COUNT} relays (got {})",
            self.relay.urls.len()
        );
        anyhow::ensure!(
            self.relay.min_publish_quorum >= 1 && self.relay.min_publish_quorum <= self.relay.urls.len(),
            "relay.min_publish_quorum must be between 1 and relay.urls.len()"
        );
        anyhow::ensure!(
            self.crypto.pbkdf2_iterations >= echolock_primitives::kdf::DEFAULT_PBKDF2_ITERATIONS,
            "crypto.pbkdf2_iterations must be >= {}",
            echolock_primitives::kdf::DEFAULT_PBKDF2_ITERATIONS
        );
        anyhow::ensure!(
            self.server.check_in_scan_interval_secs >= 1,
            "server.check_in_scan_interval_secs must be >= 1"
        );
        if self.server.production {
            let key = self
                .crypto
                .service_master_key
                .as_deref()
                .unwrap_or_default();
            anyhow::ensure!(
                hex::decode(key).map(|b| b.len() == 32).unwrap_or(false),
                "crypto.service_master_key must be 32-byte hex when server.production is set"
            );
        }

        let chain_config = self.chain_config();
        chain_config
            .validate()
            .context("explorer/network configuration invalid")?;

        Ok(())
    }

    pub fn chain_config(&self) -> echolock_chain::ChainConfig {
        echolock_chain::ChainConfig {
            explorer_base_url: self.explorer.url.clone(),
            network: self.explorer.network,
            unsafe_mainnet: self.explorer.unsafe_mainnet,
            poll_interval_secs: self.explorer.poll_interval_secs,
            confirmation_target: self.explorer.confirmation_target,
            max_wait_secs: self.explorer.max_wait_secs,
            dropped_threshold_secs: self.explorer.dropped_threshold_secs,
            max_monitor_secs: self.explorer.max_monitor_secs,
            explorer_timeout_secs: self.explorer.timeout_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn minimal_toml() -> &'static str {
        r#"
[relay]
urls = ["wss://a", "wss://b", "wss://c", "wss://d", "wss://e", "wss://f", "wss://g"]
"#
    }

    #[test]
    fn parses_minimal_config_with_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.relay.urls.len(), 7);
        assert_eq!(config.server.check_in_scan_interval_secs, 300);
        assert_eq!(
            config.crypto.pbkdf2_iterations,
            echolock_primitives::kdf::DEFAULT_PBKDF2_ITERATIONS
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_too_few_relays() {
        let toml = r#"
[relay]
urls = ["wss://a", "wss://b"]
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_requires_valid_master_key() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let mut config = ServerConfig::from_file(file.path()).unwrap();
        config.server.production = true;
        assert!(config.validate().is_err());

        config.crypto.service_master_key = Some(hex::encode([7u8; 32]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply_on_top_of_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", minimal_toml()).unwrap();
        let mut config = ServerConfig::from_file(file.path()).unwrap();

        std::env::set_var("RELAY_URLS", "wss://x,wss://y,wss://z,wss://1,wss://2,wss://3,wss://4");
        std::env::set_var("MIN_PUBLISH_QUORUM", "4");
        std::env::set_var("PBKDF2_ITERATIONS", "700000");

        config.apply_env_overrides();

        assert_eq!(config.relay.urls.len(), 7);
        assert_eq!(config.relay.urls[0], "wss://x");
        assert_eq!(config.relay.min_publish_quorum, 4);
        assert_eq!(config.crypto.pbkdf2_iterations, 700_000);

        std::env::remove_var("RELAY_URLS");
        std::env::remove_var("MIN_PUBLISH_QUORUM");
        std::env::remove_var("PBKDF2_ITERATIONS");
    }

    #[test]
    fn rejects_pbkdf2_below_minimum() {
        let toml = r#"
[relay]
urls = ["wss://a", "wss://b", "wss://c", "wss://d", "wss://e", "wss://f", "wss://g"]

[crypto]
pbkdf2_iterations = 100
"#;
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", toml).unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert!(config.validate().is_err());
    }
}

//! Network selection and the mainnet safety gate.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

impl Default for Network {
    fn default() -> Self {
        Network::Testnet
    }
}

/// Configuration for the explorer client and monitor. Defaults to
/// testnet; using mainnet requires an explicit double opt-in (a config
/// flag plus an environment variable) so a stray default config can
/// never move real funds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub explorer_base_url: String,
    #[serde(default)]
    pub network: Network,
    /// Must be `true`, and `ECHOLOCK_ALLOW_MAINNET=1` must be set in the
    /// environment, for `network: Mainnet` to pass validation.
    #[serde(default)]
    pub unsafe_mainnet: bool,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_confirmation_target")]
    pub confirmation_target: u32,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_dropped_threshold_secs")]
    pub dropped_threshold_secs: u64,
    #[serde(default = "default_max_monitor_secs")]
    pub max_monitor_secs: u64,
    #[serde(default = "default_explorer_timeout_secs")]
    pub explorer_timeout_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    30
}
fn default_confirmation_target() -> u32 {
    1
}
fn default_max_wait_secs() -> u64 {
    3600
}
fn default_dropped_threshold_secs() -> u64 {
    600
}
fn default_max_monitor_secs() -> u64 {
    7200
}
fn default_explorer_timeout_secs() -> u64 {
    5
}

impl ChainConfig {
    pub fn validate(&self) -> Result<(), crate::ChainError> {
        if self.network == Network::Mainnet {
            let env_allows = std::env::var("ECHOLOCK_ALLOW_MAINNET")
                .map(|v| v == "1")
                .unwrap_or(false);
            if !self.unsafe_mainnet || !env_allows {
                return Err(crate::ChainError::MainnetNotAllowed);
            }
        }
        Ok(())
    }
}

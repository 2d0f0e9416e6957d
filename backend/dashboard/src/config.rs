//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::contract::ConfirmPolicy;
use crate::errors::{DashboardError, Result};
use crate::sync::SyncIntervals;
use crate::types::Address;

/// Address the local development node assigns to the first deployment.
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint of the node / wallet provider
    pub rpc_url: String,
    /// The deployed voting contract
    pub contract_address: Address,
    /// Port for the HTTP server
    pub api_port: u16,
    /// Full refresh period while connected
    pub refresh_interval_secs: u64,
    /// Countdown tick period
    pub countdown_tick_secs: u64,
    /// Receipt polling period while waiting for confirmation
    pub confirm_poll_ms: u64,
    /// Give up on a transaction receipt after this long
    pub confirm_timeout_secs: u64,
    /// Use this account instead of the first one the wallet returns
    pub wallet_account: Option<Address>,
    /// `false` runs as if no wallet provider were injected
    pub wallet_enabled: bool,
    /// Connect at startup
    pub auto_connect: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = Config {
            rpc_url: get("RPC_URL", "http://127.0.0.1:8545"),
            contract_address: parse("CONTRACT_ADDRESS", &get("CONTRACT_ADDRESS", DEFAULT_CONTRACT_ADDRESS))?,
            api_port: parse("API_PORT", &get("API_PORT", "3001"))?,
            refresh_interval_secs: parse("REFRESH_INTERVAL_SECS", &get("REFRESH_INTERVAL_SECS", "10"))?,
            countdown_tick_secs: parse("COUNTDOWN_TICK_SECS", &get("COUNTDOWN_TICK_SECS", "1"))?,
            confirm_poll_ms: parse("CONFIRM_POLL_MS", &get("CONFIRM_POLL_MS", "500"))?,
            confirm_timeout_secs: parse("CONFIRM_TIMEOUT_SECS", &get("CONFIRM_TIMEOUT_SECS", "120"))?,
            wallet_account: lookup("WALLET_ACCOUNT")
                .filter(|v| !v.trim().is_empty())
                .map(|v| parse("WALLET_ACCOUNT", &v))
                .transpose()?,
            wallet_enabled: parse_bool("WALLET_ENABLED", &get("WALLET_ENABLED", "true"))?,
            auto_connect: parse_bool("AUTO_CONNECT", &get("AUTO_CONNECT", "true"))?,
        };

        // Tokio intervals panic on a zero period.
        for (key, value) in [
            ("REFRESH_INTERVAL_SECS", config.refresh_interval_secs),
            ("COUNTDOWN_TICK_SECS", config.countdown_tick_secs),
            ("CONFIRM_POLL_MS", config.confirm_poll_ms),
        ] {
            if value == 0 {
                return Err(DashboardError::Config(format!("{key} must be positive")));
            }
        }
        Ok(config)
    }

    pub fn intervals(&self) -> SyncIntervals {
        SyncIntervals {
            refresh: Duration::from_secs(self.refresh_interval_secs),
            countdown_tick: Duration::from_secs(self.countdown_tick_secs),
        }
    }

    pub fn confirm_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            poll_interval: Duration::from_millis(self.confirm_poll_ms),
            timeout: Duration::from_secs(self.confirm_timeout_secs),
        }
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| DashboardError::Config(format!("Invalid {key}: {raw:?}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(DashboardError::Config(format!("Invalid {key}: {raw:?}"))),
    }
}

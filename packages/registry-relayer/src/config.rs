//! Relayer configuration

use std::env;
use std::fmt;
use std::time::Duration;

use eyre::{eyre, Result};
use transfer_registry::EvmAddress;

/// Relayer configuration
#[derive(Clone)]
pub struct Config {
    /// EVM RPC URL
    pub evm_rpc_url: String,
    /// EVM native chain ID (e.g. 31337 for Anvil)
    pub evm_chain_id: u64,
    /// PaymentManager contract address (source of transfers)
    pub payment_manager_address: String,
    /// RemoteBridge contract address (mirror and checkpoint)
    pub remote_bridge_address: String,
    /// Key of the RemoteBridge owner
    pub evm_private_key: String,

    /// Poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// Largest block span scanned per `eth_getLogs` request
    pub max_block_range: u64,
    /// Blocks to stay behind the head
    pub confirmations: u64,
    /// First block scanned when the bridge has no checkpoint
    pub start_block: u64,
    /// Blocks scanned without transfers before the checkpoint is rewritten
    pub checkpoint_interval: u64,

    /// Retries for transport failures
    pub retry_attempts: u32,
    /// Initial retry backoff in milliseconds
    pub retry_delay_ms: u64,

    /// Health and metrics server bind address
    pub health_bind_address: String,
    /// Health and metrics server port
    pub health_port: u16,
}

impl Config {
    /// Load configuration from environment
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }

        let max_block_range = parse_or("MAX_BLOCK_RANGE", 10_000)?;
        let config = Self {
            evm_rpc_url: env::var("EVM_RPC_URL").map_err(|_| eyre!("EVM_RPC_URL required"))?,
            evm_chain_id: env::var("EVM_CHAIN_ID")
                .map_err(|_| eyre!("EVM_CHAIN_ID required"))?
                .parse()
                .map_err(|_| eyre!("Invalid EVM_CHAIN_ID"))?,
            payment_manager_address: env::var("PAYMENT_MANAGER_ADDRESS")
                .map_err(|_| eyre!("PAYMENT_MANAGER_ADDRESS required"))?,
            remote_bridge_address: env::var("REMOTE_BRIDGE_ADDRESS")
                .map_err(|_| eyre!("REMOTE_BRIDGE_ADDRESS required"))?,
            evm_private_key: env::var("EVM_PRIVATE_KEY")
                .map_err(|_| eyre!("EVM_PRIVATE_KEY required"))?,

            poll_interval_ms: parse_or("POLL_INTERVAL_MS", 2000)?,
            max_block_range,
            confirmations: parse_or("CONFIRMATIONS", 1)?,
            start_block: parse_or("START_BLOCK", 0)?,
            checkpoint_interval: parse_or("CHECKPOINT_INTERVAL", max_block_range)?,

            retry_attempts: parse_or("RETRY_ATTEMPTS", 5)?,
            retry_delay_ms: parse_or("RETRY_DELAY_MS", 2000)?,

            health_bind_address: env::var("HEALTH_BIND_ADDRESS")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),
            health_port: parse_or("HEALTH_PORT", 9099)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check address and key shapes before touching the network
    pub fn validate(&self) -> Result<()> {
        if !self.evm_rpc_url.starts_with("http://") && !self.evm_rpc_url.starts_with("https://") {
            return Err(eyre!("EVM_RPC_URL must be an http(s) URL"));
        }
        self.payment_manager()?;
        self.remote_bridge()?;

        let key = self
            .evm_private_key
            .strip_prefix("0x")
            .unwrap_or(&self.evm_private_key);
        if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(eyre!("EVM_PRIVATE_KEY must be 32 bytes of hex"));
        }

        if self.max_block_range == 0 {
            return Err(eyre!("MAX_BLOCK_RANGE must be positive"));
        }
        if self.checkpoint_interval == 0 {
            return Err(eyre!("CHECKPOINT_INTERVAL must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(eyre!("POLL_INTERVAL_MS must be positive"));
        }
        Ok(())
    }

    pub fn payment_manager(&self) -> Result<EvmAddress> {
        EvmAddress::from_hex(&self.payment_manager_address)
            .map_err(|e| eyre!("Invalid PAYMENT_MANAGER_ADDRESS: {}", e))
    }

    pub fn remote_bridge(&self) -> Result<EvmAddress> {
        EvmAddress::from_hex(&self.remote_bridge_address)
            .map_err(|e| eyre!("Invalid REMOTE_BRIDGE_ADDRESS: {}", e))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("evm_rpc_url", &self.evm_rpc_url)
            .field("evm_chain_id", &self.evm_chain_id)
            .field("payment_manager_address", &self.payment_manager_address)
            .field("remote_bridge_address", &self.remote_bridge_address)
            .field("evm_private_key", &"<redacted>")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_block_range", &self.max_block_range)
            .field("confirmations", &self.confirmations)
            .field("start_block", &self.start_block)
            .field("checkpoint_interval", &self.checkpoint_interval)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .field("health_bind_address", &self.health_bind_address)
            .field("health_port", &self.health_port)
            .finish()
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(v) => v.trim().parse().map_err(|_| eyre!("Invalid {}", name)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    const VARS: [&str; 14] = [
        "EVM_RPC_URL",
        "EVM_CHAIN_ID",
        "PAYMENT_MANAGER_ADDRESS",
        "REMOTE_BRIDGE_ADDRESS",
        "EVM_PRIVATE_KEY",
        "POLL_INTERVAL_MS",
        "MAX_BLOCK_RANGE",
        "CONFIRMATIONS",
        "START_BLOCK",
        "CHECKPOINT_INTERVAL",
        "RETRY_ATTEMPTS",
        "RETRY_DELAY_MS",
        "HEALTH_BIND_ADDRESS",
        "HEALTH_PORT",
    ];

    fn set_required() {
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var("EVM_RPC_URL", "http://localhost:8545");
        env::set_var("EVM_CHAIN_ID", "31337");
        env::set_var(
            "PAYMENT_MANAGER_ADDRESS",
            "0x5FbDB2315678afecb367f032d93F642f64180aa3",
        );
        env::set_var(
            "REMOTE_BRIDGE_ADDRESS",
            "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512",
        );
        env::set_var("EVM_PRIVATE_KEY", KEY);
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        set_required();
        let config = Config::load().unwrap();

        assert_eq!(config.evm_chain_id, 31337);
        assert_eq!(config.poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.max_block_range, 10_000);
        assert_eq!(config.confirmations, 1);
        assert_eq!(config.start_block, 0);
        assert_eq!(config.checkpoint_interval, 10_000);
        assert_eq!(config.health_bind_address, "0.0.0.0");
        assert_eq!(config.health_port, 9099);
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay_ms, 2000);
        assert_eq!(
            config.payment_manager().unwrap().as_hex(),
            "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        );
    }

    #[test]
    #[serial]
    fn test_load_overrides() {
        set_required();
        env::set_var("CONFIRMATIONS", "12");
        env::set_var("START_BLOCK", "1500");
        env::set_var("MAX_BLOCK_RANGE", "500");
        env::set_var("HEALTH_PORT", "9200");
        let config = Config::load().unwrap();
        assert_eq!(config.confirmations, 12);
        assert_eq!(config.start_block, 1500);
        // Follows MAX_BLOCK_RANGE unless set
        assert_eq!(config.checkpoint_interval, 500);
        assert_eq!(config.health_port, 9200);

        env::set_var("CHECKPOINT_INTERVAL", "0");
        assert!(Config::load().is_err());
        env::remove_var("CHECKPOINT_INTERVAL");

        env::set_var("MAX_BLOCK_RANGE", "lots");
        assert!(Config::load().is_err());
    }

    #[test]
    #[serial]
    fn test_missing_required() {
        set_required();
        env::remove_var("REMOTE_BRIDGE_ADDRESS");
        let err = Config::load().unwrap_err();
        assert!(err.to_string().contains("REMOTE_BRIDGE_ADDRESS"));
    }

    #[test]
    #[serial]
    fn test_validate_shapes() {
        set_required();
        let config = Config::load().unwrap();

        let mut bad = config.clone();
        bad.evm_private_key = "0x1234".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.remote_bridge_address = "not-an-address".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.evm_rpc_url = "ws://localhost:8545".to_string();
        assert!(bad.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_debug_redacts_key() {
        set_required();
        let config = Config::load().unwrap();
        let debug = format!("{:?}", config);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&KEY[2..]));
    }
}

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: u64,
    /// HTTP JSON-RPC endpoint. A chain without one is reported at startup
    /// and never scanned.
    pub rpc_http: Option<String>,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_batch_size_blocks")]
    pub batch_size_blocks: u64,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default = "default_backfill_days")]
    pub backfill_days: u64,
    #[serde(default = "default_avg_block_time_seconds")]
    pub avg_block_time_seconds: u64,
    #[serde(default = "default_explorer_tx_base_url")]
    pub explorer_tx_base_url: String,
    /// Token/collection addresses whose approvals are considered valuable
    /// by the risk engine. Lowercased at registry build time.
    #[serde(default)]
    pub valuable_tokens: Vec<String>,
}

fn default_confirmations() -> u64 {
    12
}

fn default_batch_size_blocks() -> u64 {
    500
}

fn default_rate_limit_delay_ms() -> u64 {
    250
}

fn default_backfill_days() -> u64 {
    30
}

fn default_avg_block_time_seconds() -> u64 {
    12
}

fn default_explorer_tx_base_url() -> String {
    "https://etherscan.io/tx/".to_string()
}

// ============================================================
// Scanner Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum number of events included in a single digest; the overflow
    /// is reported as a "N more" count.
    #[serde(default = "default_events_per_digest")]
    pub events_per_digest: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            events_per_digest: default_events_per_digest(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_events_per_digest() -> usize {
    10
}

// ============================================================
// Notification Config
// ============================================================

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    #[serde(default)]
    pub telegram_enabled: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

// ============================================================
// API Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default = "default_api_host")]
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_api_port() -> u16 {
    3000
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> eyre::Result<()> {
        if self.chains.is_empty() {
            return Err(eyre::eyre!("At least one chain must be configured"));
        }
        for chain in &self.chains {
            if chain.rpc_http.is_none() {
                tracing::warn!(
                    chain = %chain.name,
                    "No rpc_http configured, chain will not be scanned"
                );
            }
            for token in &chain.valuable_tokens {
                if !token.starts_with("0x") || token.len() != 42 {
                    return Err(eyre::eyre!(
                        "Invalid valuable token address '{}' on chain '{}'",
                        token,
                        chain.name
                    ));
                }
            }
        }
        if self.notifications.telegram_enabled
            && (self.notifications.telegram_bot_token.is_none()
                || self.notifications.telegram_chat_id.is_none())
        {
            return Err(eyre::eyre!(
                "telegram_enabled requires telegram_bot_token and telegram_chat_id"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[database]
url = "postgres://localhost/test"
max_connections = 5

[scanner]
poll_interval_ms = 5000

[[chains]]
name = "ethereum"
chain_id = 1
rpc_http = "http://localhost:8545"
valuable_tokens = ["0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"]
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].name, "ethereum");
        assert_eq!(config.chains[0].chain_id, 1);
        assert_eq!(config.chains[0].confirmations, 12); // default
        assert_eq!(config.chains[0].batch_size_blocks, 500); // default
        assert_eq!(config.scanner.poll_interval_ms, 5000);
        assert_eq!(config.scanner.events_per_digest, 10); // default
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_chains() {
        let config = Config {
            database: DatabaseConfig {
                url: "postgres://localhost/test".to_string(),
                max_connections: 5,
            },
            chains: vec![],
            scanner: ScannerConfig::default(),
            notifications: NotificationConfig::default(),
            api: ApiConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_valuable_token() {
        let toml_str = r#"
[database]
url = "postgres://localhost/test"

[[chains]]
name = "ethereum"
chain_id = 1
rpc_http = "http://localhost:8545"
valuable_tokens = ["not-an-address"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_telegram_requires_credentials() {
        let toml_str = r#"
[database]
url = "postgres://localhost/test"

[notifications]
telegram_enabled = true

[[chains]]
name = "ethereum"
chain_id = 1
rpc_http = "http://localhost:8545"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub clob: ClobConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Settlement chain id (Polygon mainnet)
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// Primary JSON-RPC endpoint
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Fallback JSON-RPC endpoint used when the primary is unreachable
    #[serde(default = "default_fallback_rpc_url")]
    pub fallback_rpc_url: String,
    /// Bridged USDC.e — the collateral the exchange settles in
    #[serde(default = "default_usdc_bridged")]
    pub usdc_bridged: String,
    /// Native (canonical) USDC — held by users but not accepted directly
    #[serde(default = "default_usdc_native")]
    pub usdc_native: String,
    /// CTF Exchange (standard markets)
    #[serde(default = "default_ctf_exchange")]
    pub ctf_exchange: String,
    /// Neg Risk CTF Exchange (neg-risk markets)
    #[serde(default = "default_neg_risk_exchange")]
    pub neg_risk_exchange: String,
    /// Neg Risk Adapter
    #[serde(default = "default_neg_risk_adapter")]
    pub neg_risk_adapter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClobConfig {
    /// CLOB REST API base URL
    #[serde(default = "default_clob_url")]
    pub clob_url: String,
    /// API key (L2 auth) - loaded from env POLY_API_KEY
    #[serde(default)]
    pub api_key: String,
    /// API secret (L2 auth) - loaded from env POLY_API_SECRET
    #[serde(default)]
    pub api_secret: String,
    /// API passphrase (L2 auth) - loaded from env POLY_API_PASSPHRASE
    #[serde(default)]
    pub api_passphrase: String,
    /// Signing key, env-only (POLY_PRIVATE_KEY). Never read from file.
    #[serde(skip)]
    pub private_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Minimum number of legs per parlay.
    #[serde(default = "default_min_legs")]
    pub min_legs: usize,
    /// Minimum total stake in USDC.
    #[serde(default = "default_min_total_stake")]
    pub min_total_stake: Decimal,
    /// Pause between consecutive wallet signature prompts, in milliseconds.
    #[serde(default = "default_sign_delay_ms")]
    pub sign_delay_ms: u64,
    /// Fill poller tick interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Allowance floor multiplier over the requested amount.
    #[serde(default = "default_allowance_buffer")]
    pub allowance_buffer: Decimal,
    /// Where submitted parlays are appended (JSON lines, best effort).
    #[serde(default = "default_history_path")]
    pub history_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_chain_id() -> u64 {
    137
}
fn default_rpc_url() -> String {
    "https://polygon-rpc.com".to_string()
}
fn default_fallback_rpc_url() -> String {
    "https://polygon-bor-rpc.publicnode.com".to_string()
}
fn default_usdc_bridged() -> String {
    "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".to_string()
}
fn default_usdc_native() -> String {
    "0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359".to_string()
}
fn default_ctf_exchange() -> String {
    "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E".to_string()
}
fn default_neg_risk_exchange() -> String {
    "0xC5d563A36AE78145C45a50134d48A1215220f80a".to_string()
}
fn default_neg_risk_adapter() -> String {
    "0xd91E80cF2E7be2e162c6513ceD06f1dD0dA35296".to_string()
}
fn default_clob_url() -> String {
    "https://clob.polymarket.com".to_string()
}
fn default_min_legs() -> usize {
    2
}
fn default_min_total_stake() -> Decimal {
    Decimal::from(5)
}
fn default_sign_delay_ms() -> u64 {
    500
}
fn default_poll_interval_ms() -> u64 {
    2000
}
fn default_allowance_buffer() -> Decimal {
    Decimal::new(11, 1)
}
fn default_history_path() -> String {
    "parlay_history.jsonl".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
            fallback_rpc_url: default_fallback_rpc_url(),
            usdc_bridged: default_usdc_bridged(),
            usdc_native: default_usdc_native(),
            ctf_exchange: default_ctf_exchange(),
            neg_risk_exchange: default_neg_risk_exchange(),
            neg_risk_adapter: default_neg_risk_adapter(),
        }
    }
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            clob_url: default_clob_url(),
            api_key: String::new(),
            api_secret: String::new(),
            api_passphrase: String::new(),
            private_key: String::new(),
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            min_legs: default_min_legs(),
            min_total_stake: default_min_total_stake(),
            sign_delay_ms: default_sign_delay_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            allowance_buffer: default_allowance_buffer(),
            history_path: default_history_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.overlay_env();
        Ok(config)
    }

    /// Load a default config with env-only secrets (no file needed).
    pub fn from_env() -> Self {
        let mut config = Config {
            chain: ChainConfig::default(),
            clob: ClobConfig::default(),
            trading: TradingConfig::default(),
            logging: LoggingConfig::default(),
        };
        if let Ok(url) = std::env::var("POLY_CLOB_URL") {
            config.clob.clob_url = url;
        }
        if let Ok(url) = std::env::var("POLYGON_RPC_URL") {
            config.chain.rpc_url = url;
        }
        config.overlay_env();
        config
    }

    /// Override secrets from environment variables (never stored in config file).
    fn overlay_env(&mut self) {
        if let Ok(key) = std::env::var("POLY_API_KEY") {
            self.clob.api_key = key;
        }
        if let Ok(secret) = std::env::var("POLY_API_SECRET") {
            self.clob.api_secret = secret;
        }
        if let Ok(pass) = std::env::var("POLY_API_PASSPHRASE") {
            self.clob.api_passphrase = pass;
        }
        if let Ok(pk) = std::env::var("POLY_PRIVATE_KEY") {
            self.clob.private_key = pk;
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.clob.api_key.is_empty()
            && !self.clob.api_secret.is_empty()
            && !self.clob.api_passphrase.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_cover_every_section() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.chain.chain_id, 137);
        assert_eq!(config.trading.min_legs, 2);
        assert_eq!(config.trading.min_total_stake, dec!(5));
        assert_eq!(config.trading.poll_interval_ms, 2000);
        assert_eq!(config.trading.allowance_buffer, dec!(1.1));
        assert!(!config.has_credentials());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [trading]
            min_total_stake = "10"
            sign_delay_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.trading.min_total_stake, dec!(10));
        assert_eq!(config.trading.sign_delay_ms, 250);
        assert_eq!(config.trading.min_legs, 2);
        assert_eq!(config.clob.clob_url, "https://clob.polymarket.com");
    }
}

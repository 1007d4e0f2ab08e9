use crate::arena::AppMode;
use alloy::primitives::Address;
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required env var: {0}")]
    MissingEnv(String),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Postgres connection string - loaded from env DATABASE_URL
    #[serde(default)]
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Create the arenas table and indexes on startup if missing.
    #[serde(default = "default_true")]
    pub init_schema: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    /// twitterapi.io key - loaded from env TWITTER_API_IO_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_search_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    /// OpenAI key - loaded from env OPENAI_API_KEY. Empty disables labeling.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_classifier_base_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_model")]
    pub model: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint - loaded from env RPC_URL_BASE_SEPOLIA
    #[serde(default)]
    pub rpc_url: String,
    /// Oracle signing key - loaded from env ORACLE_PRIVATE_KEY
    #[serde(default)]
    pub oracle_private_key: String,
    /// Settlement contract - loaded from env BANGER_ARENAS_ADDRESS
    #[serde(default)]
    pub contract_address: String,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// How long to wait for a resolution receipt before giving up.
    #[serde(default = "default_receipt_timeout_secs")]
    pub receipt_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    #[serde(default)]
    pub mode: AppMode,
    #[serde(default = "default_discovery_interval_ms")]
    pub discovery_interval_ms: u64,
    /// Defaults by mode when unset.
    #[serde(default)]
    pub resolution_interval_ms: Option<u64>,
    /// Upper bound on a single tick before its guard is released.
    #[serde(default = "default_tick_timeout_secs")]
    pub tick_timeout_secs: u64,
    /// Heal local rows that the ledger already resolved.
    #[serde(default)]
    pub reconcile_ledger: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_max_connections() -> u32 {
    5
}
fn default_true() -> bool {
    true
}
fn default_search_base_url() -> String {
    "https://api.twitterapi.io".to_string()
}
fn default_classifier_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_request_timeout_secs() -> u64 {
    15
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_receipt_timeout_secs() -> u64 {
    120
}
fn default_discovery_interval_ms() -> u64 {
    3 * 60 * 1000
}
fn default_tick_timeout_secs() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            max_connections: default_max_connections(),
            init_schema: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_search_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_classifier_base_url(),
            model: default_classifier_model(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: String::new(),
            oracle_private_key: String::new(),
            contract_address: String::new(),
            call_timeout_secs: default_call_timeout_secs(),
            receipt_timeout_secs: default_receipt_timeout_secs(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            mode: AppMode::default(),
            discovery_interval_ms: default_discovery_interval_ms(),
            resolution_interval_ms: None,
            tick_timeout_secs: default_tick_timeout_secs(),
            reconcile_ledger: false,
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

impl WorkerConfig {
    pub fn discovery_interval(&self) -> Duration {
        Duration::from_millis(self.discovery_interval_ms)
    }

    /// 1 min in demo, 20 min in prod, unless overridden.
    pub fn resolution_interval(&self) -> Duration {
        let ms = self.resolution_interval_ms.unwrap_or(match self.mode {
            AppMode::Demo => 60 * 1000,
            AppMode::Prod => 20 * 60 * 1000,
        });
        Duration::from_millis(ms)
    }

    pub fn tick_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_timeout_secs)
    }
}

impl LedgerConfig {
    pub fn address(&self) -> Result<Address, ConfigError> {
        Address::from_str(self.contract_address.trim()).map_err(|e| ConfigError::Invalid {
            key: "BANGER_ARENAS_ADDRESS".to_string(),
            reason: e.to_string(),
        })
    }
}

impl ClassifierConfig {
    pub fn enabled(&self) -> bool {
        !self.api_key.is_empty()
    }
}

impl Config {
    /// Load config from a TOML file, then overlay environment variables for secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build config from defaults and environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay recognized environment variables. `lookup` is injected so the
    /// overlay can be exercised without touching the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL").or_else(|| get("SUPABASE_DB_URL")) {
            self.store.database_url = url;
        }
        if let Some(key) = get("TWITTER_API_IO_KEY") {
            self.search.api_key = key;
        }
        if let Some(url) = get("TWITTER_API_IO_BASE_URL") {
            self.search.base_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.classifier.api_key = key;
        }
        if let Some(url) = get("RPC_URL_BASE_SEPOLIA") {
            self.ledger.rpc_url = url;
        }
        if let Some(key) = get("ORACLE_PRIVATE_KEY") {
            self.ledger.oracle_private_key = key;
        }
        if let Some(addr) = get("BANGER_ARENAS_ADDRESS") {
            self.ledger.contract_address = addr;
        }
        if let Some(mode) = get("APP_MODE") {
            self.worker.mode = AppMode::parse_lenient(&mode);
        }
        if let Some(ms) = get("DISCOVERY_INTERVAL_MS") {
            self.worker.discovery_interval_ms = parse_ms("DISCOVERY_INTERVAL_MS", &ms)?;
        }
        if let Some(ms) = get("RESOLUTION_INTERVAL_MS") {
            self.worker.resolution_interval_ms = Some(parse_ms("RESOLUTION_INTERVAL_MS", &ms)?);
        }
        Ok(())
    }

    /// Check that every required setting is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("DATABASE_URL", &self.store.database_url),
            ("TWITTER_API_IO_KEY", &self.search.api_key),
            ("RPC_URL_BASE_SEPOLIA", &self.ledger.rpc_url),
            ("ORACLE_PRIVATE_KEY", &self.ledger.oracle_private_key),
            ("BANGER_ARENAS_ADDRESS", &self.ledger.contract_address),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingEnv(key.to_string()));
            }
        }
        self.ledger.address()?;
        if self.worker.discovery_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "DISCOVERY_INTERVAL_MS".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.worker.resolution_interval_ms == Some(0) {
            return Err(ConfigError::Invalid {
                key: "RESOLUTION_INTERVAL_MS".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_ms(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ADDR: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            ("DATABASE_URL", "postgres://localhost/arenas"),
            ("TWITTER_API_IO_KEY", "tw-key"),
            ("RPC_URL_BASE_SEPOLIA", "https://sepolia.base.org"),
            ("ORACLE_PRIVATE_KEY", "0xabc"),
            ("BANGER_ARENAS_ADDRESS", ADDR),
        ])
    }

    fn build(vars: &HashMap<String, String>) -> Result<Config, ConfigError> {
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned())?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults_from_env() {
        let config = build(&full_env()).unwrap();
        assert_eq!(config.worker.mode, AppMode::Prod);
        assert_eq!(config.search.base_url, "https://api.twitterapi.io");
        assert_eq!(config.worker.discovery_interval(), Duration::from_secs(180));
        assert_eq!(config.worker.resolution_interval(), Duration::from_secs(20 * 60));
        assert!(!config.classifier.enabled());
        assert!(!config.worker.reconcile_ledger);
    }

    #[test]
    fn test_demo_mode_shortens_resolution_interval() {
        let mut vars = full_env();
        vars.insert("APP_MODE".into(), "Demo".into());
        let config = build(&vars).unwrap();
        assert_eq!(config.worker.mode, AppMode::Demo);
        assert_eq!(config.worker.resolution_interval(), Duration::from_secs(60));

        vars.insert("RESOLUTION_INTERVAL_MS".into(), "5000".into());
        let config = build(&vars).unwrap();
        assert_eq!(config.worker.resolution_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_required_value_is_reported() {
        for key in [
            "DATABASE_URL",
            "TWITTER_API_IO_KEY",
            "RPC_URL_BASE_SEPOLIA",
            "ORACLE_PRIVATE_KEY",
            "BANGER_ARENAS_ADDRESS",
        ] {
            let mut vars = full_env();
            vars.remove(key);
            match build(&vars) {
                Err(ConfigError::MissingEnv(k)) => assert_eq!(k, key),
                other => panic!("expected MissingEnv({key}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_supabase_db_url_fallback() {
        let mut vars = full_env();
        vars.remove("DATABASE_URL");
        vars.insert("SUPABASE_DB_URL".into(), "postgres://supabase/db".into());
        let config = build(&vars).unwrap();
        assert_eq!(config.store.database_url, "postgres://supabase/db");
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let mut vars = full_env();
        vars.insert("BANGER_ARENAS_ADDRESS".into(), "not-an-address".into());
        assert!(matches!(build(&vars), Err(ConfigError::Invalid { .. })));

        let mut vars = full_env();
        vars.insert("DISCOVERY_INTERVAL_MS".into(), "soon".into());
        assert!(matches!(build(&vars), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_toml_then_env_overlay() {
        let raw = r#"
            [search]
            base_url = "http://localhost:9999"
            request_timeout_secs = 3

            [worker]
            mode = "demo"
            discovery_interval_ms = 60000
            reconcile_ledger = true

            [logging]
            json = true
        "#;
        let mut config: Config = toml::from_str(raw).unwrap();
        config.apply_env(|k| full_env().get(k).cloned()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.search.base_url, "http://localhost:9999");
        assert_eq!(config.search.request_timeout_secs, 3);
        assert_eq!(config.worker.mode, AppMode::Demo);
        assert_eq!(config.worker.discovery_interval(), Duration::from_secs(60));
        assert!(config.worker.reconcile_ledger);
        assert!(config.logging.json);
        assert_eq!(config.ledger.call_timeout_secs, 30);
    }
}

//! Configuration for rt-investor
//!
//! Settings come from environment variables (optionally seeded from a
//! `.env` file). A single [`Config`] is built at process start and passed
//! by reference to every component that needs it.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Default WebSocket endpoint
pub const DEFAULT_WEBSOCKET_ENDPOINT: &str = "wss://example.com/stream";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed
    #[error("Invalid value for {var}: {value:?}")]
    InvalidVar { var: &'static str, value: String },
    /// Validation found one or more problems
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
    /// Filesystem error while preparing directories
    #[error("Failed to create directory {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Root configuration structure
#[derive(Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub data: DataConfig,
    pub backtest: BacktestSettings,
    pub logging: LoggingConfig,
    pub market: MarketConfig,
    pub strategy: StrategyConfig,
    pub features: FeatureFlags,
}

/// API credentials and endpoint
#[derive(Clone)]
pub struct ApiConfig {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub websocket_endpoint: String,
}

/// Data directories
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
}

/// Backtest capital and cost model
#[derive(Debug, Clone)]
pub struct BacktestSettings {
    pub initial_capital: Decimal,
    /// Commission as a fraction of notional (0.001 = 0.1%)
    pub commission: Decimal,
    /// Slippage as a fraction of notional
    pub slippage: Decimal,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

/// Market data configuration
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub default_symbols: Vec<String>,
}

/// Strategy configuration
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub strategy_name: String,
    /// Fraction of equity committed per trade
    pub risk_per_trade: Decimal,
}

/// Feature flags
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    pub enable_live_trading: bool,
    pub enable_notifications: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                api_key: None,
                api_secret: None,
                websocket_endpoint: DEFAULT_WEBSOCKET_ENDPOINT.to_string(),
            },
            data: DataConfig {
                data_dir: PathBuf::from("./data"),
                cache_dir: PathBuf::from("./cache"),
            },
            backtest: BacktestSettings {
                initial_capital: dec!(100000),
                commission: dec!(0.001),
                slippage: dec!(0.001),
            },
            logging: LoggingConfig {
                log_level: "INFO".to_string(),
                log_file: None,
            },
            market: MarketConfig {
                default_symbols: parse_symbols("AAPL,GOOGL,MSFT"),
            },
            strategy: StrategyConfig {
                strategy_name: "placeholder".to_string(),
                risk_per_trade: dec!(0.02),
            },
            features: FeatureFlags::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            api: ApiConfig {
                api_key: get("API_KEY"),
                api_secret: get("API_SECRET"),
                websocket_endpoint: get("WEBSOCKET_ENDPOINT")
                    .unwrap_or(defaults.api.websocket_endpoint),
            },
            data: DataConfig {
                data_dir: get("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data.data_dir),
                cache_dir: get("CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.data.cache_dir),
            },
            backtest: BacktestSettings {
                initial_capital: parse_var(
                    "INITIAL_CAPITAL",
                    get("INITIAL_CAPITAL"),
                    defaults.backtest.initial_capital,
                )?,
                commission: parse_var(
                    "COMMISSION",
                    get("COMMISSION"),
                    defaults.backtest.commission,
                )?,
                slippage: parse_var("SLIPPAGE", get("SLIPPAGE"), defaults.backtest.slippage)?,
            },
            logging: LoggingConfig {
                log_level: get("LOG_LEVEL").unwrap_or(defaults.logging.log_level),
                log_file: get("LOG_FILE").map(PathBuf::from),
            },
            market: MarketConfig {
                default_symbols: get("DEFAULT_SYMBOLS")
                    .map(|s| parse_symbols(&s))
                    .unwrap_or(defaults.market.default_symbols),
            },
            strategy: StrategyConfig {
                strategy_name: get("STRATEGY_NAME").unwrap_or(defaults.strategy.strategy_name),
                risk_per_trade: parse_var(
                    "RISK_PER_TRADE",
                    get("RISK_PER_TRADE"),
                    defaults.strategy.risk_per_trade,
                )?,
            },
            features: FeatureFlags {
                enable_live_trading: parse_flag(get("ENABLE_LIVE_TRADING")),
                enable_notifications: parse_flag(get("ENABLE_NOTIFICATIONS")),
            },
        };

        Ok(config)
    }

    /// Check that the configuration is usable
    ///
    /// Every problem found is reported, not just the first.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.features.enable_live_trading && self.api.api_key.is_none() {
            errors.push("API_KEY required for live trading".to_string());
        }
        if self.features.enable_live_trading && self.api.api_secret.is_none() {
            errors.push("API_SECRET required for live trading".to_string());
        }
        if self.backtest.initial_capital <= Decimal::ZERO {
            errors.push("INITIAL_CAPITAL must be positive".to_string());
        }
        if self.backtest.commission < Decimal::ZERO {
            errors.push("COMMISSION must not be negative".to_string());
        }
        if self.backtest.slippage < Decimal::ZERO {
            errors.push("SLIPPAGE must not be negative".to_string());
        }
        if self.backtest.commission + self.backtest.slippage >= Decimal::ONE {
            errors.push("COMMISSION plus SLIPPAGE must be below 1".to_string());
        }
        if self.strategy.risk_per_trade <= Decimal::ZERO
            || self.strategy.risk_per_trade > Decimal::ONE
        {
            errors.push("RISK_PER_TRADE must be in (0, 1]".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            for error in &errors {
                tracing::error!(%error, "Configuration error");
            }
            Err(ConfigError::Invalid(errors))
        }
    }

    /// Non-fatal problems worth logging once telemetry is up
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();
        if self.api.api_key.is_none() {
            warnings.push("API_KEY not set in environment variables");
        }
        warnings
    }

    /// Create the data and cache directories if missing
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for dir in [&self.data.data_dir, &self.data.cache_dir] {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_secret", &redact(&self.api_secret))
            .field("websocket_endpoint", &self.websocket_endpoint)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("websocket_endpoint", &self.api.websocket_endpoint)
            .field("strategy", &self.strategy.strategy_name)
            .field("symbols", &self.market.default_symbols)
            .field("api_key", &redact(&self.api.api_key))
            .finish()
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "***"
    } else {
        "None"
    }
}

/// Split a comma-separated symbol list, trimming and uppercasing
pub fn parse_symbols(s: &str) -> Vec<String> {
    s.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_flag(value: Option<String>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn parse_var<T: FromStr>(
    var: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { var, value: v }),
    }
}

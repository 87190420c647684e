// src/config.rs
use crate::error::ConfigError;
use crate::models::Theme;
use log::LevelFilter;
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_MOVERS: [&str; 20] = [
    "AAPL", "MSFT", "GOOG", "AMZN", "META", "TSLA", "NFLX", "NVDA", "BABA", "INTC", "AMD", "CRM",
    "ORCL", "PYPL", "UBER", "LYFT", "SHOP", "SQ", "ZM", "PINS",
];

#[derive(Debug, Clone, PartialEq)]
pub enum StorageBackend {
    File(PathBuf),
    Scylla(String),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: SocketAddr,
    pub log_level: LevelFilter,
    pub storage: StorageBackend,
    pub api_key: String,
    pub base_url: String,
    pub movers: Vec<String>,
    pub default_theme: Theme,
}

impl Config {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let bind_raw = get("STOCK_WATCH_BIND", "127.0.0.1:3030");
        let bind: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "STOCK_WATCH_BIND",
            value: bind_raw.clone(),
        })?;

        let level_raw = get("STOCK_WATCH_LOG", "info");
        let log_level: LevelFilter = level_raw.parse().map_err(|_| ConfigError::Invalid {
            key: "STOCK_WATCH_LOG",
            value: level_raw.clone(),
        })?;

        let storage = match get("STOCK_WATCH_STORAGE", "file").as_str() {
            "file" => StorageBackend::File(get("STOCK_WATCH_DATA_FILE", "stock_watch.json").into()),
            "scylla" => StorageBackend::Scylla(get("SCYLLA_NODE", "127.0.0.1:9042")),
            "memory" => StorageBackend::Memory,
            other => {
                return Err(ConfigError::Invalid {
                    key: "STOCK_WATCH_STORAGE",
                    value: other.to_string(),
                })
            }
        };

        let theme_raw = get("STOCK_WATCH_DEFAULT_THEME", "light");
        let default_theme = Theme::parse(&theme_raw).ok_or(ConfigError::Invalid {
            key: "STOCK_WATCH_DEFAULT_THEME",
            value: theme_raw.clone(),
        })?;

        let movers = match lookup("STOCK_WATCH_MOVERS") {
            Some(list) if !list.trim().is_empty() => list
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            _ => DEFAULT_MOVERS.iter().map(|s| s.to_string()).collect(),
        };

        Ok(Self {
            bind,
            log_level,
            storage,
            api_key: get("TWELVE_DATA_API_KEY", "demo"),
            base_url: get("TWELVE_DATA_BASE_URL", "https://api.twelvedata.com"),
            movers,
            default_theme,
        })
    }
}

//! Engine configuration
//!
//! Read-only values consumed by the pipeline: backend selection, connection
//! parameters, safety thresholds and cache policy. Loaded from the
//! environment (with `.env` support) or from a JSON file.

use crate::error::{QueryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Which backend to connect to, with its connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Postgres {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Mysql {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    Sqlite {
        path: String,
    },
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Postgres { .. } => "postgres",
            BackendConfig::Mysql { .. } => "mysql",
            BackendConfig::Sqlite { .. } => "sqlite",
        }
    }
}

/// Full configuration surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub backend: BackendConfig,

    /// Skip the confirmation requirement for destructive statements
    #[serde(default)]
    pub allow_destructive_queries: bool,

    /// Complexity score above which a warning is attached
    #[serde(default = "default_max_complexity")]
    pub max_query_complexity: u32,

    /// Query timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub query_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub enable_schema_cache: bool,

    /// Cached schema entries older than this are re-introspected (None = never expire)
    #[serde(default)]
    pub schema_cache_ttl_secs: Option<u64>,

    /// Restrict statements to these tables (empty = no restriction)
    #[serde(default)]
    pub allowed_tables: Vec<String>,

    /// Per-table override for the column used by recency filters
    #[serde(default)]
    pub timestamp_columns: HashMap<String, String>,

    #[serde(default = "default_true")]
    pub log_queries: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// The validator's share of the configuration. Loads without any backend
/// settings, so statements can be checked offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySettings {
    #[serde(default)]
    pub allow_destructive_queries: bool,

    #[serde(default = "default_max_complexity")]
    pub max_query_complexity: u32,

    #[serde(default)]
    pub allowed_tables: Vec<String>,
}

impl Default for SafetySettings {
    fn default() -> Self {
        Self {
            allow_destructive_queries: false,
            max_query_complexity: default_max_complexity(),
            allowed_tables: Vec::new(),
        }
    }
}

impl SafetySettings {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Safety keys of a full configuration file; `backend` may be absent
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&content)?)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let allowed_tables = lookup("ALLOWED_TABLES")
            .map(|tables| {
                tables
                    .split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            allow_destructive_queries: parse_bool_or(&lookup, "ALLOW_DESTRUCTIVE_QUERIES", false)?,
            max_query_complexity: parse_or(&lookup, "MAX_QUERY_COMPLEXITY", default_max_complexity())?,
            allowed_tables,
        })
    }
}

impl From<&EngineConfig> for SafetySettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            allow_destructive_queries: config.allow_destructive_queries,
            max_query_complexity: config.max_query_complexity,
            allowed_tables: config.allowed_tables.clone(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_max_complexity() -> u32 {
    100
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl EngineConfig {
    /// Configuration with defaults for everything except the backend.
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            allow_destructive_queries: false,
            max_query_complexity: default_max_complexity(),
            query_timeout_ms: default_timeout_ms(),
            enable_schema_cache: true,
            schema_cache_ttl_secs: None,
            allowed_tables: Vec::new(),
            timestamp_columns: HashMap::new(),
            log_queries: true,
            log_level: default_log_level(),
        }
    }

    /// Load configuration from environment variables (and `.env` if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let backend_kind = lookup("QUERYGATE_BACKEND").unwrap_or_else(|| "postgres".to_string());
        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", default_max_connections())?;

        let backend = match backend_kind.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => BackendConfig::Postgres {
                url: require(&lookup, "DATABASE_URL")?,
                max_connections,
            },
            "mysql" => BackendConfig::Mysql {
                url: require(&lookup, "DATABASE_URL")?,
                max_connections,
            },
            "sqlite" => BackendConfig::Sqlite {
                path: lookup("SQLITE_PATH")
                    .or_else(|| lookup("DATABASE_URL"))
                    .ok_or_else(|| {
                        QueryError::Configuration("SQLITE_PATH not set for sqlite backend".to_string())
                    })?,
            },
            other => {
                return Err(QueryError::Configuration(format!(
                    "Unknown backend '{}' (expected postgres, mysql or sqlite)",
                    other
                )))
            }
        };

        let safety = SafetySettings::from_lookup(&lookup)?;
        let mut config = EngineConfig::new(backend);
        config.allow_destructive_queries = safety.allow_destructive_queries;
        config.max_query_complexity = safety.max_query_complexity;
        config.allowed_tables = safety.allowed_tables;
        config.query_timeout_ms = parse_or(&lookup, "QUERY_TIMEOUT_MS", default_timeout_ms())?;
        config.enable_schema_cache = parse_bool_or(&lookup, "ENABLE_SCHEMA_CACHE", true)?;
        config.schema_cache_ttl_secs = match lookup("SCHEMA_CACHE_TTL_SECS") {
            Some(raw) => Some(parse_value("SCHEMA_CACHE_TTL_SECS", &raw)?),
            None => None,
        };
        config.log_queries = parse_bool_or(&lookup, "LOG_QUERIES", true)?;
        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot start with
    pub fn validate(&self) -> Result<()> {
        match &self.backend {
            BackendConfig::Postgres { url, max_connections }
            | BackendConfig::Mysql { url, max_connections } => {
                if url.trim().is_empty() {
                    return Err(QueryError::Configuration(format!(
                        "{} backend requires a connection URL",
                        self.backend.kind()
                    )));
                }
                if *max_connections == 0 {
                    return Err(QueryError::Configuration(
                        "max_connections must be at least 1".to_string(),
                    ));
                }
            }
            BackendConfig::Sqlite { path } => {
                if path.trim().is_empty() {
                    return Err(QueryError::Configuration("sqlite backend requires a path".to_string()));
                }
            }
        }

        if self.query_timeout_ms == 0 {
            return Err(QueryError::Configuration("query_timeout_ms must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn schema_cache_ttl(&self) -> Option<Duration> {
        self.schema_cache_ttl_secs.map(Duration::from_secs)
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| QueryError::Configuration(format!("{} not set", key)))
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| QueryError::Configuration(format!("Invalid value for {}: '{}'", key, raw)))
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_bool_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(QueryError::Configuration(format!("Invalid boolean for {}: '{}'", key, raw))),
        },
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_defaults_follow_settings() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("QUERYGATE_BACKEND", "postgres"),
            ("DATABASE_URL", "postgres://localhost/app"),
        ]))
        .unwrap();

        assert_eq!(config.backend.kind(), "postgres");
        assert!(!config.allow_destructive_queries);
        assert_eq!(config.max_query_complexity, 100);
        assert_eq!(config.query_timeout(), Duration::from_millis(30_000));
        assert!(config.enable_schema_cache);
        assert!(config.schema_cache_ttl().is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("QUERYGATE_BACKEND", "sqlite"),
            ("SQLITE_PATH", ":memory:"),
            ("ALLOW_DESTRUCTIVE_QUERIES", "yes"),
            ("MAX_QUERY_COMPLEXITY", "40"),
            ("SCHEMA_CACHE_TTL_SECS", "60"),
            ("ALLOWED_TABLES", "users, orders,"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendConfig::Sqlite { path: ":memory:".to_string() });
        assert!(config.allow_destructive_queries);
        assert_eq!(config.max_query_complexity, 40);
        assert_eq!(config.schema_cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(config.allowed_tables, vec!["users", "orders"]);
    }

    #[test]
    fn test_missing_url_is_configuration_error() {
        let err = EngineConfig::from_lookup(lookup_from(&[("QUERYGATE_BACKEND", "mysql")])).unwrap_err();
        assert!(matches!(err, QueryError::Configuration(_)));
        assert_eq!(err.stage(), "configuration");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[("QUERYGATE_BACKEND", "oracle")])).unwrap_err();
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_invalid_boolean_rejected() {
        let err = EngineConfig::from_lookup(lookup_from(&[
            ("QUERYGATE_BACKEND", "sqlite"),
            ("SQLITE_PATH", "app.db"),
            ("ENABLE_SCHEMA_CACHE", "maybe"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("ENABLE_SCHEMA_CACHE"));
    }

    #[test]
    fn test_safety_settings_need_no_backend() {
        let settings = SafetySettings::from_lookup(lookup_from(&[
            ("MAX_QUERY_COMPLEXITY", "25"),
            ("ALLOWED_TABLES", "users"),
        ]))
        .unwrap();
        assert_eq!(settings.max_query_complexity, 25);
        assert_eq!(settings.allowed_tables, vec!["users"]);
        assert!(!settings.allow_destructive_queries);

        assert_eq!(SafetySettings::from_lookup(lookup_from(&[])).unwrap(), SafetySettings::default());

        let from_json: SafetySettings =
            serde_json::from_str(r#"{ "backend": { "type": "postgres", "url": "" }, "allow_destructive_queries": true }"#)
                .unwrap();
        assert!(from_json.allow_destructive_queries);
        assert_eq!(from_json.max_query_complexity, 100);
    }

    #[test]
    fn test_json_config_uses_defaults() {
        let json = r#"{ "backend": { "type": "mysql", "url": "mysql://root@localhost/shop" } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Mysql {
                url: "mysql://root@localhost/shop".to_string(),
                max_connections: 10
            }
        );
        assert_eq!(config.query_timeout_ms, 30_000);
        assert!(config.log_queries);
        config.validate().unwrap();
    }
}

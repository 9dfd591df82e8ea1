//! Configuration Module
//!
//! Per-namespace cache policy, loaded from environment variables or JSON and
//! validated once when the cache manager is built.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::MAX_TTL;
use crate::error::{ConfigError, Result};

/// Default number of entries per namespace.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Default fresh window for entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Name used in errors about [`CacheConfig::defaults`].
const DEFAULTS_NAME: &str = "<defaults>";

// == Namespace Config ==
/// Policy for one namespace.
///
/// Durations deserialize from humantime strings such as `"5m"` or `"250ms"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceConfig {
    /// Maximum number of entries held at once
    pub capacity: usize,
    /// How long an entry is served as fresh
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// How long past its TTL an entry may still be served while it is
    /// refreshed in the background; zero disables stale-while-revalidate
    #[serde(with = "humantime_serde")]
    pub stale_grace: Duration,
    /// Interval of the background expiration sweep, disabled when `None`
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Option<Duration>,
}

impl NamespaceConfig {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            ..Self::default()
        }
    }

    pub fn with_stale_grace(mut self, stale_grace: Duration) -> Self {
        self.stale_grace = stale_grace;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn swr_enabled(&self) -> bool {
        !self.stale_grace.is_zero()
    }

    // == Validate ==
    /// Checks the policy, naming `namespace` in any error.
    pub fn validate(&self, namespace: &str) -> Result<()> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity {
                namespace: namespace.to_string(),
            });
        }
        if self.ttl.is_zero() {
            return Err(ConfigError::InvalidTtl {
                namespace: namespace.to_string(),
                reason: "ttl must be non-zero".to_string(),
            });
        }
        if self.ttl > MAX_TTL || self.stale_grace > MAX_TTL {
            return Err(ConfigError::InvalidTtl {
                namespace: namespace.to_string(),
                reason: format!(
                    "ttl and stale grace must not exceed {}",
                    humantime::format_duration(MAX_TTL)
                ),
            });
        }
        if self.sweep_interval.is_some_and(|interval| interval.is_zero()) {
            return Err(ConfigError::InvalidSweepInterval {
                namespace: namespace.to_string(),
            });
        }
        Ok(())
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
            stale_grace: Duration::ZERO,
            sweep_interval: None,
        }
    }
}

// == Cache Config ==
/// Static mapping from namespace name to policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Policy for namespaces created on first use
    pub defaults: NamespaceConfig,
    /// Explicitly configured namespaces, created when the manager starts
    pub namespaces: HashMap<String, NamespaceConfig>,
    /// Whether unknown namespace names are created lazily. When false they
    /// behave as an unavailable cache: reads miss and writes are dropped.
    pub dynamic_namespaces: bool,
}

impl CacheConfig {
    pub fn with_namespace(mut self, name: impl Into<String>, config: NamespaceConfig) -> Self {
        self.namespaces.insert(name.into(), config);
        self
    }

    pub fn with_defaults(mut self, defaults: NamespaceConfig) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_dynamic_namespaces(mut self, enabled: bool) -> Self {
        self.dynamic_namespaces = enabled;
        self
    }

    /// Policy that applies to `namespace`, if it may exist at all.
    pub fn namespace_config(&self, namespace: &str) -> Option<&NamespaceConfig> {
        match self.namespaces.get(namespace) {
            Some(config) => Some(config),
            None if self.dynamic_namespaces => Some(&self.defaults),
            None => None,
        }
    }

    // == Validate ==
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate(DEFAULTS_NAME)?;
        for (name, config) in &self.namespaces {
            config.validate(name)?;
        }
        Ok(())
    }

    // == Load From JSON ==
    /// Parses and validates a JSON document.
    ///
    /// # Example
    /// ```
    /// use mini_cache::CacheConfig;
    ///
    /// let config = CacheConfig::from_json_str(
    ///     r#"{"namespaces": {"users": {"capacity": 500, "ttl": "1m", "stale_grace": "5m"}}}"#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.namespaces["users"].capacity, 500);
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    // == Load From Env ==
    /// Creates a CacheConfig whose defaults come from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Entries per namespace (default: 1000)
    /// - `CACHE_TTL` - Fresh window, humantime (default: 5m)
    /// - `CACHE_STALE_GRACE` - Stale window, humantime (default: 0s, SWR off)
    /// - `CACHE_SWEEP_INTERVAL` - Sweep interval, humantime or `off` (default: off)
    /// - `CACHE_DYNAMIC_NAMESPACES` - `true`/`false` (default: true)
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(capacity) = env_value("CACHE_CAPACITY", |v| usize::from_str(v).ok())? {
            config.defaults.capacity = capacity;
        }
        if let Some(ttl) = env_value("CACHE_TTL", parse_duration)? {
            config.defaults.ttl = ttl;
        }
        if let Some(grace) = env_value("CACHE_STALE_GRACE", parse_duration)? {
            config.defaults.stale_grace = grace;
        }
        if let Some(interval) = env_value("CACHE_SWEEP_INTERVAL", |v| match v {
            "off" | "none" => Some(None),
            other => parse_duration(other).map(Some),
        })? {
            config.defaults.sweep_interval = interval;
        }
        if let Some(dynamic) = env_value("CACHE_DYNAMIC_NAMESPACES", |v| bool::from_str(v).ok())? {
            config.dynamic_namespaces = dynamic;
        }

        config.validate()?;
        Ok(config)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            defaults: NamespaceConfig::default(),
            namespaces: HashMap::new(),
            dynamic_namespaces: true,
        }
    }
}

fn parse_duration(value: &str) -> Option<Duration> {
    humantime::parse_duration(value).ok()
}

/// Reads `var`, returning `None` when unset and an error when unparsable.
fn env_value<T>(var: &str, parse: impl FnOnce(&str) -> Option<T>) -> Result<Option<T>> {
    match env::var(var) {
        Ok(value) => parse(value.trim())
            .map(Some)
            .ok_or_else(|| ConfigError::Env {
                var: var.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.defaults.capacity, 1000);
        assert_eq!(config.defaults.ttl, Duration::from_secs(300));
        assert_eq!(config.defaults.stale_grace, Duration::ZERO);
        assert_eq!(config.defaults.sweep_interval, None);
        assert!(config.dynamic_namespaces);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("CACHE_CAPACITY", "64");
        env::set_var("CACHE_TTL", "30s");
        env::set_var("CACHE_STALE_GRACE", "2m");
        env::set_var("CACHE_SWEEP_INTERVAL", "off");
        env::set_var("CACHE_DYNAMIC_NAMESPACES", "false");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.defaults.capacity, 64);
        assert_eq!(config.defaults.ttl, Duration::from_secs(30));
        assert_eq!(config.defaults.stale_grace, Duration::from_secs(120));
        assert_eq!(config.defaults.sweep_interval, None);
        assert!(!config.dynamic_namespaces);

        env::set_var("CACHE_TTL", "soon");
        let err = CacheConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Env { ref var, .. } if var == "CACHE_TTL"));

        env::remove_var("CACHE_CAPACITY");
        env::remove_var("CACHE_TTL");
        env::remove_var("CACHE_STALE_GRACE");
        env::remove_var("CACHE_SWEEP_INTERVAL");
        env::remove_var("CACHE_DYNAMIC_NAMESPACES");

        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_config_from_json() {
        let config = CacheConfig::from_json_str(
            r#"{
                "defaults": {"capacity": 10, "ttl": "1s"},
                "namespaces": {
                    "users": {"capacity": 2, "ttl": "10ms", "stale_grace": "50ms", "sweep_interval": "1s"}
                },
                "dynamic_namespaces": false
            }"#,
        )
        .unwrap();

        assert_eq!(config.defaults.capacity, 10);
        let users = &config.namespaces["users"];
        assert_eq!(users.ttl, Duration::from_millis(10));
        assert_eq!(users.stale_grace, Duration::from_millis(50));
        assert_eq!(users.sweep_interval, Some(Duration::from_secs(1)));
        assert!(users.swr_enabled());
        assert!(!config.dynamic_namespaces);
    }

    #[test]
    fn test_config_from_malformed_json() {
        let err = CacheConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let config =
            CacheConfig::default().with_namespace("users", NamespaceConfig::new(0, DEFAULT_TTL));
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidCapacity { ref namespace } if namespace == "users")
        );
    }

    #[test]
    fn test_validate_rejects_bad_ttl() {
        let zero = NamespaceConfig::new(10, Duration::ZERO);
        assert!(matches!(zero.validate("a"), Err(ConfigError::InvalidTtl { .. })));

        let huge = NamespaceConfig::new(10, DEFAULT_TTL).with_stale_grace(MAX_TTL * 2);
        assert!(matches!(huge.validate("a"), Err(ConfigError::InvalidTtl { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_sweep_interval() {
        let config = NamespaceConfig::default().with_sweep_interval(Duration::ZERO);
        assert!(matches!(
            config.validate("a"),
            Err(ConfigError::InvalidSweepInterval { .. })
        ));
    }

    #[test]
    fn test_namespace_config_lookup() {
        let users = NamespaceConfig::new(5, Duration::from_secs(1));
        let config = CacheConfig::default().with_namespace("users", users.clone());

        assert_eq!(config.namespace_config("users"), Some(&users));
        assert_eq!(config.namespace_config("posts"), Some(&config.defaults));

        let strict = config.with_dynamic_namespaces(false);
        assert_eq!(strict.namespace_config("posts"), None);
        assert!(strict.namespace_config("users").is_some());
    }
}

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub log_filter: String,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub factory: FactoryConfig,
    pub resolution: ResolutionConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Landlord database URL; tenant URLs are derived from it
    pub landlord_url: String,
    pub landlord_max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_connections: usize,
    pub ttl_ms: u64,
    pub sweep_interval_ms: u64,
    /// Oldest entries examined per capacity eviction
    pub eviction_batch: usize,
    pub close_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub connect_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub tenant_pool_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    pub header: String,
    pub query_param: String,
    pub body_field: String,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            ttl_ms: 30 * 60 * 1000,
            sweep_interval_ms: 10 * 60 * 1000,
            eviction_batch: 10,
            close_timeout_ms: 5_000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            idle_timeout_ms: 60_000,
            tenant_pool_size: 5,
        }
    }
}

impl FactoryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            header: "x-tenant-id".to_string(),
            query_param: "tenant".to_string(),
            body_field: "tenant".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build config from an arbitrary variable source (tests pass a map)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(lookup)
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parse_into<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
            if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
                *target = parsed;
            }
        }

        if let Some(v) = lookup("RUST_LOG") {
            self.log_filter = v;
        }

        // Database overrides
        if let Some(v) = lookup("DATABASE_URL") {
            self.database.landlord_url = v;
        }
        parse_into(lookup("DATABASE_MAX_CONNECTIONS"), &mut self.database.landlord_max_connections);

        // Cache overrides
        parse_into(lookup("TENANT_CACHE_MAX_CONNECTIONS"), &mut self.cache.max_connections);
        parse_into(lookup("TENANT_CACHE_TTL_MS"), &mut self.cache.ttl_ms);
        parse_into(lookup("TENANT_CACHE_SWEEP_INTERVAL_MS"), &mut self.cache.sweep_interval_ms);
        parse_into(lookup("TENANT_CACHE_EVICTION_BATCH"), &mut self.cache.eviction_batch);
        parse_into(lookup("TENANT_CACHE_CLOSE_TIMEOUT_MS"), &mut self.cache.close_timeout_ms);

        // Factory overrides
        parse_into(lookup("TENANT_CONNECT_TIMEOUT_MS"), &mut self.factory.connect_timeout_ms);
        parse_into(lookup("TENANT_IDLE_TIMEOUT_MS"), &mut self.factory.idle_timeout_ms);
        parse_into(lookup("TENANT_POOL_SIZE"), &mut self.factory.tenant_pool_size);

        // Resolution overrides
        if let Some(v) = lookup("TENANT_HEADER") {
            self.resolution.header = v.trim().to_ascii_lowercase();
        }
        if let Some(v) = lookup("TENANT_QUERY_PARAM") {
            self.resolution.query_param = v.trim().to_string();
        }
        if let Some(v) = lookup("TENANT_BODY_FIELD") {
            self.resolution.body_field = v.trim().to_string();
        }
        parse_into(lookup("TENANT_MAX_BODY_BYTES"), &mut self.resolution.max_body_bytes);

        // API overrides
        parse_into(
            lookup("TENANT_GATE_PORT").or_else(|| lookup("PORT")),
            &mut self.api.port,
        );
        parse_into(lookup("API_ENABLE_REQUEST_LOGGING"), &mut self.api.enable_request_logging);

        // Zero would disable the bound entirely
        self.cache.max_connections = self.cache.max_connections.max(1);
        self.cache.eviction_batch = self.cache.eviction_batch.max(1);

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            log_filter: "tenant_gate=debug,tower_http=debug,info".to_string(),
            database: DatabaseConfig {
                landlord_url: "postgres://postgres@localhost:5432/landlord".to_string(),
                landlord_max_connections: 10,
            },
            cache: CacheConfig::default(),
            factory: FactoryConfig {
                connect_timeout_ms: 10_000,
                ..FactoryConfig::default()
            },
            resolution: ResolutionConfig::default(),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            log_filter: "tenant_gate=debug,info".to_string(),
            database: DatabaseConfig {
                landlord_url: "postgres://postgres@localhost:5432/landlord".to_string(),
                landlord_max_connections: 20,
            },
            cache: CacheConfig::default(),
            factory: FactoryConfig::default(),
            resolution: ResolutionConfig::default(),
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            log_filter: "info".to_string(),
            database: DatabaseConfig {
                landlord_url: "postgres://postgres@localhost:5432/landlord".to_string(),
                landlord_max_connections: 50,
            },
            cache: CacheConfig::default(),
            factory: FactoryConfig {
                connect_timeout_ms: 3_000,
                ..FactoryConfig::default()
            },
            resolution: ResolutionConfig {
                max_body_bytes: 1024 * 1024, // 1MB
                ..ResolutionConfig::default()
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_development_config() {
        let config = config_from(&[]);
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.cache.max_connections, 50);
        assert_eq!(config.cache.ttl(), Duration::from_millis(1_800_000));
        assert_eq!(config.cache.sweep_interval(), Duration::from_millis(600_000));
        assert_eq!(config.resolution.header, "x-tenant-id");
    }

    #[test]
    fn test_default_production_config() {
        let config = config_from(&[("APP_ENV", "prod")]);
        assert_eq!(config.environment, Environment::Production);
        assert!(!config.api.enable_request_logging);
        assert_eq!(config.factory.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_env_overrides() {
        let config = config_from(&[
            ("TENANT_CACHE_MAX_CONNECTIONS", "2"),
            ("TENANT_CACHE_TTL_MS", "1000"),
            ("TENANT_CONNECT_TIMEOUT_MS", "250"),
            ("TENANT_HEADER", "X-Org"),
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://u:p@db/landlord"),
        ]);
        assert_eq!(config.cache.max_connections, 2);
        assert_eq!(config.cache.ttl_ms, 1000);
        assert_eq!(config.factory.connect_timeout_ms, 250);
        assert_eq!(config.resolution.header, "x-org");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.database.landlord_url, "postgres://u:p@db/landlord");
    }

    #[test]
    fn test_invalid_overrides_keep_defaults() {
        let config = config_from(&[
            ("TENANT_CACHE_MAX_CONNECTIONS", "lots"),
            ("TENANT_CACHE_EVICTION_BATCH", "0"),
        ]);
        assert_eq!(config.cache.max_connections, 50);
        assert_eq!(config.cache.eviction_batch, 1);
    }
}

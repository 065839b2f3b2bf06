use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub sales: SalesConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Without a URL the service runs on the in-memory store.
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SalesConfig {
    /// `completed_only` or `include_pending`; parsed by the sales engine.
    #[serde(default = "default_revenue_policy")]
    pub revenue_policy: String,
    #[serde(default = "default_top_products")]
    pub top_products_limit: usize,
}

impl Default for SalesConfig {
    fn default() -> Self {
        Self {
            revenue_policy: default_revenue_policy(),
            top_products_limit: default_top_products(),
        }
    }
}

fn default_revenue_policy() -> String {
    "completed_only".into()
}

fn default_top_products() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatchConfig {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `HARVEST__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("HARVEST").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Application configuration with validation. The webhook secret has no
/// default; callback verification is disabled-by-failure without it.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Bind host
    pub host: String,

    /// Bind port
    pub port: u16,

    /// Environment name (development, staging, production)
    pub environment: String,

    /// Log level filter
    pub log_level: String,

    /// Emit JSON-formatted logs
    pub log_json: bool,

    /// Run migrations on startup
    pub auto_migrate: bool,

    /// Payment gateway base URL
    pub gateway_url: String,

    /// Bounded timeout for gateway calls, in seconds
    pub gateway_timeout_secs: u64,

    /// Catalog service base URL for product lookups
    pub catalog_url: String,

    /// Shared secret for gateway callback signatures
    #[validate(length(min = 32))]
    pub payment_webhook_secret: String,

    /// Accepted clock skew for callback timestamps, in seconds
    pub payment_webhook_tolerance_secs: u64,

    /// Default order currency
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
}

impl AppConfig {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn gateway_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Loads configuration from `config/` files layered with `APP_`
/// environment overrides, selecting a profile via RUN_ENV or APP_ENV.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let builder = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("auto_migrate", true)?
        .set_default("gateway_url", "http://localhost:9090")?
        .set_default("gateway_timeout_secs", DEFAULT_GATEWAY_TIMEOUT_SECS as i64)?
        .set_default("catalog_url", "http://localhost:9091")?
        .set_default(
            "payment_webhook_secret",
            // Development-only; production deployments must override.
            "development_webhook_secret_at_least_32_chars",
        )?
        .set_default(
            "payment_webhook_tolerance_secs",
            DEFAULT_WEBHOOK_TOLERANCE_SECS as i64,
        )?
        .set_default("currency", "USD")?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"));

    let config: AppConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Initializes the tracing subscriber. RUST_LOG wins when set.
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);
    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

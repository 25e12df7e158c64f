use std::fmt;
use std::time::Duration;

use crate::consultation_store::WriteMode;

const DEFAULT_AREA_DATA_BASE_URL: &str = "https://parseapi.back4app.com";
const DEFAULT_MARKETPLACE_BASE_URL: &str = "https://marketplace.api.healthcare.gov";
const DEFAULT_STRIPE_BASE_URL: &str = "https://api.stripe.com";

/// Runtime configuration, loaded once at startup from the environment.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub area_data_base_url: String,
    pub area_data_app_id: String,
    pub area_data_api_key: String,
    pub marketplace_base_url: String,
    pub marketplace_api_key: String,
    /// Hospital search gateway; the hospital endpoints answer 500 when unset.
    pub hospital_gateway_url: Option<String>,
    pub stripe_base_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    /// Catalog price to charge; inline price data is used when unset.
    pub stripe_price_id: Option<String>,
    pub consultation_price_cents: i64,
    /// Fallback origin for checkout return URLs when the request has no `Origin`.
    pub public_base_url: String,
    pub write_mode: WriteMode,
    pub county_lookup_timeout_secs: u64,
    pub county_cache_ttl_secs: u64,
    pub webhook_tolerance_secs: i64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            area_data_base_url: url_var("BACK4APP_BASE_URL", DEFAULT_AREA_DATA_BASE_URL)?,
            area_data_app_id: required_var("BACK4APP_APP_ID_KEY")?,
            area_data_api_key: required_var("BACK4APP_API_KEY")?,
            marketplace_base_url: url_var("MARKETPLACE_BASE_URL", DEFAULT_MARKETPLACE_BASE_URL)?,
            marketplace_api_key: required_var("MARKETPLACE_CMS_API_KEY")?,
            hospital_gateway_url: optional_url_var(&[
                "API_GATEWAY_URL",
                "REACT_APP_API_GATEWAY_URL",
            ])?,
            stripe_base_url: url_var("STRIPE_BASE_URL", DEFAULT_STRIPE_BASE_URL)?,
            stripe_secret_key: required_var("STRIPE_SECRET_KEY")?,
            stripe_webhook_secret: required_var("STRIPE_WEBHOOK_SECRET")?,
            stripe_price_id: std::env::var("STRIPE_PRICE_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            consultation_price_cents: number_var("CONSULTATION_PRICE_CENTS", 1000)?,
            public_base_url: url_var("PUBLIC_BASE_URL", "http://localhost:3000")?,
            write_mode: std::env::var("CONSULTATION_WRITE_MODE")
                .unwrap_or_else(|_| "insert".to_string())
                .parse()?,
            county_lookup_timeout_secs: number_var("COUNTY_LOOKUP_TIMEOUT_SECS", 30)?,
            county_cache_ttl_secs: number_var("COUNTY_CACHE_TTL_SECS", 3600)?,
            webhook_tolerance_secs: number_var("WEBHOOK_TOLERANCE_SECS", 300)?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!("Area data base URL: {}", config.area_data_base_url);
        tracing::debug!("Marketplace base URL: {}", config.marketplace_base_url);
        tracing::debug!(
            "Hospital gateway URL: {}",
            config.hospital_gateway_url.as_deref().unwrap_or("not set")
        );
        tracing::debug!("Stripe base URL: {}", config.stripe_base_url);
        tracing::debug!(
            "Stripe price: {}",
            config.stripe_price_id.as_deref().unwrap_or("inline price data")
        );
        tracing::debug!("Consultation write mode: {:?}", config.write_mode);
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    pub fn county_lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.county_lookup_timeout_secs)
    }

    pub fn county_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.county_cache_ttl_secs)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("port", &self.port)
            .field("area_data_base_url", &self.area_data_base_url)
            .field("area_data_app_id", &presence(&self.area_data_app_id))
            .field("area_data_api_key", &presence(&self.area_data_api_key))
            .field("marketplace_base_url", &self.marketplace_base_url)
            .field("marketplace_api_key", &presence(&self.marketplace_api_key))
            .field("hospital_gateway_url", &self.hospital_gateway_url)
            .field("stripe_base_url", &self.stripe_base_url)
            .field("stripe_secret_key", &presence(&self.stripe_secret_key))
            .field("stripe_webhook_secret", &presence(&self.stripe_webhook_secret))
            .field("stripe_price_id", &self.stripe_price_id)
            .field("consultation_price_cents", &self.consultation_price_cents)
            .field("public_base_url", &self.public_base_url)
            .field("write_mode", &self.write_mode)
            .field("county_lookup_timeout_secs", &self.county_lookup_timeout_secs)
            .field("county_cache_ttl_secs", &self.county_cache_ttl_secs)
            .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
            .finish()
    }
}

/// "set" / "not set" marker used wherever a secret would otherwise be printed.
pub fn presence(secret: &str) -> &'static str {
    if secret.is_empty() {
        "not set"
    } else {
        "set"
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))?;
    if value.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    Ok(value)
}

fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// First non-empty variable among `names`, validated as an http(s) URL.
fn optional_url_var(names: &[&str]) -> anyhow::Result<Option<String>> {
    let Some((name, url)) = names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(|v| (*name, v))
    }) else {
        return Ok(None);
    };
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(Some(url.trim_end_matches('/').to_string()))
}

fn number_var<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number", name)),
        Err(_) => Ok(default),
    }
}

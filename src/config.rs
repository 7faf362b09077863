use std::env;

use crate::error::{AppError, Result};

pub const API_FOOTBALL_URL: &str = "https://v3.football.api-sports.io";
pub const SPORTMONKS_URL: &str = "https://api.sportmonks.com/v3/football";
pub const OPENAI_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const MP_BASE_URL: &str = "https://api.mercadopago.com";
pub const SITE_URL: &str = "https://www.scoutei.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_football_url: String,
    pub api_football_key: Option<String>,
    /// Timezone the provider uses to bucket fixtures into calendar dates.
    pub fixtures_timezone: String,
    pub sportmonks_url: String,
    pub sportmonks_key: Option<String>,
    pub openai_url: String,
    pub openai_key: Option<String>,
    pub openai_model: String,
    pub mp_base_url: String,
    pub mp_access_token: Option<String>,
    /// Public site used for checkout back-links.
    pub site_url: String,
    /// Shared secret for the admin endpoints (RESET_FIXTURES_KEY). Unset disables them.
    pub reset_key: Option<String>,
    pub database_url: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub upstream_timeout_secs: u64,
    /// Requests allowed per client IP per minute.
    pub rate_limit_per_minute: u32,
    pub public_dir: String,
    /// Allowed browser origin; permissive CORS when unset.
    pub cors_origin: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_football_url: API_FOOTBALL_URL.to_string(),
            api_football_key: None,
            fixtures_timezone: "America/Sao_Paulo".to_string(),
            sportmonks_url: SPORTMONKS_URL.to_string(),
            sportmonks_key: None,
            openai_url: OPENAI_URL.to_string(),
            openai_key: None,
            openai_model: OPENAI_MODEL.to_string(),
            mp_base_url: MP_BASE_URL.to_string(),
            mp_access_token: None,
            site_url: SITE_URL.to_string(),
            reset_key: None,
            database_url: "sqlite:./scoutei.db".to_string(),
            port: 3000,
            request_timeout_secs: 10,
            upstream_timeout_secs: 20,
            rate_limit_per_minute: 100,
            public_dir: "public".to_string(),
            cors_origin: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            api_football_url: env::var("API_FOOTBALL_URL").unwrap_or(defaults.api_football_url),
            api_football_key: non_empty_var("API_FOOTBALL_KEY"),
            fixtures_timezone: env::var("FIXTURES_TIMEZONE").unwrap_or(defaults.fixtures_timezone),
            sportmonks_url: env::var("SPORTMONKS_URL").unwrap_or(defaults.sportmonks_url),
            sportmonks_key: non_empty_var("SPORTMONKS_KEY"),
            openai_url: env::var("OPENAI_URL").unwrap_or(defaults.openai_url),
            openai_key: non_empty_var("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or(defaults.openai_model),
            mp_base_url: env::var("MP_BASE_URL").unwrap_or(defaults.mp_base_url),
            mp_access_token: non_empty_var("MP_ACCESS_TOKEN"),
            site_url: env::var("SITE_URL").unwrap_or(defaults.site_url),
            reset_key: non_empty_var("RESET_FIXTURES_KEY"),
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_var("PORT", defaults.port)?,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            upstream_timeout_secs: parse_var("UPSTREAM_TIMEOUT_SECS", defaults.upstream_timeout_secs)?,
            rate_limit_per_minute: parse_var("RATE_LIMIT_PER_MINUTE", defaults.rate_limit_per_minute)?,
            public_dir: env::var("PUBLIC_DIR").unwrap_or(defaults.public_dir),
            cors_origin: non_empty_var("CORS_ORIGIN"),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} must be a valid number", name))),
        Err(_) => Ok(default),
    }
}

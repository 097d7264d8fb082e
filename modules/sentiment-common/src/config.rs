use std::env;

use crate::error::SentimentError;

/// Secrets and environment-specific values. Tunables live in the TOML `FileConfig`.
#[derive(Debug, Clone, Default)]
pub struct Config {
    // Postgres
    pub database_url: Option<String>,

    // Extraction
    pub apify_api_token: Option<String>,
}

impl Config {
    /// Load configuration from the environment, reading `.env` first if present.
    /// Values are optional here; callers demand the ones their run actually needs.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: optional_env("DATABASE_URL"),
            apify_api_token: optional_env("APIFY_API_TOKEN"),
        }
    }

    pub fn require_database_url(&self) -> Result<&str, SentimentError> {
        self.database_url
            .as_deref()
            .ok_or_else(|| missing("DATABASE_URL", "the relational sink"))
    }

    pub fn require_apify_token(&self) -> Result<&str, SentimentError> {
        self.apify_api_token
            .as_deref()
            .ok_or_else(|| missing("APIFY_API_TOKEN", "Reddit extraction"))
    }

    /// Log which settings are present without exposing their values.
    pub fn log_redacted(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  DATABASE_URL: {}", redact_url(self.database_url.as_deref()));
        tracing::info!("  APIFY_API_TOKEN: {}", preview(self.apify_api_token.as_deref()));
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn missing(key: &str, purpose: &str) -> SentimentError {
    SentimentError::Config(format!("{key} environment variable is required for {purpose}"))
}

fn preview(val: Option<&str>) -> String {
    match val {
        Some(v) => {
            let head: String = v.chars().take(4).collect();
            format!("{head}...({} chars)", v.chars().count())
        }
        None => "<not set>".to_string(),
    }
}

/// Keep scheme and host, drop credentials.
fn redact_url(val: Option<&str>) -> String {
    match val {
        Some(url) => match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
            }
            _ => url.to_string(),
        },
        None => "<not set>".to_string(),
    }
}

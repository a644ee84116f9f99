use anyhow::{Context, Result};
use platform_db::DatabaseSettings;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseSettings,
    pub cors_allowed_origins: Vec<String>,
}

impl AppConfig {
    /// Reads the process environment. Call after `dotenvy` so `.env` values
    /// are visible.
    pub fn load() -> Result<Self> {
        let database = DatabaseSettings::from_env().context("database settings")?;
        let origins = std::env::var("CORS_ALLOWED_ORIGINS").ok();
        Ok(Self {
            database,
            cors_allowed_origins: parse_origins(origins.as_deref()),
        })
    }
}

fn parse_origins(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or(DEFAULT_CORS_ORIGIN)
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect()
}

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use std::env;

use crate::billing::BillingAnchor;

pub const DEFAULT_API_BASE_URL: &str = "https://api.ps3838.com";

/// Configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub ps3838_login: Option<String>,
    pub ps3838_password: Option<String>,
    pub ps3838_api_base_url: String,
    /// When API access was granted; its day and time anchor billing periods.
    pub api_gained_access: DateTime<Utc>,
    pub host: String,
    pub port: u16,
    pub upstream_requests_per_minute: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // A missing .env is fine; deployed containers set real env vars.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = match lookup("DATABASE_URL") {
            Some(v) if !v.trim().is_empty() => normalize_database_url(v.trim()),
            Some(_) => return Err(anyhow!("DATABASE_URL is set but empty")),
            None => return Err(anyhow!("DATABASE_URL is not set")),
        };

        let api_gained_access = non_empty("API_GAINED_ACCESS")
            .ok_or_else(|| anyhow!("API_GAINED_ACCESS is not set"))?;
        let api_gained_access = DateTime::parse_from_rfc3339(api_gained_access.trim())
            .context(format!(
                "API_GAINED_ACCESS must be an RFC 3339 timestamp, got '{}'",
                api_gained_access
            ))?
            .with_timezone(&Utc);

        let port = match non_empty("PORT") {
            Some(v) => v
                .trim()
                .parse()
                .context(format!("PORT must be a port number, got '{}'", v))?,
            None => 8000,
        };

        let upstream_requests_per_minute = match non_empty("UPSTREAM_REQUESTS_PER_MINUTE") {
            Some(v) => v
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    anyhow!(
                        "UPSTREAM_REQUESTS_PER_MINUTE must be a positive integer, got '{}'",
                        v
                    )
                })?,
            None => 30,
        };

        Ok(Self {
            database_url,
            ps3838_login: non_empty("PS3838_LOGIN"),
            ps3838_password: non_empty("PS3838_PASSWORD"),
            ps3838_api_base_url: non_empty("PS3838_API_BASE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            api_gained_access,
            host: non_empty("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            upstream_requests_per_minute,
        })
    }

    /// Billing anchor used when a request does not carry its own.
    pub fn default_billing_anchor(&self) -> BillingAnchor {
        BillingAnchor::from_access_granted(self.api_gained_access)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Accept `postgres://` and driver-qualified schemes like `postgresql+asyncpg://`.
pub fn normalize_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };

    let base = scheme.split('+').next().unwrap_or(scheme);
    match base {
        "postgres" | "postgresql" => format!("postgresql://{}", rest),
        _ => url.to_string(),
    }
}

//! PS3838 / Pinnacle sportsbook client.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use governor::{Quota, RateLimiter};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info};

use crate::bets::BetsChunk;
use crate::billing::Interval;
use crate::config::Config;
use crate::error::UpstreamError;

/// Soccer; the sportsbook's default sport for league listings.
pub const DEFAULT_SPORT_ID: u32 = 29;

/// Operations the HTTP layer needs from the sportsbook.
#[async_trait]
pub trait SportsbookApi: Send + Sync {
    /// Settled bets placed within `window`, which must span under 30 days.
    async fn get_settled_bets(&self, window: Interval) -> Result<BetsChunk, UpstreamError>;

    async fn get_leagues(&self, sport_id: u32) -> Result<Vec<Value>, UpstreamError>;

    async fn get_client_balance(&self) -> Result<Value, UpstreamError>;
}

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LeaguesEnvelope {
    leagues: Vec<Value>,
}

pub struct PinnacleClient {
    base_url: String,
    login: Option<String>,
    password: Option<String>,
    http_client: reqwest::Client,
    rate_limiter: DirectRateLimiter,
}

impl PinnacleClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        let per_minute =
            NonZeroU32::new(config.upstream_requests_per_minute).unwrap_or(NonZeroU32::MIN);

        Ok(Self {
            base_url: config.ps3838_api_base_url.clone(),
            login: config.ps3838_login.clone(),
            password: config.ps3838_password.clone(),
            http_client,
            rate_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, UpstreamError> {
        let (Some(login), Some(password)) = (&self.login, &self.password) else {
            return Err(UpstreamError::MissingCredentials);
        };

        // Wait for rate limit
        self.rate_limiter.until_ready().await;

        let response = self
            .http_client
            .get(self.url(path))
            .basic_auth(login, Some(password))
            .header("Accept", "application/json")
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!("GET {} -> {} ({} bytes)", path, status, body.len());
        Ok(serde_json::from_str(&body)?)
    }
}

pub fn format_upstream_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[async_trait]
impl SportsbookApi for PinnacleClient {
    async fn get_settled_bets(&self, window: Interval) -> Result<BetsChunk, UpstreamError> {
        let chunk: BetsChunk = self
            .get_json(
                "/v3/bets",
                &[
                    ("betlist", "SETTLED".to_string()),
                    ("fromDate", format_upstream_time(window.start())),
                    ("toDate", format_upstream_time(window.end())),
                ],
            )
            .await?;

        info!(
            "Fetched {} settled bets for {} .. {}",
            chunk.bets.len(),
            window.start(),
            window.end()
        );
        Ok(chunk)
    }

    async fn get_leagues(&self, sport_id: u32) -> Result<Vec<Value>, UpstreamError> {
        let envelope: LeaguesEnvelope = self
            .get_json("/v3/leagues", &[("sportId", sport_id.to_string())])
            .await?;

        info!("Fetched {} leagues for sport {}", envelope.leagues.len(), sport_id);
        Ok(envelope.leagues)
    }

    async fn get_client_balance(&self) -> Result<Value, UpstreamError> {
        self.get_json("/v1/client/balance", &[]).await
    }
}

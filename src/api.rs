//! HTTP routes.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::AuthenticatedKey;
use crate::bets::{self, AggregatedBets};
use crate::billing::{self, BillingAnchor, Interval, PeriodSelector};
use crate::config::Config;
use crate::db::ApiKeyStore;
use crate::error::ApiError;
use crate::upstream::{SportsbookApi, DEFAULT_SPORT_ID};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub api_keys: Arc<dyn ApiKeyStore>,
    pub sportsbook: Arc<dyn SportsbookApi>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(
        config: Config,
        api_keys: Arc<dyn ApiKeyStore>,
        sportsbook: Arc<dyn SportsbookApi>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            api_keys,
            sportsbook,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

const MAX_DAYS: u32 = 30;

fn default_days() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct BetsRequest {
    /// Number of past days to retrieve when no explicit range is given;
    /// always validated.
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to_date: Option<DateTime<Utc>>,
}

impl BetsRequest {
    fn resolve_interval(&self, now: DateTime<Utc>) -> Result<Interval, ApiError> {
        if !(1..=MAX_DAYS).contains(&self.days) {
            return Err(ApiError::Validation(format!(
                "days must be between 1 and {}, got {}",
                MAX_DAYS, self.days
            )));
        }

        match (self.from_date, self.to_date) {
            (Some(from), Some(to)) => Ok(Interval::new(from, to)?),
            (None, None) => Ok(Interval::new(now - Duration::days(i64::from(self.days)), now)?),
            _ => Err(ApiError::Validation(
                "from_date and to_date must be given together".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct BillingPeriodBetsRequest {
    #[serde(default)]
    pub period: PeriodSelector,
    /// Overrides the configured access timestamp for this request.
    #[serde(default)]
    pub api_gained_access: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct BillingPeriodBetsResponse {
    pub api_gained_access: DateTime<Utc>,
    pub billing_period_day: u32,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub bets: AggregatedBets,
}

#[derive(Debug, Deserialize)]
pub struct LeaguesQuery {
    pub sport_id: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AccountInfoResponse {
    pub account_name: Option<String>,
    pub base_api_url: String,
}

async fn fetch_settled(state: &AppState, interval: Interval) -> Result<AggregatedBets, ApiError> {
    let sportsbook = state.sportsbook.as_ref();
    Ok(bets::aggregate(interval, move |window| sportsbook.get_settled_bets(window)).await?)
}

async fn get_bets(
    State(state): State<AppState>,
    AuthenticatedKey(key): AuthenticatedKey,
    Json(request): Json<BetsRequest>,
) -> Result<Json<AggregatedBets>, ApiError> {
    let interval = request.resolve_interval((state.clock)())?;
    info!(
        "get_bets for key {}: {} .. {}",
        key.id,
        interval.start(),
        interval.end()
    );

    Ok(Json(fetch_settled(&state, interval).await?))
}

async fn get_billing_period_bets(
    State(state): State<AppState>,
    AuthenticatedKey(key): AuthenticatedKey,
    Json(request): Json<BillingPeriodBetsRequest>,
) -> Result<Json<BillingPeriodBetsResponse>, ApiError> {
    let access = request
        .api_gained_access
        .unwrap_or(state.config.api_gained_access);
    let anchor = BillingAnchor::from_access_granted(access);

    let period = billing::resolve_period((state.clock)(), &anchor, request.period)?;
    info!(
        "billing_period_bets for key {}: {:?} period {} .. {}",
        key.id,
        request.period,
        period.start(),
        period.end()
    );

    let bets = fetch_settled(&state, period).await?;

    Ok(Json(BillingPeriodBetsResponse {
        api_gained_access: access,
        billing_period_day: anchor.day_of_month(),
        period_start: period.start(),
        period_end: period.end(),
        bets,
    }))
}

async fn get_leagues(
    State(state): State<AppState>,
    _key: AuthenticatedKey,
    Query(query): Query<LeaguesQuery>,
) -> Result<Json<Value>, ApiError> {
    let leagues = state
        .sportsbook
        .get_leagues(query.sport_id.unwrap_or(DEFAULT_SPORT_ID))
        .await?;
    Ok(Json(json!({ "leagues": leagues })))
}

async fn get_client_balance(
    State(state): State<AppState>,
    _key: AuthenticatedKey,
) -> Result<Json<Value>, ApiError> {
    let balance = state.sportsbook.get_client_balance().await?;
    Ok(Json(json!({ "data": balance })))
}

async fn get_account_info(
    State(state): State<AppState>,
    _key: AuthenticatedKey,
) -> Json<AccountInfoResponse> {
    Json(AccountInfoResponse {
        account_name: state.config.ps3838_login.clone(),
        base_api_url: state.config.ps3838_api_base_url.clone(),
    })
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/get_bets", post(get_bets))
        .route("/billing_period_bets", post(get_billing_period_bets))
        .route("/get_leagues", post(get_leagues))
        .route("/get_client_balance", post(get_client_balance))
        .route("/account_info", get(get_account_info))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

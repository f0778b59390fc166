//! Pinnacle Analytics API
//!
//! HTTP facade over the PS3838 sportsbook API. Settled bets are reported for
//! arbitrary ranges or for monthly billing periods anchored on the date API
//! access was granted; requests are authenticated with stored API keys.

pub mod api;
pub mod auth;
pub mod bets;
pub mod billing;
pub mod config;
pub mod db;
pub mod error;
pub mod upstream;

pub use bets::{aggregate, AggregatedBets, BetKind, BetsByKind, BetsChunk};
pub use billing::{resolve_period, BillingAnchor, Interval, PeriodSelector};
pub use config::Config;
pub use error::{ApiError, CoreError, UpstreamError};

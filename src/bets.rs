//! Settled-bet aggregation across the upstream's date-range limit.
//!
//! The sportsbook rejects bet queries spanning 30 days or more, so longer
//! ranges are walked in windows of at most [`chunk_ceiling`] and the results
//! are concatenated in window order.

use std::future::Future;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::billing::Interval;
use crate::error::{CoreError, UpstreamError};

/// Longest window sent upstream: 29 days 23 hours, safely under 30 days.
pub fn chunk_ceiling() -> Duration {
    Duration::days(29) + Duration::hours(23)
}

/// Status the book assigns to straight bets it has not accepted yet.
pub const NOT_ACCEPTED: &str = "NOT_ACCEPTED";

/// Closed set of bet categories returned by the sportsbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BetKind {
    Straight,
    Parlay,
    Teaser,
    Special,
    Manual,
}

impl BetKind {
    pub const ALL: [BetKind; 5] = [
        BetKind::Straight,
        BetKind::Parlay,
        BetKind::Teaser,
        BetKind::Special,
        BetKind::Manual,
    ];
}

/// Bet records grouped by kind, each kind keeping upstream order.
///
/// Records are passed through as opaque JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BetsByKind {
    pub straight_bets: Vec<Value>,
    pub parlay_bets: Vec<Value>,
    pub teaser_bets: Vec<Value>,
    pub special_bets: Vec<Value>,
    pub manual_bets: Vec<Value>,
}

impl BetsByKind {
    pub fn get(&self, kind: BetKind) -> &[Value] {
        match kind {
            BetKind::Straight => &self.straight_bets,
            BetKind::Parlay => &self.parlay_bets,
            BetKind::Teaser => &self.teaser_bets,
            BetKind::Special => &self.special_bets,
            BetKind::Manual => &self.manual_bets,
        }
    }

    fn get_mut(&mut self, kind: BetKind) -> &mut Vec<Value> {
        match kind {
            BetKind::Straight => &mut self.straight_bets,
            BetKind::Parlay => &mut self.parlay_bets,
            BetKind::Teaser => &mut self.teaser_bets,
            BetKind::Special => &mut self.special_bets,
            BetKind::Manual => &mut self.manual_bets,
        }
    }

    /// Append every kind of `other` after the records already held.
    pub fn append(&mut self, mut other: BetsByKind) {
        for kind in BetKind::ALL {
            self.get_mut(kind).append(other.get_mut(kind));
        }
    }

    pub fn len(&self) -> usize {
        BetKind::ALL.iter().map(|&kind| self.get(kind).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One upstream response for a single window.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BetsChunk {
    pub more_available: bool,
    #[serde(flatten)]
    pub bets: BetsByKind,
}

/// Merged result of every window, serialized in the sportsbook's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBets {
    pub more_available: bool,
    pub page_size: usize,
    pub from_record: usize,
    pub to_record: usize,
    #[serde(flatten)]
    pub bets: BetsByKind,
}

impl AggregatedBets {
    fn new(more_available: bool, bets: BetsByKind) -> Self {
        let total = bets.len();
        Self {
            more_available,
            page_size: total,
            from_record: 0,
            to_record: total,
            bets,
        }
    }

    pub fn total_count(&self) -> usize {
        self.to_record
    }
}

/// Split `interval` into consecutive windows no longer than `ceiling`.
pub fn split_windows(interval: Interval, ceiling: Duration) -> Result<Vec<Interval>, CoreError> {
    let mut windows = Vec::new();
    let mut cursor = interval.start();

    while cursor < interval.end() {
        let window_end = (cursor + ceiling).min(interval.end());
        windows.push(Interval::new(cursor, window_end)?);
        cursor = window_end;
    }

    Ok(windows)
}

fn is_pending_acceptance(bet: &Value) -> bool {
    bet.get("betStatus").and_then(Value::as_str) == Some(NOT_ACCEPTED)
}

/// Fetch every window of `interval` in order and merge the results.
///
/// Any failing window aborts the whole aggregation. Straight bets still
/// awaiting acceptance are dropped from the merged result.
pub async fn aggregate<F, Fut>(interval: Interval, mut fetch: F) -> Result<AggregatedBets, CoreError>
where
    F: FnMut(Interval) -> Fut,
    Fut: Future<Output = Result<BetsChunk, UpstreamError>>,
{
    let windows = split_windows(interval, chunk_ceiling())?;
    let mut merged = BetsByKind::default();
    let mut more_available = false;

    for window in &windows {
        debug!("Fetching settled bets {} .. {}", window.start(), window.end());

        let chunk = fetch(*window).await.map_err(|source| CoreError::UpstreamFetch {
            start: window.start(),
            end: window.end(),
            source,
        })?;

        more_available = more_available || chunk.more_available;
        merged.append(chunk.bets);
    }

    let before = merged.straight_bets.len();
    merged.straight_bets.retain(|bet| !is_pending_acceptance(bet));
    let dropped = before - merged.straight_bets.len();

    let result = AggregatedBets::new(more_available, merged);
    info!(
        "Aggregated {} bets from {} window(s) ({} not-accepted straight bets dropped, more available: {})",
        result.total_count(),
        windows.len(),
        dropped,
        result.more_available
    );

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn interval(span: Duration) -> Interval {
        Interval::new(t0(), t0() + span).unwrap()
    }

    fn straight(id: u64, status: &str) -> Value {
        json!({ "betId": id, "betStatus": status })
    }

    #[test]
    fn test_short_interval_is_single_window() {
        let windows = split_windows(interval(Duration::days(3)), chunk_ceiling()).unwrap();

        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0], interval(Duration::days(3)));
    }

    #[test]
    fn test_exact_ceiling_multiples_partition_cleanly() {
        let whole = interval(chunk_ceiling() * 2);
        let windows = split_windows(whole, chunk_ceiling()).unwrap();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start(), whole.start());
        assert_eq!(windows[0].end(), windows[1].start());
        assert_eq!(windows[1].end(), whole.end());
        assert!(windows.iter().all(|w| w.span() == chunk_ceiling()));
    }

    #[test]
    fn test_eighty_days_needs_three_windows() {
        let windows = split_windows(interval(Duration::days(80)), chunk_ceiling()).unwrap();

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].span(), chunk_ceiling());
        assert_eq!(windows[1].span(), chunk_ceiling());
        assert_eq!(
            windows[2].span(),
            Duration::days(80) - chunk_ceiling() * 2
        );
        assert!(windows.iter().all(|w| w.span() < Duration::days(30)));
    }

    #[test]
    fn test_non_positive_ceiling_is_rejected() {
        let err = split_windows(interval(Duration::days(3)), Duration::zero()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidInterval { .. }));
    }

    #[test]
    fn test_chunk_decodes_missing_kinds_as_empty() {
        let chunk: BetsChunk = serde_json::from_value(json!({
            "moreAvailable": true,
            "pageSize": 1000,
            "parlayBets": [{ "betId": 7 }]
        }))
        .unwrap();

        assert!(chunk.more_available);
        assert_eq!(chunk.bets.parlay_bets.len(), 1);
        assert!(chunk.bets.straight_bets.is_empty());
        assert_eq!(chunk.bets.len(), 1);
    }

    #[test]
    fn test_aggregate_merges_in_window_order_and_filters() {
        let mut seen = Vec::new();
        let mut call = 0u64;

        let result = tokio_test::block_on(aggregate(interval(Duration::days(80)), |window| {
            seen.push(window);
            call += 1;
            let n = call;
            async move {
                let mut chunk = BetsChunk::default();
                chunk.bets.straight_bets = vec![
                    straight(n * 10, "SETTLED"),
                    straight(n * 10 + 1, NOT_ACCEPTED),
                ];
                chunk.bets.manual_bets = vec![json!({ "betId": n })];
                chunk.more_available = n == 2;
                Ok::<_, UpstreamError>(chunk)
            }
        }))
        .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].start(), t0());
        assert_eq!(seen[2].end(), t0() + Duration::days(80));

        let ids: Vec<u64> = result
            .bets
            .straight_bets
            .iter()
            .filter_map(|b| b["betId"].as_u64())
            .collect();
        assert_eq!(ids, vec![10, 20, 30]);
        assert_eq!(result.bets.manual_bets.len(), 3);
        assert!(result.more_available);
        assert_eq!(result.total_count(), 6);
        assert_eq!(result.page_size, 6);
        assert_eq!(result.from_record, 0);
    }

    #[test]
    fn test_aggregate_single_fetch_for_short_interval() {
        let mut calls = 0;

        let result = tokio_test::block_on(aggregate(interval(Duration::hours(5)), |_| {
            calls += 1;
            async { Ok::<_, UpstreamError>(BetsChunk::default()) }
        }))
        .unwrap();

        assert_eq!(calls, 1);
        assert!(!result.more_available);
        assert_eq!(result.total_count(), 0);
    }

    #[test]
    fn test_aggregate_fails_fast_on_upstream_error() {
        let mut calls = 0;

        let err = tokio_test::block_on(aggregate(interval(Duration::days(80)), |_| {
            calls += 1;
            let n = calls;
            async move {
                if n == 2 {
                    Err(UpstreamError::Status {
                        status: 503,
                        body: "maintenance".to_string(),
                    })
                } else {
                    Ok(BetsChunk::default())
                }
            }
        }))
        .unwrap_err();

        assert_eq!(calls, 2);
        match err {
            CoreError::UpstreamFetch { start, .. } => {
                assert_eq!(start, t0() + chunk_ceiling());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_not_accepted_filter_only_applies_to_straight_bets() {
        let result = tokio_test::block_on(aggregate(interval(Duration::days(1)), |_| async {
            let mut chunk = BetsChunk::default();
            chunk.bets.straight_bets = vec![straight(1, NOT_ACCEPTED)];
            chunk.bets.parlay_bets = vec![json!({ "betId": 2, "betStatus": NOT_ACCEPTED })];
            Ok::<_, UpstreamError>(chunk)
        }))
        .unwrap();

        assert!(result.bets.straight_bets.is_empty());
        assert_eq!(result.bets.parlay_bets.len(), 1);
        assert_eq!(result.total_count(), 1);
    }

    #[test]
    fn test_aggregated_wire_shape() {
        let mut bets = BetsByKind::default();
        bets.teaser_bets.push(json!({ "betId": 3 }));
        let value = serde_json::to_value(AggregatedBets::new(false, bets)).unwrap();

        assert_eq!(value["pageSize"], 1);
        assert_eq!(value["toRecord"], 1);
        assert_eq!(value["fromRecord"], 0);
        assert_eq!(value["moreAvailable"], false);
        assert_eq!(value["teaserBets"][0]["betId"], 3);
        assert_eq!(value["straightBets"], json!([]));
    }
}

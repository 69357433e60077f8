//! Transfer and query KPIs

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::DateRange;

/// Transfer counts for a branch over a range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferStatistics {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    /// Confirmed share of all transfers, in percent
    pub receipt_efficiency: Decimal,
    pub total_expected: Decimal,
    pub total_received: Decimal,
}

/// Query counts for a branch over a range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryStatistics {
    pub total: i64,
    pub by_status: BTreeMap<String, i64>,
    pub by_priority: BTreeMap<String, i64>,
    pub resolved: i64,
    /// Resolved share of all queries, in percent
    pub resolution_rate: Decimal,
    pub average_resolution_hours: Option<Decimal>,
    pub total_financial_impact: Decimal,
}

/// Daily activity point for charts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub transfers: i64,
    pub queries: i64,
}

/// Everything the branch statistics endpoint returns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchStatistics {
    pub range: DateRange,
    pub transfers: TransferStatistics,
    pub queries: QueryStatistics,
    pub quality_score: Decimal,
    pub trend: Vec<TrendPoint>,
}

/// `part / whole` as a percentage rounded to two places; 0 for an empty whole
pub fn percentage(part: i64, whole: i64) -> Decimal {
    if whole <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(part) / Decimal::from(whole) * Decimal::from(100)).round_dp(2)
}

/// Branch quality score: 100 minus queries per transfer as a percentage,
/// floored at 0. No transfers means a perfect score.
pub fn quality_score(query_count: i64, transfer_count: i64) -> Decimal {
    if transfer_count == 0 {
        return Decimal::from(100);
    }
    let ratio = Decimal::from(query_count) / Decimal::from(transfer_count.max(1));
    let score = Decimal::from(100) - ratio * Decimal::from(100);
    score.max(Decimal::ZERO).round_dp(2)
}

/// Mean of resolution durations in seconds, expressed in hours
pub fn average_resolution_hours(durations_secs: &[i64]) -> Option<Decimal> {
    if durations_secs.is_empty() {
        return None;
    }
    let total: i64 = durations_secs.iter().sum();
    let avg_secs = Decimal::from(total) / Decimal::from(durations_secs.len() as i64);
    Some((avg_secs / Decimal::from(3600)).round_dp(2))
}

/// One point per day of `range`, filling days without activity with zeros
pub fn build_trend(
    range: &DateRange,
    transfers_per_day: &[(NaiveDate, i64)],
    queries_per_day: &[(NaiveDate, i64)],
) -> Vec<TrendPoint> {
    let transfers: BTreeMap<NaiveDate, i64> = transfers_per_day.iter().copied().collect();
    let queries: BTreeMap<NaiveDate, i64> = queries_per_day.iter().copied().collect();

    range
        .days()
        .map(|date| TrendPoint {
            date,
            transfers: transfers.get(&date).copied().unwrap_or(0),
            queries: queries.get(&date).copied().unwrap_or(0),
        })
        .collect()
}

//! Discrepancy query and branch statistics tests
//!
//! Tests for:
//! - query status progression driven by responses
//! - visibility of queries and transfers by branch
//! - quality score, rates and trend series

use chrono::{Duration, NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::{
    average_resolution_hours, build_trend, parse_document_number, percentage, quality_score,
    total_financial_impact, AccessContext, DocumentKind, DomainError, FinancialImpact,
    ImpactCategory, Period, QueryPriority, QueryResponse, QueryStatus, QueryType,
    StockTransferQuery,
};
use uuid::Uuid;

// ============================================================================
// Fixtures
// ============================================================================

fn open_query(branch_id: Uuid) -> StockTransferQuery {
    let now = Utc::now();
    StockTransferQuery {
        id: Uuid::new_v4(),
        query_number: "QRY-20260301-0003".to_string(),
        stock_transfer_id: Uuid::new_v4(),
        stock_transfer_item_id: None,
        branch_id,
        query_type: QueryType::DamagedGoods,
        priority: QueryPriority::Medium,
        title: "Crushed cartons".to_string(),
        description: "Three cartons arrived crushed".to_string(),
        expected_quantity: Some(Decimal::from(12)),
        actual_quantity: Some(Decimal::from(9)),
        status: QueryStatus::Open,
        raised_by: Uuid::new_v4(),
        assigned_to: None,
        evidence: vec![],
        resolution_notes: None,
        close_reason: None,
        created_at: now,
        resolved_at: None,
        closed_at: None,
        updated_at: now,
    }
}

fn response_to(query: &StockTransferQuery, message: &str, is_internal: bool) -> QueryResponse {
    QueryResponse {
        id: Uuid::new_v4(),
        query_id: query.id,
        author_id: Uuid::new_v4(),
        message: message.to_string(),
        attachments: vec![],
        is_internal,
        created_at: Utc::now(),
    }
}

fn impact(query: &StockTransferQuery, cents: i64) -> FinancialImpact {
    FinancialImpact {
        id: Uuid::new_v4(),
        query_id: query.id,
        amount: Decimal::new(cents, 2),
        category: ImpactCategory::GoodsValue,
        description: None,
        recorded_by: Uuid::new_v4(),
        created_at: Utc::now(),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_first_response_starts_work() {
        let mut query = open_query(Uuid::new_v4());
        let first = response_to(&query, "Checking with the carrier", false);
        let status = query.add_response(&first, Utc::now()).unwrap();
        assert_eq!(status, QueryStatus::InProgress);
        assert_eq!(query.status, QueryStatus::InProgress);

        let second = response_to(&query, "Carrier confirmed damage", true);
        assert_eq!(
            query.add_response(&second, Utc::now()).unwrap(),
            QueryStatus::InProgress
        );
    }

    #[test]
    fn test_full_lifecycle() {
        let mut query = open_query(Uuid::new_v4());
        let assignee = Uuid::new_v4();
        query.assign(assignee, Utc::now()).unwrap();
        assert_eq!(query.status, QueryStatus::Open);
        assert_eq!(query.assigned_to, Some(assignee));

        query
            .add_response(&response_to(&query, "On it", false), Utc::now())
            .unwrap();
        query.resolve("Credit note CN-118 issued", Utc::now()).unwrap();
        assert_eq!(query.status, QueryStatus::Resolved);

        query
            .add_response(&response_to(&query, "Thanks", false), Utc::now())
            .unwrap();
        assert_eq!(query.status, QueryStatus::Resolved);

        query.close(None, Utc::now()).unwrap();
        assert_eq!(query.status, QueryStatus::Closed);
        assert!(query.closed_at.is_some());
        assert_eq!(query.close_reason, None);
    }

    #[test]
    fn test_resolve_requires_note() {
        let mut query = open_query(Uuid::new_v4());
        query
            .add_response(&response_to(&query, "Looking", false), Utc::now())
            .unwrap();
        assert!(matches!(
            query.resolve("   ", Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(query.status, QueryStatus::InProgress);
    }

    #[test]
    fn test_blank_response_is_rejected_without_status_change() {
        let mut query = open_query(Uuid::new_v4());
        let blank = response_to(&query, "  ", false);
        assert!(matches!(
            query.add_response(&blank, Utc::now()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(query.status, QueryStatus::Open);
    }

    #[test]
    fn test_query_visibility_follows_receiving_branch() {
        let receiving = Uuid::new_v4();
        let query = open_query(receiving);

        let same_branch = AccessContext::new(Uuid::new_v4(), receiving, false);
        let other_branch = AccessContext::new(Uuid::new_v4(), Uuid::new_v4(), false);
        let admin = AccessContext::new(Uuid::new_v4(), Uuid::new_v4(), true);

        assert!(query.ensure_visible(&same_branch).is_ok());
        assert!(query.ensure_visible(&admin).is_ok());
        assert!(matches!(
            query.ensure_visible(&other_branch),
            Err(DomainError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_origin_branch_cannot_see_query_or_internal_thread() {
        let receiving = Uuid::new_v4();
        let origin = Uuid::new_v4();
        let query = open_query(receiving);

        let origin_staff = AccessContext::new(Uuid::new_v4(), origin, false);
        let receiving_staff = AccessContext::new(Uuid::new_v4(), receiving, false);

        // Internal responses are only ever returned to callers that pass this check
        assert!(!query.is_visible_to(&origin_staff));
        assert!(matches!(
            query.ensure_visible(&origin_staff),
            Err(DomainError::AccessDenied(_))
        ));
        assert!(query.is_visible_to(&receiving_staff));
    }

    #[test]
    fn test_financial_impacts_are_summed() {
        let query = open_query(Uuid::new_v4());
        let impacts = vec![impact(&query, 12_550), impact(&query, 4_025)];
        assert_eq!(total_financial_impact(&impacts), Decimal::new(16_575, 2));
        assert_eq!(total_financial_impact(&[]), Decimal::ZERO);
    }

    #[test]
    fn test_quality_score_reference_values() {
        assert_eq!(quality_score(0, 0), Decimal::from(100));
        assert_eq!(quality_score(2, 10), Decimal::from(80));
        assert_eq!(quality_score(25, 10), Decimal::ZERO);
    }

    #[test]
    fn test_rates_with_empty_denominator() {
        assert_eq!(percentage(0, 0), Decimal::ZERO);
        assert_eq!(percentage(3, 4), Decimal::from(75));
        assert_eq!(average_resolution_hours(&[]), None);
        assert_eq!(
            average_resolution_hours(&[3600, 10_800]),
            Some(Decimal::from(2))
        );
    }

    #[test]
    fn test_month_trend_is_zero_filled() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        let range = Period::Month.range_ending(today);
        let busy_day = today - Duration::days(3);

        let trend = build_trend(&range, &[(busy_day, 4)], &[(busy_day, 1), (today, 2)]);

        assert_eq!(trend.len(), 30);
        assert_eq!(trend.first().map(|p| p.date), Some(range.start));
        assert_eq!(trend.last().map(|p| p.date), Some(today));
        let busy = trend.iter().find(|p| p.date == busy_day).unwrap();
        assert_eq!((busy.transfers, busy.queries), (4, 1));
        assert_eq!(trend.iter().map(|p| p.queries).sum::<i64>(), 3);
    }

    #[test]
    fn test_query_numbers_parse_back() {
        let (date, seq) =
            parse_document_number(DocumentKind::Query, "QRY-20260301-0003").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        assert_eq!(seq, 3);
    }
}

// ============================================================================
// Property Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Score stays within 0-100 and never rises with more queries
        #[test]
        fn prop_quality_score_bounds(
            queries in 0i64..500,
            transfers in 0i64..500,
        ) {
            let score = quality_score(queries, transfers);
            prop_assert!(score >= Decimal::ZERO);
            prop_assert!(score <= Decimal::from(100));
            prop_assert!(quality_score(queries + 1, transfers) <= score);
            if transfers == 0 {
                prop_assert_eq!(score, Decimal::from(100));
            }
        }

        /// Any number of responses after the first leaves the query in progress
        #[test]
        fn prop_responses_progress_once(count in 1usize..20) {
            let mut query = open_query(Uuid::new_v4());
            for n in 0..count {
                let response = response_to(&query, &format!("update {}", n), n % 2 == 0);
                query.add_response(&response, Utc::now()).unwrap();
                prop_assert_eq!(query.status, QueryStatus::InProgress);
            }
        }

        /// Closed is final: nothing moves a closed query
        #[test]
        fn prop_closed_query_is_final(target in prop::sample::select(QueryStatus::ALL.to_vec())) {
            prop_assert!(!QueryStatus::Closed.can_transition_to(target));

            let mut query = open_query(Uuid::new_v4());
            query.close(Some("raised in error"), Utc::now()).unwrap();
            let response = response_to(&query, "reopen please", false);
            prop_assert!(query.add_response(&response, Utc::now()).is_err());
            prop_assert!(query.resolve("late", Utc::now()).is_err());
            prop_assert!(query.ensure_accepts_financial_impact().is_err());
            prop_assert_eq!(query.status, QueryStatus::Closed);
        }

        /// Every period yields one trend point per day
        #[test]
        fn prop_trend_covers_period(
            day_offset in 0i64..3650,
            period in prop_oneof![Just(Period::Week), Just(Period::Month), Just(Period::Quarter)],
        ) {
            let today = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Duration::days(day_offset);
            let range = period.range_ending(today);
            let trend = build_trend(&range, &[], &[]);
            prop_assert_eq!(trend.len() as i64, period.days());
            prop_assert!(trend.iter().all(|p| p.transfers == 0 && p.queries == 0));
        }
    }
}

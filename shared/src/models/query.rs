//! Discrepancy query (ticket) models and lifecycle

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::branch::AccessContext;
use crate::error::{DomainError, DomainResult, FieldViolation};
use crate::types::StoredFile;
use crate::validation::{scale_violation, AMOUNT_SCALE};

/// What kind of mismatch a query reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    WeightDifference,
    QuantityShortage,
    QualityIssue,
    DamagedGoods,
    ExpiredGoods,
    MissingItems,
    Other,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::WeightDifference => "weight_difference",
            QueryType::QuantityShortage => "quantity_shortage",
            QueryType::QualityIssue => "quality_issue",
            QueryType::DamagedGoods => "damaged_goods",
            QueryType::ExpiredGoods => "expired_goods",
            QueryType::MissingItems => "missing_items",
            QueryType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "weight_difference" => Some(QueryType::WeightDifference),
            "quantity_shortage" => Some(QueryType::QuantityShortage),
            "quality_issue" => Some(QueryType::QualityIssue),
            "damaged_goods" => Some(QueryType::DamagedGoods),
            "expired_goods" => Some(QueryType::ExpiredGoods),
            "missing_items" => Some(QueryType::MissingItems),
            "other" => Some(QueryType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl QueryPriority {
    pub const ALL: [QueryPriority; 4] = [
        QueryPriority::Low,
        QueryPriority::Medium,
        QueryPriority::High,
        QueryPriority::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryPriority::Low => "low",
            QueryPriority::Medium => "medium",
            QueryPriority::High => "high",
            QueryPriority::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(QueryPriority::Low),
            "medium" => Some(QueryPriority::Medium),
            "high" => Some(QueryPriority::High),
            "critical" => Some(QueryPriority::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl QueryStatus {
    pub const ALL: [QueryStatus; 4] = [
        QueryStatus::Open,
        QueryStatus::InProgress,
        QueryStatus::Resolved,
        QueryStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryStatus::Open => "open",
            QueryStatus::InProgress => "in_progress",
            QueryStatus::Resolved => "resolved",
            QueryStatus::Closed => "closed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(QueryStatus::Open),
            "in_progress" => Some(QueryStatus::InProgress),
            "resolved" => Some(QueryStatus::Resolved),
            "closed" => Some(QueryStatus::Closed),
            _ => None,
        }
    }

    /// Linear progression, plus early close. Closed is final.
    pub fn can_transition_to(&self, next: QueryStatus) -> bool {
        use QueryStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (InProgress, Resolved)
                | (Resolved, Closed)
                | (Open, Closed)
                | (InProgress, Closed)
        )
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of money lost to a discrepancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactCategory {
    GoodsValue,
    LogisticsCost,
    DisposalCost,
    Other,
}

impl ImpactCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactCategory::GoodsValue => "goods_value",
            ImpactCategory::LogisticsCost => "logistics_cost",
            ImpactCategory::DisposalCost => "disposal_cost",
            ImpactCategory::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "goods_value" => Some(ImpactCategory::GoodsValue),
            "logistics_cost" => Some(ImpactCategory::LogisticsCost),
            "disposal_cost" => Some(ImpactCategory::DisposalCost),
            "other" => Some(ImpactCategory::Other),
            _ => None,
        }
    }
}

/// Message on a query thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub id: Uuid,
    pub query_id: Uuid,
    pub author_id: Uuid,
    pub message: String,
    pub attachments: Vec<StoredFile>,
    pub is_internal: bool,
    pub created_at: DateTime<Utc>,
}

/// Immutable money record attached to a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialImpact {
    pub id: Uuid,
    pub query_id: Uuid,
    pub amount: Decimal,
    pub category: ImpactCategory,
    pub description: Option<String>,
    pub recorded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// A discrepancy ticket raised against a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockTransferQuery {
    pub id: Uuid,
    pub query_number: String,
    pub stock_transfer_id: Uuid,
    pub stock_transfer_item_id: Option<Uuid>,
    /// Receiving branch of the transfer, denormalized for scoping
    pub branch_id: Uuid,
    pub query_type: QueryType,
    pub priority: QueryPriority,
    pub title: String,
    pub description: String,
    pub expected_quantity: Option<Decimal>,
    pub actual_quantity: Option<Decimal>,
    pub status: QueryStatus,
    pub raised_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub evidence: Vec<StoredFile>,
    pub resolution_notes: Option<String>,
    pub close_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StockTransferQuery {
    pub fn is_visible_to(&self, ctx: &AccessContext) -> bool {
        ctx.covers(self.branch_id)
    }

    pub fn ensure_visible(&self, ctx: &AccessContext) -> DomainResult<()> {
        if self.is_visible_to(ctx) {
            Ok(())
        } else {
            Err(DomainError::AccessDenied(format!(
                "query {} is outside the caller's branch scope",
                self.query_number
            )))
        }
    }

    fn transition(&mut self, next: QueryStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidQueryState(format!(
                "query {} cannot move from {} to {}",
                self.query_number, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_not_closed(&self, operation: &str) -> DomainResult<()> {
        if self.status == QueryStatus::Closed {
            Err(DomainError::InvalidQueryState(format!(
                "cannot {} closed query {}",
                operation, self.query_number
            )))
        } else {
            Ok(())
        }
    }

    /// Assignment never changes status
    pub fn assign(&mut self, assignee: Uuid, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_closed("assign")?;
        self.assigned_to = Some(assignee);
        self.updated_at = now;
        Ok(())
    }

    /// Status after a response is appended. The first response on an open
    /// query moves it to in_progress; later responses leave status alone.
    pub fn status_after_response(&self) -> DomainResult<QueryStatus> {
        self.ensure_not_closed("respond to")?;
        Ok(match self.status {
            QueryStatus::Open => QueryStatus::InProgress,
            other => other,
        })
    }

    pub fn add_response(
        &mut self,
        response: &QueryResponse,
        now: DateTime<Utc>,
    ) -> DomainResult<QueryStatus> {
        let next = self.status_after_response()?;
        if response.message.trim().is_empty() {
            return Err(DomainError::invalid("message", "message is required"));
        }
        if next != self.status {
            self.transition(next, now)?;
        } else {
            self.updated_at = now;
        }
        Ok(next)
    }

    pub fn resolve(&mut self, resolution_note: &str, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != QueryStatus::InProgress {
            return Err(DomainError::InvalidQueryState(format!(
                "query {} must be in_progress to resolve, found {}",
                self.query_number, self.status
            )));
        }
        if resolution_note.trim().is_empty() {
            return Err(DomainError::invalid("resolutionNote", "resolution note is required"));
        }
        self.transition(QueryStatus::Resolved, now)?;
        self.resolution_notes = Some(resolution_note.trim().to_string());
        self.resolved_at = Some(now);
        Ok(())
    }

    /// Close after resolution, or early with an explicit reason
    pub fn close(&mut self, reason: Option<&str>, now: DateTime<Utc>) -> DomainResult<()> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if self.status != QueryStatus::Resolved && self.status != QueryStatus::Closed && reason.is_none() {
            return Err(DomainError::invalid(
                "reason",
                "a reason is required to close an unresolved query",
            ));
        }
        self.transition(QueryStatus::Closed, now)?;
        self.close_reason = reason.map(str::to_string);
        self.closed_at = Some(now);
        Ok(())
    }

    pub fn ensure_accepts_financial_impact(&self) -> DomainResult<()> {
        self.ensure_not_closed("record financial impact on")
    }
}

/// Problem with an impact amount, reported against `field`
pub fn impact_amount_violation(field: &str, amount: Decimal) -> Option<FieldViolation> {
    if amount <= Decimal::ZERO {
        return Some(FieldViolation::new(field, "amount must be positive"));
    }
    scale_violation(field, amount, AMOUNT_SCALE)
}

/// Validate an impact amount
pub fn validate_impact_amount(amount: Decimal) -> DomainResult<()> {
    DomainError::check(impact_amount_violation("amount", amount).into_iter().collect())
}

/// Sum of all impact records on a query
pub fn total_financial_impact(impacts: &[FinancialImpact]) -> Decimal {
    impacts.iter().map(|i| i.amount).sum()
}

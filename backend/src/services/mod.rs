//! Business logic services for stock transfer reconciliation

pub mod ledger;
pub mod query;
pub mod sequence;
pub mod statistics;
pub mod transfer;

pub use ledger::LedgerService;
pub use query::QueryService;
pub use statistics::StatisticsService;
pub use transfer::TransferService;

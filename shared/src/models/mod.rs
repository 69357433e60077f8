//! Domain models for branch stock transfer reconciliation

mod branch;
mod ledger;
mod query;
mod statistics;
mod transfer;

pub use branch::*;
pub use ledger::*;
pub use query::*;
pub use statistics::*;
pub use transfer::*;

//! Shared domain for inter-branch stock transfer reconciliation
//!
//! Holds the transfer and query lifecycles, receipt planning, ledger rules
//! and statistics maths used by the backend and the browser bindings.

pub mod error;
pub mod models;
pub mod numbering;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use numbering::*;
pub use types::*;
pub use validation::*;

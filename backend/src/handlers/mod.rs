//! HTTP handlers

pub mod health;
pub mod queries;
pub mod statistics;
pub mod transfers;
pub mod uploads;

pub use health::*;
pub use queries::*;
pub use statistics::*;
pub use transfers::*;
pub use uploads::*;

//! Cost accounting.
//!
//! Rates are in USD per 1000 tokens. Local (self-hosted) models are always
//! free, whatever rate was registered for them.

mod calculator;
mod summary;

pub use calculator::{CostCalculator, ModelCostRate};
pub use summary::{CostBreakdown, CostSummary};

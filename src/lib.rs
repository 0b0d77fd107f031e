//! tierwise - Profile-based model routing and cost accounting
//!
//! This library picks a model and provider for each request from a routing
//! profile (cheap, balanced, premium), live provider availability and
//! required capabilities, and keeps track of what the dispatches cost.

mod cancel;
pub mod config;
pub mod cost;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod router;

#[cfg(test)]
mod test_support;

pub use config::{Profile, RoutingConfig};
pub use cost::{CostBreakdown, CostCalculator, CostSummary};
pub use error::{Error, Result};
pub use provider::{ProviderPort, ProviderRegistry};
pub use resolver::{Resolution, Resolver};
pub use router::{ModelSelection, Phase, Router};

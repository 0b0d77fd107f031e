//! Router module for model selection.
//!
//! This module handles selecting a model and provider based on:
//! - Routing profile (cheap, balanced, premium)
//! - Live provider availability
//! - Required capabilities
//! - Fallback model and fallback chain

mod phase;
mod selector;
mod skip;

pub use phase::Phase;
pub use selector::{has_all_capabilities, ModelSelection, Router};
pub use skip::{SkipReason, SkippedCandidate};

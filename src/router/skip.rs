//! Diagnostics for candidates passed over during selection.
//!
//! Provider errors during fallback traversal and capability scanning never
//! abort routing; the candidate is skipped and the next one tried. Each skip
//! is recorded here so callers and tests can see why a provider lost out.

use serde::Serialize;
use std::fmt;

/// Why a candidate was not selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// No registered provider supports the model.
    NoProvider,
    /// The provider named by configuration is not in the registry.
    ProviderNotRegistered,
    /// The provider reported the model unavailable.
    Unavailable,
    /// The availability check failed.
    AvailabilityError(String),
    /// Listing the provider's models failed.
    ListModelsFailed(String),
    /// The model lacks these required capabilities.
    MissingCapabilities(Vec<String>),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoProvider => write!(f, "no provider supports model"),
            SkipReason::ProviderNotRegistered => write!(f, "provider not registered"),
            SkipReason::Unavailable => write!(f, "unavailable"),
            SkipReason::AvailabilityError(e) => write!(f, "availability check failed: {}", e),
            SkipReason::ListModelsFailed(e) => write!(f, "listing models failed: {}", e),
            SkipReason::MissingCapabilities(caps) => {
                write!(f, "missing capabilities: {}", caps.join(", "))
            }
        }
    }
}

/// One skipped `(provider, model)` candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub reason: SkipReason,
}

/// Accumulates skips for one selection call.
#[derive(Debug, Default)]
pub(crate) struct SkipLog {
    entries: Vec<SkippedCandidate>,
}

impl SkipLog {
    pub(crate) fn record(
        &mut self,
        provider: Option<&str>,
        model: Option<&str>,
        reason: SkipReason,
    ) {
        tracing::debug!(
            provider = provider.unwrap_or("-"),
            model = model.unwrap_or("-"),
            reason = %reason,
            "skipping routing candidate"
        );
        self.entries.push(SkippedCandidate {
            provider: provider.map(str::to_string),
            model: model.map(str::to_string),
            reason,
        });
    }

    pub(crate) fn into_entries(self) -> Vec<SkippedCandidate> {
        self.entries
    }
}

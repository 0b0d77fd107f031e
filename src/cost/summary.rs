//! Cost breakdowns and running cost totals.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::calculator::ModelCostRate;

/// Cost of a single dispatch, in USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    /// Always `input_cost + output_cost`
    pub total_cost: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
    pub provider: String,
}

impl CostBreakdown {
    /// Compute a breakdown from rates in USD per 1000 tokens.
    pub fn from_rates(
        model: &str,
        provider: &str,
        input_tokens: u64,
        output_tokens: u64,
        input_rate: f64,
        output_rate: f64,
    ) -> Self {
        let input_cost = per_thousand(input_tokens, input_rate);
        let output_cost = per_thousand(output_tokens, output_rate);
        Self {
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
            input_tokens,
            output_tokens,
            model: model.to_string(),
            provider: provider.to_string(),
        }
    }

    /// Zero-cost breakdown that still records token volume.
    pub fn zero(model: &str, provider: &str, input_tokens: u64, output_tokens: u64) -> Self {
        Self::from_rates(model, provider, input_tokens, output_tokens, 0.0, 0.0)
    }
}

fn per_thousand(tokens: u64, rate: f64) -> f64 {
    tokens as f64 / 1000.0 * rate
}

/// Running cost totals.
///
/// Only [`CostSummary::add`] grows the totals; nothing is cleared except by
/// an explicit [`CostSummary::reset`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_input_cost: f64,
    pub total_output_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub request_count: u64,
    /// Spend per provider. Breakdowns without a provider are not keyed.
    pub by_provider: BTreeMap<String, f64>,
    /// Spend per model. Breakdowns without a model are not keyed.
    pub by_model: BTreeMap<String, f64>,
    /// What running everything on a premium model would have cost, minus
    /// actual spend. Never negative.
    pub local_savings: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CostSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, breakdown: &CostBreakdown) {
        self.total_cost += breakdown.total_cost;
        self.total_input_cost += breakdown.input_cost;
        self.total_output_cost += breakdown.output_cost;
        self.total_input_tokens = self.total_input_tokens.saturating_add(breakdown.input_tokens);
        self.total_output_tokens = self
            .total_output_tokens
            .saturating_add(breakdown.output_tokens);
        self.request_count = self.request_count.saturating_add(1);

        if !breakdown.provider.is_empty() {
            *self
                .by_provider
                .entry(breakdown.provider.clone())
                .or_insert(0.0) += breakdown.total_cost;
        }
        if !breakdown.model.is_empty() {
            *self.by_model.entry(breakdown.model.clone()).or_insert(0.0) += breakdown.total_cost;
        }

        self.last_updated = Some(Utc::now());
    }

    /// Fold another summary into this one. Savings are recomputed by the
    /// next [`CostSummary::calculate_savings`] call, not summed.
    pub fn merge(&mut self, other: &CostSummary) {
        self.total_cost += other.total_cost;
        self.total_input_cost += other.total_input_cost;
        self.total_output_cost += other.total_output_cost;
        self.total_input_tokens = self
            .total_input_tokens
            .saturating_add(other.total_input_tokens);
        self.total_output_tokens = self
            .total_output_tokens
            .saturating_add(other.total_output_tokens);
        self.request_count = self.request_count.saturating_add(other.request_count);

        for (provider, cost) in &other.by_provider {
            *self.by_provider.entry(provider.clone()).or_insert(0.0) += cost;
        }
        for (model, cost) in &other.by_model {
            *self.by_model.entry(model.clone()).or_insert(0.0) += cost;
        }

        self.last_updated = match (self.last_updated, other.last_updated) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }

    /// Compute and store savings against running all accumulated tokens on
    /// `premium`. Returns the savings, clamped at zero.
    pub fn calculate_savings(&mut self, premium: &ModelCostRate) -> f64 {
        let hypothetical = premium
            .cost_for(self.total_input_tokens, self.total_output_tokens)
            .total_cost;
        self.local_savings = (hypothetical - self.total_cost).max(0.0);
        self.local_savings
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

//! Per-model cost rates and cost calculation.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::summary::{CostBreakdown, CostSummary};
use crate::config::RoutingConfig;
use crate::error::{Error, Result};

/// Pricing of one model, in USD per 1000 tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCostRate {
    pub model_id: String,
    pub provider: String,
    pub input_rate: f64,
    pub output_rate: f64,
    /// Local models are free whatever their registered rates say.
    pub is_local: bool,
}

impl ModelCostRate {
    /// Cost of a dispatch at this rate. Local models always cost zero.
    pub fn cost_for(&self, input_tokens: u64, output_tokens: u64) -> CostBreakdown {
        if self.is_local {
            return CostBreakdown::zero(&self.model_id, &self.provider, input_tokens, output_tokens);
        }
        CostBreakdown::from_rates(
            &self.model_id,
            &self.provider,
            input_tokens,
            output_tokens,
            self.input_rate,
            self.output_rate,
        )
    }
}

/// Registry of model cost rates.
///
/// Independent of routing: the router and resolver price dispatches from
/// the routing configuration, while this calculator serves pricing and
/// reporting paths that register rates themselves.
#[derive(Debug, Default)]
pub struct CostCalculator {
    rates: RwLock<HashMap<String, ModelCostRate>>,
}

impl CostCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a calculator holding every model of a routing configuration.
    pub fn from_config(config: &RoutingConfig) -> Self {
        let calculator = Self::new();
        calculator.register_from_config(config);
        calculator
    }

    /// Register a model with no provider attribution.
    pub fn register_model(&self, model_id: &str, input_rate: f64, output_rate: f64) {
        self.register_model_with_provider(model_id, "", input_rate, output_rate);
    }

    pub fn register_model_with_provider(
        &self,
        model_id: &str,
        provider: &str,
        input_rate: f64,
        output_rate: f64,
    ) {
        self.register_rate(ModelCostRate {
            model_id: model_id.to_string(),
            provider: provider.to_string(),
            input_rate,
            output_rate,
            is_local: false,
        });
    }

    /// Register a self-hosted model. Rates are always zero.
    pub fn register_local_model(&self, model_id: &str, provider: &str) {
        self.register_rate(ModelCostRate {
            model_id: model_id.to_string(),
            provider: provider.to_string(),
            input_rate: 0.0,
            output_rate: 0.0,
            is_local: true,
        });
    }

    /// Register or replace a rate as given.
    pub fn register_rate(&self, rate: ModelCostRate) {
        tracing::debug!(
            model = %rate.model_id,
            provider = %rate.provider,
            input_rate = rate.input_rate,
            output_rate = rate.output_rate,
            is_local = rate.is_local,
            "registered model cost rate"
        );
        self.rates.write().insert(rate.model_id.clone(), rate);
    }

    /// Import every model of every enabled provider, converting per-token
    /// costs to per-1000-token rates. Models of local providers register as
    /// local. Disabled providers are skipped, matching how the resolver
    /// prices from configuration.
    ///
    /// Providers are applied in reverse priority order so that, when two
    /// providers configure the same model id, the preferred one wins.
    pub fn register_from_config(&self, config: &RoutingConfig) {
        for (provider_name, provider) in config.providers_by_priority().into_iter().rev() {
            if !provider.enabled {
                continue;
            }
            for (model_id, model) in &provider.models {
                if provider.is_local {
                    self.register_local_model(model_id, provider_name);
                } else {
                    self.register_model_with_provider(
                        model_id,
                        provider_name,
                        model.cost_per_input_token * 1000.0,
                        model.cost_per_output_token * 1000.0,
                    );
                }
            }
        }
    }

    /// Copy of a model's rate.
    pub fn get_model_cost(&self, model_id: &str) -> Option<ModelCostRate> {
        self.rates.read().get(model_id).cloned()
    }

    pub fn remove_model(&self, model_id: &str) -> bool {
        self.rates.write().remove(model_id).is_some()
    }

    /// Registered model ids, sorted.
    pub fn models(&self) -> Vec<String> {
        let mut models: Vec<String> = self.rates.read().keys().cloned().collect();
        models.sort();
        models
    }

    /// Cost of a dispatch on a registered model.
    pub fn calculate(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<CostBreakdown> {
        let rate = self
            .get_model_cost(model_id)
            .ok_or_else(|| Error::ModelNotFound {
                model: model_id.to_string(),
            })?;
        Ok(rate.cost_for(input_tokens, output_tokens))
    }

    /// Like [`CostCalculator::calculate`], but unknown models cost zero and
    /// keep their token counts.
    pub fn calculate_or_zero(
        &self,
        model_id: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> CostBreakdown {
        match self.get_model_cost(model_id) {
            Some(rate) => rate.cost_for(input_tokens, output_tokens),
            None => {
                tracing::debug!(
                    model = %model_id,
                    "no cost rate registered, tracking at zero cost"
                );
                CostBreakdown::zero(model_id, "", input_tokens, output_tokens)
            }
        }
    }

    /// Compute `summary`'s savings against a registered premium model.
    pub fn calculate_savings(&self, summary: &mut CostSummary, premium_model: &str) -> Result<f64> {
        let rate = self
            .get_model_cost(premium_model)
            .ok_or_else(|| Error::ModelNotFound {
                model: premium_model.to_string(),
            })?;
        Ok(summary.calculate_savings(&rate))
    }
}

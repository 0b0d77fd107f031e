//! Caller-facing facade: pick a model and account for its cost.
//!
//! The resolver wraps a [`Router`] and enriches each [`ModelSelection`] with
//! the selected model's configuration and a cost preview. It also keeps a
//! running [`CostSummary`] of tracked dispatches, priced from the routing
//! configuration.
//!
//! The summary has its own lock. Router calls take the router's lock on
//! their own, and no path holds both.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::{ModelConfig, Profile, RoutingConfig};
use crate::cost::{CostBreakdown, CostSummary, ModelCostRate};
use crate::error::{Error, Result};
use crate::router::{has_all_capabilities, ModelSelection, Phase, Router, SkippedCandidate};

/// A resolved model with its configuration and cost context.
#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub model_id: String,
    pub provider_name: String,
    /// Set when the router fell back, or when the model does not meet
    /// requested capabilities.
    pub is_fallback: bool,
    pub capability_fallback: bool,
    /// `None` when the model is served by a provider but absent from the
    /// routing configuration.
    pub model_config: Option<ModelConfig>,
    /// Upper-bound preview: the profile's context budget as input and the
    /// model's `max_tokens` as output.
    pub estimated_cost: CostBreakdown,
    pub skipped: Vec<SkippedCandidate>,
}

pub struct Resolver {
    router: Arc<Router>,
    cost_tracking: RwLock<CostSummary>,
}

impl Resolver {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            cost_tracking: RwLock::new(CostSummary::new()),
        }
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Resolve a model for a profile. Invalid profiles are rejected.
    pub async fn resolve(&self, cancel: &CancellationToken, profile: &str) -> Result<Resolution> {
        let (selection, config) = self.router.select_model_with_snapshot(cancel, profile).await?;
        let profile: Profile = profile.parse()?;
        Ok(enrich(selection, profile, &config))
    }

    /// Resolve a model for a workflow phase. Invalid profiles route as
    /// `balanced`.
    pub async fn resolve_for_phase(
        &self,
        cancel: &CancellationToken,
        phase: &Phase,
    ) -> Result<Resolution> {
        let (selection, config) = self
            .router
            .select_model_for_phase_with_snapshot(cancel, phase)
            .await?;
        Ok(enrich(selection, phase.routing_profile(), &config))
    }

    /// Resolve a model having every capability in `required`.
    ///
    /// The resolved model's configuration, taken from the same snapshot the
    /// router selected against, is re-checked: when it lacks any
    /// required capability the resolution is marked `is_fallback`, even if
    /// the router did not mark it.
    pub async fn resolve_with_capabilities(
        &self,
        cancel: &CancellationToken,
        profile: &str,
        required: &[String],
    ) -> Result<Resolution> {
        let (selection, config) = self
            .router
            .select_model_with_capabilities_with_snapshot(cancel, profile, required)
            .await?;
        let profile: Profile = profile.parse()?;
        let mut resolution = enrich(selection, profile, &config);

        if !has_all_capabilities(resolution.model_config.as_ref(), required) {
            tracing::warn!(
                model = %resolution.model_id,
                required = ?required,
                "resolved model does not meet required capabilities"
            );
            resolution.is_fallback = true;
        }

        Ok(resolution)
    }

    /// Price a dispatch and add it to the running summary.
    ///
    /// Unknown models are tracked at zero cost so token volume is kept.
    pub fn track_cost(
        &self,
        model_id: &str,
        provider_name: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> CostBreakdown {
        let breakdown = self.estimate_cost(model_id, provider_name, input_tokens, output_tokens);
        self.cost_tracking.write().add(&breakdown);
        tracing::debug!(
            model = %model_id,
            provider = %provider_name,
            input_tokens,
            output_tokens,
            total_cost = breakdown.total_cost,
            "tracked dispatch cost"
        );
        breakdown
    }

    /// Price a dispatch without recording it.
    pub fn estimate_cost(
        &self,
        model_id: &str,
        provider_name: &str,
        input_tokens: u64,
        output_tokens: u64,
    ) -> CostBreakdown {
        let config = self.router.config();
        match rate_from_config(&config, model_id, provider_name) {
            Some(rate) => rate.cost_for(input_tokens, output_tokens),
            None => CostBreakdown::zero(model_id, provider_name, input_tokens, output_tokens),
        }
    }

    /// Copy of the running summary.
    pub fn cost_summary(&self) -> CostSummary {
        self.cost_tracking.read().clone()
    }

    pub fn reset_cost_tracking(&self) {
        self.cost_tracking.write().reset();
        tracing::info!("cost tracking reset");
    }

    /// Update the summary's savings against a configured premium model.
    pub fn calculate_savings(&self, premium_model: &str) -> Result<f64> {
        let config = self.router.config();
        let mut rate =
            rate_from_config(&config, premium_model, "").ok_or_else(|| Error::ModelNotFound {
                model: premium_model.to_string(),
            })?;
        // The reference is what the tokens would have cost if billed.
        rate.is_local = false;
        Ok(self.cost_tracking.write().calculate_savings(&rate))
    }
}

/// Attach model configuration and a cost preview, all read from `config`.
fn enrich(selection: ModelSelection, profile: Profile, config: &RoutingConfig) -> Resolution {
    let model_config =
        model_config_for(config, &selection.model_id, &selection.provider_name).cloned();

    let input_tokens = config
        .profile(profile)
        .map(|p| u64::from(p.max_context_tokens))
        .unwrap_or(0);
    let output_tokens = model_config
        .as_ref()
        .map(|m| u64::from(m.max_tokens))
        .unwrap_or(0);
    let rate = rate_from_config(config, &selection.model_id, &selection.provider_name);
    let estimated_cost = match rate {
        Some(rate) => rate.cost_for(input_tokens, output_tokens),
        None => CostBreakdown::zero(
            &selection.model_id,
            &selection.provider_name,
            input_tokens,
            output_tokens,
        ),
    };

    Resolution {
        model_id: selection.model_id,
        provider_name: selection.provider_name,
        is_fallback: selection.is_fallback,
        capability_fallback: selection.capability_fallback,
        model_config,
        estimated_cost,
        skipped: selection.skipped,
    }
}

/// Model configuration, preferring the entry under `provider_name`.
/// Disabled providers are ignored.
fn model_config_for<'a>(
    config: &'a RoutingConfig,
    model_id: &str,
    provider_name: &str,
) -> Option<&'a ModelConfig> {
    config
        .providers
        .get(provider_name)
        .filter(|provider| provider.enabled)
        .and_then(|provider| provider.models.get(model_id))
        .or_else(|| config.model_config(model_id))
}

/// Per-1000-token rate derived from the configured per-token costs.
fn rate_from_config(
    config: &RoutingConfig,
    model_id: &str,
    provider_name: &str,
) -> Option<ModelCostRate> {
    let model = model_config_for(config, model_id, provider_name)?;
    let is_local = match config.providers.get(provider_name).filter(|p| p.enabled) {
        Some(provider) => provider.is_local,
        None => config.is_local_model(model_id),
    };

    Some(ModelCostRate {
        model_id: model_id.to_string(),
        provider: provider_name.to_string(),
        input_rate: model.cost_per_input_token * 1000.0,
        output_rate: model.cost_per_output_token * 1000.0,
        is_local,
    })
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("router", &self.router)
            .field("cost_tracking", &*self.cost_tracking.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{scenario_config, scenario_registry, MockProvider};
    use crate::provider::ProviderRegistry;
    use std::time::Duration;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn scenario_resolver() -> (Resolver, Arc<MockProvider>, Arc<MockProvider>) {
        let (registry, ollama, anthropic) = scenario_registry();
        let router = Arc::new(Router::new(scenario_config(), registry));
        (Resolver::new(router), ollama, anthropic)
    }

    #[test]
    fn test_track_cost_scenario() {
        let (resolver, _, _) = scenario_resolver();

        let b = resolver.track_cost("claude-3-5-sonnet-20241022", "anthropic", 1000, 500);
        assert!(approx(b.input_cost, 3.0));
        assert!(approx(b.output_cost, 7.5));
        assert!(approx(b.total_cost, 10.5));

        let summary = resolver.cost_summary();
        assert_eq!(summary.total_input_tokens, 1000);
        assert_eq!(summary.total_output_tokens, 500);
        assert!(approx(summary.by_provider["anthropic"], 10.5));
        assert!(approx(summary.by_model["claude-3-5-sonnet-20241022"], 10.5));
    }

    #[test]
    fn test_track_cost_unknown_model_is_free() {
        let (resolver, _, _) = scenario_resolver();
        let b = resolver.track_cost("gpt-9", "openai", 100, 100);
        assert_eq!(b.total_cost, 0.0);

        let summary = resolver.cost_summary();
        assert_eq!(summary.total_input_tokens, 100);
        assert_eq!(summary.request_count, 1);
    }

    #[test]
    fn test_track_cost_local_model_is_free() {
        let (resolver, _, _) = scenario_resolver();

        // Misconfigure a non-zero rate on a local model.
        let mut config = scenario_config();
        config
            .providers
            .get_mut("ollama")
            .unwrap()
            .models
            .get_mut("llama3.2:8b")
            .unwrap()
            .cost_per_input_token = 0.5;
        resolver.router().update_config(config);

        let b = resolver.track_cost("llama3.2:8b", "ollama", 1000, 1000);
        assert_eq!(b.total_cost, 0.0);
        assert_eq!(resolver.cost_summary().total_cost, 0.0);
    }

    #[test]
    fn test_estimate_does_not_mutate() {
        let (resolver, _, _) = scenario_resolver();
        let b = resolver.estimate_cost("claude-3-5-sonnet-20241022", "anthropic", 1000, 500);
        assert!(approx(b.total_cost, 10.5));
        assert_eq!(resolver.cost_summary(), CostSummary::default());
    }

    #[test]
    fn test_summary_is_a_copy_and_reset_clears() {
        let (resolver, _, _) = scenario_resolver();
        resolver.track_cost("claude-3-5-sonnet-20241022", "anthropic", 10, 10);

        let mut copy = resolver.cost_summary();
        copy.total_cost = 1_000_000.0;
        assert!(resolver.cost_summary().total_cost < 1.0);

        resolver.reset_cost_tracking();
        assert_eq!(resolver.cost_summary(), CostSummary::default());
    }

    #[test]
    fn test_calculate_savings() {
        let (resolver, _, _) = scenario_resolver();
        resolver.track_cost("llama3.2:8b", "ollama", 1000, 1000);

        let savings = resolver
            .calculate_savings("claude-3-5-sonnet-20241022")
            .unwrap();
        assert!(approx(savings, 18.0));
        assert!(approx(resolver.cost_summary().local_savings, 18.0));
        assert!(resolver.calculate_savings("gpt-9").is_err());
    }

    #[tokio::test]
    async fn test_resolve_enriches_selection() {
        let (resolver, _, _) = scenario_resolver();
        let token = CancellationToken::new();

        let resolution = resolver.resolve(&token, "balanced").await.unwrap();
        assert_eq!(resolution.model_id, "llama3.2:8b");
        assert_eq!(resolution.provider_name, "ollama");
        assert!(!resolution.is_fallback);

        let model = resolution.model_config.unwrap();
        assert_eq!(model.max_tokens, 4096);
        assert_eq!(resolution.estimated_cost.input_tokens, 1000);
        assert_eq!(resolution.estimated_cost.output_tokens, 4096);
        assert_eq!(resolution.estimated_cost.total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_resolve_premium_estimate() {
        let (resolver, _, _) = scenario_resolver();
        let token = CancellationToken::new();

        let resolution = resolver.resolve(&token, "premium").await.unwrap();
        assert_eq!(resolution.model_id, "claude-3-5-sonnet-20241022");
        // No context budget on premium: output only, 8192 * 0.015.
        assert!(approx(resolution.estimated_cost.total_cost, 8192.0 * 0.015));
    }

    #[tokio::test]
    async fn test_resolve_invalid_profile() {
        let (resolver, _, _) = scenario_resolver();
        let token = CancellationToken::new();
        let result = resolver.resolve(&token, "turbo").await;
        assert!(matches!(result, Err(Error::InvalidProfile { .. })));
    }

    #[tokio::test]
    async fn test_resolve_for_phase() {
        let (resolver, _, _) = scenario_resolver();
        let token = CancellationToken::new();

        let phase = Phase::new("validate_output").with_profile("cheap");
        let resolution = resolver.resolve_for_phase(&token, &phase).await.unwrap();
        assert_eq!(resolution.model_id, "llama3.2:8b");
    }

    #[tokio::test]
    async fn test_resolve_with_capabilities_met() {
        let (resolver, _, _) = scenario_resolver();
        let token = CancellationToken::new();

        let resolution = resolver
            .resolve_with_capabilities(&token, "balanced", &["vision".to_string()])
            .await
            .unwrap();
        assert_eq!(resolution.model_id, "claude-3-5-sonnet-20241022");
        assert!(!resolution.is_fallback);
    }

    #[tokio::test]
    async fn test_resolve_with_capabilities_unmet_marks_fallback() {
        let (resolver, _, anthropic) = scenario_resolver();
        anthropic.set_model_available("claude-3-5-sonnet-20241022", false);
        let token = CancellationToken::new();

        let resolution = resolver
            .resolve_with_capabilities(&token, "balanced", &["vision".to_string()])
            .await
            .unwrap();
        assert_eq!(resolution.model_id, "llama3.2:8b");
        assert!(resolution.capability_fallback);
        assert!(resolution.is_fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_uses_selection_snapshot() {
        let registry = Arc::new(ProviderRegistry::new());
        registry
            .register(Arc::new(
                MockProvider::new("ollama", &["llama3.2:8b", "llama3.2:3b"]).local(),
            ))
            .unwrap();
        registry
            .register(Arc::new(
                MockProvider::new("anthropic", &["claude-3-5-sonnet-20241022"])
                    .with_delay(Duration::from_millis(200)),
            ))
            .unwrap();
        let resolver = Arc::new(Resolver::new(Arc::new(Router::new(
            scenario_config(),
            registry,
        ))));

        let task = {
            let resolver = Arc::clone(&resolver);
            tokio::spawn(async move {
                let token = CancellationToken::new();
                resolver
                    .resolve_with_capabilities(&token, "premium", &["vision".to_string()])
                    .await
            })
        };

        // Strip claude's capabilities while its availability check is pending.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let mut swapped = scenario_config();
        let claude = swapped
            .providers
            .get_mut("anthropic")
            .unwrap()
            .models
            .get_mut("claude-3-5-sonnet-20241022")
            .unwrap();
        claude.capabilities.clear();
        claude.max_tokens = 1;
        resolver.router().update_config(swapped);

        let resolution = task.await.unwrap().unwrap();
        assert_eq!(resolution.model_id, "claude-3-5-sonnet-20241022");
        assert!(!resolution.capability_fallback);
        assert!(!resolution.is_fallback);
        assert!(resolution.model_config.unwrap().has_capability("vision"));
        assert_eq!(resolution.estimated_cost.output_tokens, 8192);
    }

    #[test]
    fn test_disabled_provider_entry_is_ignored() {
        let (resolver, _, _) = scenario_resolver();
        let mut config = scenario_config();
        config.providers.get_mut("anthropic").unwrap().enabled = false;
        resolver.router().update_config(config);

        let b = resolver.estimate_cost("claude-3-5-sonnet-20241022", "anthropic", 1000, 1000);
        assert_eq!(b.total_cost, 0.0);
        assert_eq!(b.input_tokens, 1000);
    }

    #[tokio::test]
    async fn test_concurrent_tracking() {
        let (resolver, _, _) = scenario_resolver();
        let resolver = Arc::new(resolver);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let resolver = Arc::clone(&resolver);
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    resolver.track_cost("claude-3-5-sonnet-20241022", "anthropic", 10, 5);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = resolver.cost_summary();
        assert_eq!(summary.request_count, 800);
        assert_eq!(summary.total_input_tokens, 8000);
        assert_eq!(summary.total_output_tokens, 4000);
    }
}

//! Model selection logic.
//!
//! The router decides which `(model, provider)` pair serves a request:
//! the profile's primary model when it is available, otherwise the
//! profile's fallback model, otherwise the first available model of each
//! provider in the fallback chain.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::phase::Phase;
use super::skip::{SkipLog, SkipReason, SkippedCandidate};
use crate::cancel::{ensure_active, run_cancellable};
use crate::config::{ModelConfig, Profile, ProfileConfig, RoutingConfig};
use crate::error::{Error, Result};
use crate::provider::ProviderRegistry;

/// A routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSelection {
    pub model_id: String,
    pub provider_name: String,
    /// Reached through the fallback path rather than the profile's primary
    /// models.
    pub is_fallback: bool,
    /// A capability-constrained selection found no qualifying model and
    /// degraded to plain profile selection.
    pub capability_fallback: bool,
    /// Candidates passed over before this one, in the order tried.
    pub skipped: Vec<SkippedCandidate>,
}

impl ModelSelection {
    fn new(model_id: &str, provider_name: &str, is_fallback: bool, skips: SkipLog) -> Self {
        Self {
            model_id: model_id.to_string(),
            provider_name: provider_name.to_string(),
            is_fallback,
            capability_fallback: false,
            skipped: skips.into_entries(),
        }
    }
}

/// Whether `model` has every capability in `required`.
///
/// An empty requirement is satisfied by anything, including no model.
pub fn has_all_capabilities(model: Option<&ModelConfig>, required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    match model {
        Some(model) => required.iter().all(|cap| model.has_capability(cap)),
        None => false,
    }
}

fn missing_capabilities(model: &ModelConfig, required: &[String]) -> Vec<String> {
    required
        .iter()
        .filter(|cap| !model.has_capability(cap))
        .cloned()
        .collect()
}

/// Router for selecting models.
///
/// The configuration is swapped as a whole by [`Router::update_config`].
/// Selection methods take a snapshot of the current configuration and
/// release the lock before calling any provider.
pub struct Router {
    config: RwLock<Arc<RoutingConfig>>,
    registry: Arc<ProviderRegistry>,
}

impl Router {
    /// Create a new router over the given configuration and registry.
    pub fn new(config: RoutingConfig, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            config: RwLock::new(Arc::new(config)),
            registry,
        }
    }

    /// Snapshot of the active configuration.
    pub fn config(&self) -> Arc<RoutingConfig> {
        Arc::clone(&self.config.read())
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Atomically replace the active configuration.
    ///
    /// In-flight selections keep the snapshot they started with.
    pub fn update_config(&self, config: RoutingConfig) {
        let config = Arc::new(config);
        *self.config.write() = config;
        tracing::info!("routing configuration updated");
    }

    /// Enabled provider names, lowest priority value first.
    pub fn enabled_providers(&self) -> Vec<String> {
        self.config().enabled_provider_names()
    }

    /// Select a model for a profile.
    ///
    /// Fails with [`Error::InvalidProfile`] for anything but `cheap`,
    /// `balanced` or `premium`.
    pub async fn select_model(
        &self,
        cancel: &CancellationToken,
        profile: &str,
    ) -> Result<ModelSelection> {
        let (selection, _) = self.select_model_with_snapshot(cancel, profile).await?;
        Ok(selection)
    }

    /// [`Router::select_model`], also returning the configuration snapshot
    /// the decision was made against.
    pub(crate) async fn select_model_with_snapshot(
        &self,
        cancel: &CancellationToken,
        profile: &str,
    ) -> Result<(ModelSelection, Arc<RoutingConfig>)> {
        let profile: Profile = profile.parse()?;
        ensure_active(cancel)?;

        let config = self.config();
        let selection = self.select_from(cancel, profile, &config).await?;
        Ok((selection, config))
    }

    async fn select_from(
        &self,
        cancel: &CancellationToken,
        profile: Profile,
        config: &RoutingConfig,
    ) -> Result<ModelSelection> {
        let profile_config = profile_config(config, profile)?;
        let mut skips = SkipLog::default();

        let model = profile_config.generation_model.as_str();
        if !model.is_empty() {
            if let Some(provider) = self.find_available_provider(cancel, model, &mut skips).await? {
                tracing::debug!(
                    profile = %profile,
                    model = %model,
                    provider = %provider,
                    "selected primary model"
                );
                return Ok(ModelSelection::new(model, &provider, false, skips));
            }
        }

        self.fallback_from(cancel, profile, profile_config, config, skips)
            .await
    }

    /// Select a model for a workflow phase.
    ///
    /// Unlike [`Router::select_model`], an invalid or empty phase profile is
    /// routed as `balanced` instead of failing. Review phases try the
    /// profile's review model before its generation model.
    pub async fn select_model_for_phase(
        &self,
        cancel: &CancellationToken,
        phase: &Phase,
    ) -> Result<ModelSelection> {
        let (selection, _) = self.select_model_for_phase_with_snapshot(cancel, phase).await?;
        Ok(selection)
    }

    pub(crate) async fn select_model_for_phase_with_snapshot(
        &self,
        cancel: &CancellationToken,
        phase: &Phase,
    ) -> Result<(ModelSelection, Arc<RoutingConfig>)> {
        let profile = phase.routing_profile();
        ensure_active(cancel)?;

        let config = self.config();
        let profile_config = profile_config(&config, profile)?;
        let mut skips = SkipLog::default();

        let mut candidates: Vec<&str> = Vec::with_capacity(2);
        if phase.is_review() && !profile_config.review_model.is_empty() {
            candidates.push(&profile_config.review_model);
        }
        if !profile_config.generation_model.is_empty()
            && !candidates.contains(&profile_config.generation_model.as_str())
        {
            candidates.push(&profile_config.generation_model);
        }

        for model in candidates {
            if let Some(provider) = self.find_available_provider(cancel, model, &mut skips).await? {
                tracing::debug!(
                    phase = %phase.id,
                    review = phase.is_review(),
                    model = %model,
                    provider = %provider,
                    "selected model for phase"
                );
                let selection = ModelSelection::new(model, &provider, false, skips);
                return Ok((selection, Arc::clone(&config)));
            }
        }

        let selection = self
            .fallback_from(cancel, profile, profile_config, &config, skips)
            .await?;
        Ok((selection, config))
    }

    /// Select a fallback model for a profile.
    ///
    /// Tries the profile's fallback model, then each provider of the
    /// fallback chain in order. Every result is marked `is_fallback`.
    pub async fn fallback_model(
        &self,
        cancel: &CancellationToken,
        profile: &str,
    ) -> Result<ModelSelection> {
        let profile: Profile = profile.parse()?;
        ensure_active(cancel)?;

        let config = self.config();
        let profile_config = profile_config(&config, profile)?;
        self.fallback_from(cancel, profile, profile_config, &config, SkipLog::default())
            .await
    }

    /// Select an available model having every capability in `required`.
    ///
    /// All enabled models of all enabled providers are considered, providers
    /// by ascending priority (ties by name) and models by id. When nothing
    /// qualifies this degrades to [`Router::select_model`] and sets
    /// `capability_fallback`; the returned model may then lack the required
    /// capabilities.
    pub async fn select_model_with_capabilities(
        &self,
        cancel: &CancellationToken,
        profile: &str,
        required: &[String],
    ) -> Result<ModelSelection> {
        let (selection, _) = self
            .select_model_with_capabilities_with_snapshot(cancel, profile, required)
            .await?;
        Ok(selection)
    }

    /// Capability selection, also returning the configuration snapshot. The
    /// degraded profile selection uses the same snapshot as the scan.
    pub(crate) async fn select_model_with_capabilities_with_snapshot(
        &self,
        cancel: &CancellationToken,
        profile: &str,
        required: &[String],
    ) -> Result<(ModelSelection, Arc<RoutingConfig>)> {
        let parsed: Profile = profile.parse()?;
        ensure_active(cancel)?;

        let config = self.config();
        let mut skips = SkipLog::default();

        for (provider_name, provider_config) in config.providers_by_priority() {
            if !provider_config.enabled {
                continue;
            }

            for (model_id, model) in &provider_config.models {
                if !model.enabled {
                    continue;
                }
                if !has_all_capabilities(Some(model), required) {
                    skips.record(
                        Some(provider_name),
                        Some(model_id.as_str()),
                        SkipReason::MissingCapabilities(missing_capabilities(model, required)),
                    );
                    continue;
                }

                let Some(provider) = self.registry.get(provider_name) else {
                    skips.record(
                        Some(provider_name),
                        Some(model_id.as_str()),
                        SkipReason::ProviderNotRegistered,
                    );
                    continue;
                };

                match run_cancellable(cancel, provider.is_available(model_id)).await {
                    Ok(true) => {
                        tracing::debug!(
                            model = %model_id,
                            provider = %provider_name,
                            required = ?required,
                            "selected model by capabilities"
                        );
                        let selection =
                            ModelSelection::new(model_id, provider_name, false, skips);
                        return Ok((selection, Arc::clone(&config)));
                    }
                    Ok(false) => skips.record(
                        Some(provider_name),
                        Some(model_id.as_str()),
                        SkipReason::Unavailable,
                    ),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => skips.record(
                        Some(provider_name),
                        Some(model_id.as_str()),
                        SkipReason::AvailabilityError(e.to_string()),
                    ),
                }
            }
        }

        tracing::warn!(
            profile = %parsed,
            required = ?required,
            "no available model has the required capabilities, using profile selection"
        );

        let mut selection = self.select_from(cancel, parsed, &config).await?;
        let mut skipped = skips.into_entries();
        skipped.append(&mut selection.skipped);
        selection.skipped = skipped;
        selection.capability_fallback = true;
        Ok((selection, config))
    }

    /// Find a provider that supports `model_id` and can serve it now.
    ///
    /// Returns `Ok(None)` when the model is unsupported or unavailable; only
    /// cancellation is an error.
    async fn find_available_provider(
        &self,
        cancel: &CancellationToken,
        model_id: &str,
        skips: &mut SkipLog,
    ) -> Result<Option<String>> {
        let provider = match self.registry.find_by_model(cancel, model_id).await {
            Ok(provider) => provider,
            Err(Error::Cancelled) => return Err(Error::Cancelled),
            Err(_) => {
                skips.record(None, Some(model_id), SkipReason::NoProvider);
                return Ok(None);
            }
        };

        let name = provider.info().name;
        match run_cancellable(cancel, provider.is_available(model_id)).await {
            Ok(true) => Ok(Some(name)),
            Ok(false) => {
                skips.record(Some(name.as_str()), Some(model_id), SkipReason::Unavailable);
                Ok(None)
            }
            Err(Error::Cancelled) => Err(Error::Cancelled),
            Err(e) => {
                skips.record(
                    Some(name.as_str()),
                    Some(model_id),
                    SkipReason::AvailabilityError(e.to_string()),
                );
                Ok(None)
            }
        }
    }

    async fn fallback_from(
        &self,
        cancel: &CancellationToken,
        profile: Profile,
        profile_config: &ProfileConfig,
        config: &RoutingConfig,
        mut skips: SkipLog,
    ) -> Result<ModelSelection> {
        let model = profile_config.fallback_model.as_str();
        if !model.is_empty() {
            if let Some(provider) = self.find_available_provider(cancel, model, &mut skips).await? {
                tracing::info!(
                    profile = %profile,
                    model = %model,
                    provider = %provider,
                    "using profile fallback model"
                );
                return Ok(ModelSelection::new(model, &provider, true, skips));
            }
        }

        for provider_name in &config.fallback_chain {
            let Some(provider) = self.registry.get(provider_name) else {
                skips.record(
                    Some(provider_name.as_str()),
                    None,
                    SkipReason::ProviderNotRegistered,
                );
                continue;
            };

            let models = match run_cancellable(cancel, provider.list_models()).await {
                Ok(models) => models,
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    skips.record(
                        Some(provider_name.as_str()),
                        None,
                        SkipReason::ListModelsFailed(e.to_string()),
                    );
                    continue;
                }
            };

            for model in &models {
                match run_cancellable(cancel, provider.is_available(model)).await {
                    Ok(true) => {
                        tracing::info!(
                            profile = %profile,
                            model = %model,
                            provider = %provider_name,
                            "using fallback chain model"
                        );
                        return Ok(ModelSelection::new(model, provider_name, true, skips));
                    }
                    Ok(false) => skips.record(
                        Some(provider_name.as_str()),
                        Some(model.as_str()),
                        SkipReason::Unavailable,
                    ),
                    Err(Error::Cancelled) => return Err(Error::Cancelled),
                    Err(e) => skips.record(
                        Some(provider_name.as_str()),
                        Some(model.as_str()),
                        SkipReason::AvailabilityError(e.to_string()),
                    ),
                }
            }
        }

        let skipped = skips.into_entries();
        tracing::warn!(
            profile = %profile,
            skipped = skipped.len(),
            "no fallback model available"
        );
        Err(Error::NoFallbackModel {
            profile: profile.to_string(),
            skipped,
        })
    }
}

fn profile_config(config: &RoutingConfig, profile: Profile) -> Result<&ProfileConfig> {
    config.profile(profile).ok_or_else(|| Error::NoProfileConfig {
        profile: profile.to_string(),
    })
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("providers", &self.enabled_providers())
            .field("registry", &self.registry)
            .finish()
    }
}

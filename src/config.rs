//! Routing configuration parsing and validation for tierwise.
//!
//! The configuration is produced by the embedding application (usually from a
//! TOML file) and handed to the [`Router`](crate::router::Router) and
//! [`Resolver`](crate::resolver::Resolver). It is treated as an immutable
//! snapshot once loaded: the router swaps whole configurations, never
//! individual fields.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// A named cost/quality routing tier requested by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Cheap,
    Balanced,
    Premium,
}

impl Profile {
    /// All valid profiles, cheapest first.
    pub const ALL: [Profile; 3] = [Profile::Cheap, Profile::Balanced, Profile::Premium];

    /// Lowercase name, as used for configuration keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Cheap => "cheap",
            Profile::Balanced => "balanced",
            Profile::Premium => "premium",
        }
    }

    /// Parse a profile name, treating anything unknown or empty as `balanced`.
    pub fn parse_lenient(name: &str) -> Self {
        name.parse().unwrap_or(Profile::Balanced)
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cheap" => Ok(Profile::Cheap),
            "balanced" => Ok(Profile::Balanced),
            "premium" => Ok(Profile::Premium),
            other => Err(Error::InvalidProfile {
                profile: other.to_string(),
            }),
        }
    }
}

/// Cost/capability classification of a single model.
///
/// Ordered `Cheap < Balanced < Premium`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Cheap,
    #[default]
    Balanced,
    Premium,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Cheap => "cheap",
            ModelTier::Balanced => "balanced",
            ModelTier::Premium => "premium",
        }
    }
}

impl fmt::Display for ModelTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root routing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Provider name to provider configuration
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Profile name (`cheap`, `balanced`, `premium`) to profile configuration
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    /// Provider names tried in order when a profile's own models are unavailable
    #[serde(default)]
    pub fallback_chain: Vec<String>,
    /// Provider used when the caller does not name one
    #[serde(default)]
    pub default_provider: String,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower values are served first
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Self-hosted providers are always zero-cost
    #[serde(default)]
    pub is_local: bool,
    /// Base URL of the provider's API. May contain `${VAR}` references.
    #[serde(default)]
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub rate_limits: RateLimits,
    /// Model id to model configuration
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
}

impl ProviderConfig {
    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: default_priority(),
            is_local: false,
            base_url: String::new(),
            timeout_secs: default_timeout_secs(),
            rate_limits: RateLimits::default(),
            models: BTreeMap::new(),
        }
    }
}

/// Per-provider rate limits. `None` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub requests_per_minute: Option<u32>,
    pub tokens_per_minute: Option<u32>,
}

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub tier: ModelTier,
    /// USD per input token
    #[serde(default)]
    pub cost_per_input_token: f64,
    /// USD per output token
    #[serde(default)]
    pub cost_per_output_token: f64,
    #[serde(default)]
    pub max_tokens: u32,
    #[serde(default)]
    pub context_window: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl ModelConfig {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            tier: ModelTier::default(),
            cost_per_input_token: 0.0,
            cost_per_output_token: 0.0,
            max_tokens: 0,
            context_window: 0,
            enabled: true,
            capabilities: BTreeSet::new(),
            aliases: Vec::new(),
        }
    }
}

/// Models assigned to one routing profile. Empty strings mean "unset".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub generation_model: String,
    #[serde(default)]
    pub review_model: String,
    #[serde(default)]
    pub fallback_model: String,
    #[serde(default)]
    pub max_context_tokens: u32,
    #[serde(default)]
    pub prefer_local: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_priority() -> i32 {
    100
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RoutingConfig {
    /// Load configuration from a TOML file, expanding `${VAR}` references.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string, expanding `${VAR}` references.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse configuration using a custom environment lookup.
    pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: RoutingConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

        for (name, provider) in config.providers.iter_mut() {
            provider.base_url = expand_env_vars_with(&provider.base_url, name, &lookup)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.providers.is_empty() {
            tracing::warn!("No providers configured - every selection will fail");
        }

        for name in self.profiles.keys() {
            if name.parse::<Profile>().is_err() {
                return Err(ConfigError::Validation(format!(
                    "Unknown profile '{}': expected one of cheap, balanced, premium",
                    name
                )));
            }
        }

        for (provider_name, provider) in &self.providers {
            for (model_id, model) in &provider.models {
                for cost in [model.cost_per_input_token, model.cost_per_output_token] {
                    if !cost.is_finite() || cost < 0.0 {
                        return Err(ConfigError::Validation(format!(
                            "Model '{}' of provider '{}' has an invalid cost {}: \
                             costs must be finite and non-negative",
                            model_id, provider_name, cost
                        )));
                    }
                }
            }
        }

        for name in &self.fallback_chain {
            if !self.providers.contains_key(name) {
                return Err(ConfigError::Validation(format!(
                    "Fallback chain references unknown provider '{}'",
                    name
                )));
            }
        }

        if !self.default_provider.is_empty() && !self.providers.contains_key(&self.default_provider)
        {
            return Err(ConfigError::Validation(format!(
                "Default provider '{}' is not configured",
                self.default_provider
            )));
        }

        for (profile, cfg) in &self.profiles {
            for model in [&cfg.generation_model, &cfg.review_model, &cfg.fallback_model] {
                if !model.is_empty() && self.find_model(model).is_none() {
                    // A registered provider may still serve it dynamically.
                    tracing::warn!(
                        profile = %profile,
                        model = %model,
                        "Profile references a model no provider configures"
                    );
                }
            }
        }

        Ok(())
    }

    /// Configuration for a profile, if present.
    pub fn profile(&self, profile: Profile) -> Option<&ProfileConfig> {
        self.profiles.get(profile.as_str())
    }

    /// All providers ordered by ascending priority, ties broken by name.
    pub fn providers_by_priority(&self) -> Vec<(&str, &ProviderConfig)> {
        let mut providers: Vec<(&str, &ProviderConfig)> = self
            .providers
            .iter()
            .map(|(name, cfg)| (name.as_str(), cfg))
            .collect();
        providers.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then(a.0.cmp(b.0)));
        providers
    }

    /// Enabled provider names ordered by ascending priority.
    pub fn enabled_provider_names(&self) -> Vec<String> {
        self.providers_by_priority()
            .into_iter()
            .filter(|(_, cfg)| cfg.enabled)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Find a model by id or alias.
    ///
    /// Enabled providers are searched in priority order; an exact id match
    /// anywhere wins over an alias match. Returns the configuring provider's
    /// name and the model configuration.
    pub fn find_model(&self, model_id: &str) -> Option<(&str, &ModelConfig)> {
        let providers: Vec<(&str, &ProviderConfig)> = self
            .providers_by_priority()
            .into_iter()
            .filter(|(_, provider)| provider.enabled)
            .collect();

        let exact = providers.iter().find_map(|(name, provider)| {
            provider.models.get(model_id).map(|model| (*name, model))
        });
        if exact.is_some() {
            return exact;
        }

        providers.iter().find_map(|(name, provider)| {
            provider
                .models
                .values()
                .find(|model| model.aliases.iter().any(|alias| alias == model_id))
                .map(|model| (*name, model))
        })
    }

    /// Model configuration by id or alias.
    pub fn model_config(&self, model_id: &str) -> Option<&ModelConfig> {
        self.find_model(model_id).map(|(_, model)| model)
    }

    /// Name of the provider configuring a model.
    pub fn provider_for_model(&self, model_id: &str) -> Option<&str> {
        self.find_model(model_id).map(|(provider, _)| provider)
    }

    /// Whether the model's configuring provider is self-hosted.
    pub fn is_local_model(&self, model_id: &str) -> bool {
        self.provider_for_model(model_id)
            .and_then(|name| self.providers.get(name))
            .map(|provider| provider.is_local)
            .unwrap_or(false)
    }

    /// Enabled `(provider, model)` pairs of the given tier, in priority order.
    pub fn models_for_tier(&self, tier: ModelTier) -> Vec<(String, String)> {
        self.providers_by_priority()
            .into_iter()
            .filter(|(_, provider)| provider.enabled)
            .flat_map(|(name, provider)| {
                provider
                    .models
                    .iter()
                    .filter(move |(_, model)| model.enabled && model.tier == tier)
                    .map(move |(id, _)| (name.to_string(), id.clone()))
            })
            .collect()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Cannot expand base_url of provider '{provider}': {message}")]
    EnvVar {
        var: String,
        provider: String,
        message: String,
    },
}

/// Expand `${VAR}` references in a provider's `base_url`.
///
/// `lookup` resolves variable names. The first unset, empty or unterminated
/// reference fails the whole value; a `$` not followed by `{` is literal.
pub fn expand_env_vars_with<F>(
    value: &str,
    provider: &str,
    lookup: F,
) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_error = |var: &str, message: String| ConfigError::EnvVar {
        var: var.to_string(),
        provider: provider.to_string(),
        message,
    };

    let mut expanded = String::with_capacity(value.len());
    let mut remaining = value;

    while let Some((literal, reference)) = remaining.split_once("${") {
        expanded.push_str(literal);

        let Some((name, tail)) = reference.split_once('}') else {
            return Err(env_error(
                "<unclosed>",
                format!("unterminated '${{' in '{}'", value),
            ));
        };
        if name.is_empty() {
            return Err(env_error("", format!("empty '${{}}' reference in '{}'", value)));
        }

        match lookup(name) {
            Some(resolved) => expanded.push_str(&resolved),
            None => {
                return Err(env_error(
                    name,
                    format!("environment variable '{}' is not set", name),
                ))
            }
        }
        remaining = tail;
    }

    expanded.push_str(remaining);
    Ok(expanded)
}

//! A provider backed only by its configuration entry.
//!
//! Useful for dry-run routing (the `route` CLI command) and for embedding
//! applications that want deterministic routing without live backends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    CompletionRequest, CompletionResponse, HealthStatus, ProviderInfo, ProviderPort, StreamChunk,
};
use crate::config::{ModelConfig, ProviderConfig};
use crate::error::{Error, Result};

pub struct ConfiguredProvider {
    name: String,
    config: ProviderConfig,
    down: AtomicBool,
}

impl ConfiguredProvider {
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        Self {
            name: name.into(),
            config,
            down: AtomicBool::new(false),
        }
    }

    /// Mark the provider up or down. A down provider reports every model
    /// unavailable and fails health checks.
    pub fn set_available(&self, available: bool) {
        self.down.store(!available, Ordering::SeqCst);
        tracing::debug!(provider = %self.name, available, "provider availability changed");
    }

    fn model(&self, model_id: &str) -> Option<&ModelConfig> {
        self.config.models.get(model_id).or_else(|| {
            self.config
                .models
                .values()
                .find(|m| m.aliases.iter().any(|alias| alias == model_id))
        })
    }

    fn is_down(&self) -> bool {
        self.down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderPort for ConfiguredProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            is_local: self.config.is_local,
            base_url: self.config.base_url.clone(),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self
            .config
            .models
            .iter()
            .filter(|(_, model)| model.enabled)
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn supports_model(&self, model_id: &str) -> Result<bool> {
        Ok(self.model(model_id).is_some())
    }

    async fn is_available(&self, model_id: &str) -> Result<bool> {
        if self.is_down() || !self.config.enabled {
            return Ok(false);
        }
        Ok(self.model(model_id).map(|m| m.enabled).unwrap_or(false))
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Err(Error::Unsupported(format!(
            "provider '{}' is configuration-only and cannot complete requests",
            self.name
        )))
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
        _on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> Result<CompletionResponse> {
        Err(Error::Unsupported(format!(
            "provider '{}' is configuration-only and cannot stream",
            self.name
        )))
    }

    async fn health_check(&self, model_id: &str) -> Result<HealthStatus> {
        if self.is_down() {
            return Ok(HealthStatus::unhealthy("marked unavailable"));
        }
        if !model_id.is_empty() && self.model(model_id).is_none() {
            return Ok(HealthStatus::unhealthy(format!(
                "model '{}' not configured",
                model_id
            )));
        }
        Ok(HealthStatus::healthy(Duration::ZERO))
    }
}

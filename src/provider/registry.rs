//! Provider registry: name-to-provider catalog with stable iteration order.
//!
//! The registry is shared by every in-flight request. One readers-writer
//! lock guards the map and the order list; lookups take the shared lock,
//! `register`/`remove`/`clear` take the exclusive lock. Methods that talk to
//! providers copy what they need out of the lock first and never hold it
//! across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use super::{ConfiguredProvider, ProviderPort};
use crate::cancel::run_cancellable;
use crate::config::RoutingConfig;
use crate::error::{Error, Result};

#[derive(Default)]
struct RegistryInner {
    providers: HashMap<String, Arc<dyn ProviderPort>>,
    /// Names in first-registration order.
    order: Vec<String>,
}

impl RegistryInner {
    fn ordered(&self) -> Vec<(String, Arc<dyn ProviderPort>)> {
        self.order
            .iter()
            .filter_map(|name| {
                self.providers
                    .get(name)
                    .map(|provider| (name.clone(), Arc::clone(provider)))
            })
            .collect()
    }
}

/// Registry of live provider instances.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of [`ConfiguredProvider`]s, one per enabled provider,
    /// registered in priority order.
    pub fn from_config(config: &RoutingConfig) -> Self {
        let registry = Self::new();
        for (name, provider) in config.providers_by_priority() {
            if !provider.enabled {
                continue;
            }
            let adapter: Arc<dyn ProviderPort> =
                Arc::new(ConfiguredProvider::new(name, provider.clone()));
            // Names come from map keys, so they are unique; only an empty
            // key could fail and that provider is simply left out.
            if let Err(e) = registry.register(adapter) {
                tracing::warn!(provider = %name, error = %e, "skipping provider");
            }
        }
        registry
    }

    /// Register a provider under the name it reports.
    ///
    /// Re-registering a name replaces the instance but keeps its original
    /// position in iteration order.
    pub fn register(&self, provider: Arc<dyn ProviderPort>) -> Result<()> {
        let name = provider.info().name;
        if name.is_empty() {
            return Err(Error::InvalidProvider(
                "provider reported an empty name".to_string(),
            ));
        }

        let mut inner = self.inner.write();
        if inner.providers.insert(name.clone(), provider).is_none() {
            inner.order.push(name.clone());
            tracing::debug!(provider = %name, "provider registered");
        } else {
            tracing::debug!(provider = %name, "provider replaced");
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderPort>> {
        self.inner.read().providers.get(name).cloned()
    }

    pub fn get_required(&self, name: &str) -> Result<Arc<dyn ProviderPort>> {
        self.get(name).ok_or_else(|| Error::ProviderNotFound {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().providers.contains_key(name)
    }

    /// Provider names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.inner.read().order.clone()
    }

    /// Provider instances in registration order.
    pub fn list_providers(&self) -> Vec<Arc<dyn ProviderPort>> {
        self.inner
            .read()
            .ordered()
            .into_iter()
            .map(|(_, provider)| provider)
            .collect()
    }

    /// Remove a provider. Returns whether it was registered.
    pub fn remove(&self, name: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.providers.remove(name).is_none() {
            return false;
        }
        inner.order.retain(|n| n != name);
        tracing::debug!(provider = %name, "provider removed");
        true
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.providers.clear();
        inner.order.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// First provider, in registration order, that supports `model_id`.
    ///
    /// A provider whose `supports_model` call fails is treated as not
    /// supporting the model. Cancellation aborts the scan.
    pub async fn find_by_model(
        &self,
        cancel: &CancellationToken,
        model_id: &str,
    ) -> Result<Arc<dyn ProviderPort>> {
        let candidates = self.inner.read().ordered();

        for (name, provider) in candidates {
            match run_cancellable(cancel, provider.supports_model(model_id)).await {
                Ok(true) => return Ok(provider),
                Ok(false) => {}
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    tracing::debug!(
                        provider = %name,
                        model = %model_id,
                        error = %e,
                        "supports_model failed, treating as unsupported"
                    );
                }
            }
        }

        Err(Error::NoProvider {
            model: model_id.to_string(),
        })
    }

    /// Providers reporting healthy on a general liveness check.
    ///
    /// Checks run concurrently; the result keeps registration order. Check
    /// errors count as unhealthy.
    pub async fn find_available(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<dyn ProviderPort>>> {
        let candidates = self.inner.read().ordered();

        let checks = candidates.iter().map(|(name, provider)| async move {
            match provider.health_check("").await {
                Ok(status) => status.healthy,
                Err(e) => {
                    tracing::debug!(provider = %name, error = %e, "health check failed");
                    false
                }
            }
        });

        let results =
            run_cancellable(cancel, async { Ok(futures::future::join_all(checks).await) })
                .await?;

        Ok(candidates
            .into_iter()
            .zip(results)
            .filter(|(_, healthy)| *healthy)
            .map(|((_, provider), _)| provider)
            .collect())
    }

    /// Providers reporting `is_local`, in registration order.
    pub fn local_providers(&self) -> Vec<Arc<dyn ProviderPort>> {
        self.list_providers()
            .into_iter()
            .filter(|p| p.info().is_local)
            .collect()
    }

    /// Providers not reporting `is_local`, in registration order.
    pub fn cloud_providers(&self) -> Vec<Arc<dyn ProviderPort>> {
        self.list_providers()
            .into_iter()
            .filter(|p| !p.info().is_local)
            .collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}

//! Scripted provider used by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::provider::{
    CompletionRequest, CompletionResponse, HealthStatus, ProviderInfo, ProviderPort, StreamChunk,
    Usage,
};

pub(crate) struct MockProvider {
    name: String,
    is_local: bool,
    models: Vec<String>,
    unavailable: Mutex<HashSet<String>>,
    fail_support: bool,
    fail_availability: bool,
    fail_list: bool,
    healthy: bool,
    delay: Option<Duration>,
    pub(crate) availability_calls: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn new(name: &str, models: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            is_local: false,
            models: models.iter().map(|m| m.to_string()).collect(),
            unavailable: Mutex::new(HashSet::new()),
            fail_support: false,
            fail_availability: false,
            fail_list: false,
            healthy: true,
            delay: None,
            availability_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    pub(crate) fn unavailable(self, model: &str) -> Self {
        self.unavailable.lock().insert(model.to_string());
        self
    }

    pub(crate) fn failing_support(mut self) -> Self {
        self.fail_support = true;
        self
    }

    pub(crate) fn failing_availability(mut self) -> Self {
        self.fail_availability = true;
        self
    }

    pub(crate) fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub(crate) fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_model_available(&self, model: &str, available: bool) {
        let mut unavailable = self.unavailable.lock();
        if available {
            unavailable.remove(model);
        } else {
            unavailable.insert(model.to_string());
        }
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProviderPort for MockProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            is_local: self.is_local,
            base_url: format!("mock://{}", self.name),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.pause().await;
        if self.fail_list {
            return Err(Error::Provider(format!("{}: list failed", self.name)));
        }
        Ok(self.models.clone())
    }

    async fn supports_model(&self, model_id: &str) -> Result<bool> {
        self.pause().await;
        if self.fail_support {
            return Err(Error::Provider(format!("{}: support lookup failed", self.name)));
        }
        Ok(self.models.iter().any(|m| m == model_id))
    }

    async fn is_available(&self, model_id: &str) -> Result<bool> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.fail_availability {
            return Err(Error::Provider(format!("{}: availability failed", self.name)));
        }
        Ok(self.models.iter().any(|m| m == model_id) && !self.unavailable.lock().contains(model_id))
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        Ok(CompletionResponse {
            model: request.model,
            content: "mock".to_string(),
            finish_reason: Some("stop".to_string()),
            usage: Usage::default(),
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
        on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> Result<CompletionResponse> {
        on_chunk(StreamChunk {
            content: "mock".to_string(),
            done: true,
        });
        self.complete(request).await
    }

    async fn health_check(&self, _model_id: &str) -> Result<HealthStatus> {
        self.pause().await;
        if self.healthy {
            Ok(HealthStatus::healthy(Duration::from_millis(1)))
        } else {
            Err(Error::Provider(format!("{}: connection refused", self.name)))
        }
    }
}

/// Two-provider configuration shared by router and resolver tests.
///
/// `ollama` (priority 1, local) serves llama3.2 8b/3b; `anthropic`
/// (priority 2) serves claude-3-5-sonnet with vision and function calling.
pub(crate) const SCENARIO_CONFIG: &str = r#"
    default_provider = "ollama"
    fallback_chain = ["ollama", "anthropic"]

    [providers.ollama]
    priority = 1
    is_local = true
    base_url = "http://localhost:11434"

    [providers.ollama.models."llama3.2:8b"]
    tier = "balanced"
    max_tokens = 4096
    context_window = 128000
    capabilities = ["function_calling"]

    [providers.ollama.models."llama3.2:3b"]
    tier = "cheap"
    max_tokens = 2048

    [providers.anthropic]
    priority = 2
    base_url = "https://api.anthropic.com"

    [providers.anthropic.models."claude-3-5-sonnet-20241022"]
    tier = "premium"
    cost_per_input_token = 0.003
    cost_per_output_token = 0.015
    max_tokens = 8192
    capabilities = ["vision", "function_calling"]

    [profiles.cheap]
    generation_model = "llama3.2:3b"
    review_model = "llama3.2:8b"

    [profiles.balanced]
    generation_model = "llama3.2:8b"
    fallback_model = "llama3.2:3b"
    max_context_tokens = 1000

    [profiles.premium]
    generation_model = "claude-3-5-sonnet-20241022"
    review_model = "claude-3-5-sonnet-20241022"
    fallback_model = "llama3.2:8b"
"#;

pub(crate) fn scenario_config() -> crate::config::RoutingConfig {
    crate::config::RoutingConfig::parse_str(SCENARIO_CONFIG).expect("scenario config must parse")
}

/// Registry with mock `ollama` and `anthropic` providers matching
/// [`SCENARIO_CONFIG`]. The returned handles toggle availability.
pub(crate) fn scenario_registry() -> (
    std::sync::Arc<crate::provider::ProviderRegistry>,
    std::sync::Arc<MockProvider>,
    std::sync::Arc<MockProvider>,
) {
    use std::sync::Arc;

    let registry = Arc::new(crate::provider::ProviderRegistry::new());
    let ollama = Arc::new(MockProvider::new("ollama", &["llama3.2:8b", "llama3.2:3b"]).local());
    let anthropic = Arc::new(MockProvider::new("anthropic", &["claude-3-5-sonnet-20241022"]));
    for provider in [Arc::clone(&ollama), Arc::clone(&anthropic)] {
        registry.register(provider).expect("mock registration");
    }
    (registry, ollama, anthropic)
}

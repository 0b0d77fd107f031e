//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use tierwise::error::{Error, Result};
use tierwise::provider::{
    CompletionRequest, CompletionResponse, HealthStatus, ProviderInfo, ProviderPort,
    ProviderRegistry, StreamChunk,
};
use tierwise::RoutingConfig;

/// In-memory provider whose model availability can be switched at runtime.
pub struct SwitchProvider {
    name: String,
    is_local: bool,
    models: Vec<String>,
    down: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    pub availability_calls: AtomicUsize,
}

impl SwitchProvider {
    pub fn new(name: &str, models: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            is_local: false,
            models: models.iter().map(|m| m.to_string()).collect(),
            down: Mutex::new(HashSet::new()),
            delay: None,
            availability_calls: AtomicUsize::new(0),
        }
    }

    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_down(&self, model: &str, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(model.to_string());
        } else {
            set.remove(model);
        }
    }

    pub fn set_all_down(&self) {
        let mut set = self.down.lock();
        for model in &self.models {
            set.insert(model.clone());
        }
    }
}

#[async_trait]
impl ProviderPort for SwitchProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            is_local: self.is_local,
            base_url: format!("test://{}", self.name),
        }
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(self.models.clone())
    }

    async fn supports_model(&self, model_id: &str) -> Result<bool> {
        Ok(self.models.iter().any(|m| m == model_id))
    }

    async fn is_available(&self, model_id: &str) -> Result<bool> {
        self.availability_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.models.iter().any(|m| m == model_id) && !self.down.lock().contains(model_id))
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse> {
        Err(Error::Unsupported("test provider".to_string()))
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
        _on_chunk: &mut (dyn FnMut(StreamChunk) + Send),
    ) -> Result<CompletionResponse> {
        Err(Error::Unsupported("test provider".to_string()))
    }

    async fn health_check(&self, _model_id: &str) -> Result<HealthStatus> {
        Ok(HealthStatus::healthy(Duration::from_millis(1)))
    }
}

pub const CONFIG: &str = r#"
default_provider = "ollama"
fallback_chain = ["ollama", "openai", "anthropic"]

[providers.ollama]
priority = 1
is_local = true
base_url = "http://localhost:11434"

[providers.ollama.models."llama3.2:8b"]
tier = "balanced"
max_tokens = 4096
capabilities = ["function_calling"]

[providers.ollama.models."llama3.2:3b"]
tier = "cheap"
max_tokens = 2048

[providers.openai]
priority = 5
base_url = "https://api.openai.com/v1"

[providers.openai.models."gpt-4o-mini"]
tier = "cheap"
cost_per_input_token = 0.00015
cost_per_output_token = 0.0006
max_tokens = 16384
capabilities = ["function_calling", "json_mode"]

[providers.anthropic]
priority = 10
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
fallback_model = "gpt-4o-mini"
max_context_tokens = 4000

[profiles.balanced]
generation_model = "llama3.2:8b"
review_model = "claude-3-5-sonnet-20241022"
fallback_model = "gpt-4o-mini"
max_context_tokens = 16000

[profiles.premium]
generation_model = "claude-3-5-sonnet-20241022"
review_model = "claude-3-5-sonnet-20241022"
fallback_model = "llama3.2:8b"
max_context_tokens = 32000
"#;

pub fn config() -> RoutingConfig {
    RoutingConfig::parse_str(CONFIG).expect("test config must parse")
}

pub struct Fixture {
    pub registry: Arc<ProviderRegistry>,
    pub ollama: Arc<SwitchProvider>,
    pub openai: Arc<SwitchProvider>,
    pub anthropic: Arc<SwitchProvider>,
}

/// Registry with one switchable provider per entry of [`CONFIG`].
pub fn fixture() -> Fixture {
    let registry = Arc::new(ProviderRegistry::new());
    let ollama = Arc::new(SwitchProvider::new("ollama", &["llama3.2:8b", "llama3.2:3b"]).local());
    let openai = Arc::new(SwitchProvider::new("openai", &["gpt-4o-mini"]));
    let anthropic = Arc::new(SwitchProvider::new("anthropic", &["claude-3-5-sonnet-20241022"]));

    registry.register(ollama.clone()).expect("register ollama");
    registry.register(openai.clone()).expect("register openai");
    registry.register(anthropic.clone()).expect("register anthropic");

    Fixture {
        registry,
        ollama,
        openai,
        anthropic,
    }
}

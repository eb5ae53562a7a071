//! Provider router: selects the LLM backend for the active mode.

use async_trait::async_trait;
use parley_config::{AgentMode, AgentSettings};
use parley_core::error::ProviderError;
use parley_core::provider::{PromptTurn, Provider, ProviderResponse};
use std::sync::Arc;
use std::time::Duration;

use crate::openai_compat::OpenAiCompatProvider;

/// A backend that cannot be used; every call fails with `NotConfigured`.
pub struct UnavailableProvider {
    name: String,
    reason: String,
}

impl UnavailableProvider {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Provider for UnavailableProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, _turn: PromptTurn) -> std::result::Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured(self.reason.clone()))
    }
}

/// Build the provider for the settings' active mode.
///
/// Online mode without an API key yields an [`UnavailableProvider`] so the
/// failure surfaces per invocation as `provider_unavailable`.
pub fn build_provider(settings: &AgentSettings) -> Arc<dyn Provider> {
    let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));

    match settings.active_mode() {
        AgentMode::Local => {
            tracing::info!(endpoint = %settings.local_url, model = %settings.local_model, "Using local LLM backend");
            Arc::new(OpenAiCompatProvider::local(settings.local_url.clone(), timeout))
        }
        AgentMode::Online => match settings.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            Some(key) => {
                tracing::info!(endpoint = %settings.online_url, model = %settings.online_model, "Using online LLM backend");
                Arc::new(OpenAiCompatProvider::online(settings.online_url.clone(), key, timeout))
            }
            None => {
                tracing::warn!("Online mode selected but no API key is configured");
                Arc::new(UnavailableProvider::new(
                    "online",
                    "missing API key; set PARLEY_API_KEY or OPENAI_API_KEY",
                ))
            }
        },
    }
}

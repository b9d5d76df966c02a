//! Provider factory — build the configured adapter from settings

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiCompatProvider;
use crate::provider::LlmProvider;
use devtwin_core::{DevtwinConfig, Provider, Settings};
use std::sync::Arc;

/// Construct the provider selected by `PROVIDER`, honoring `BASE_URL` and
/// the configured openrouter endpoint.
pub fn make_provider(settings: &Settings, config: &DevtwinConfig) -> Arc<dyn LlmProvider> {
    match settings.provider {
        Provider::Anthropic => {
            let mut provider = AnthropicProvider::new(&settings.api_key);
            if let Some(base_url) = &settings.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        Provider::OpenAi => {
            let mut provider = OpenAiCompatProvider::new("openai", &settings.api_key);
            if let Some(base_url) = &settings.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
        Provider::OpenRouter => {
            let base_url = settings
                .base_url
                .clone()
                .unwrap_or_else(|| config.providers.openrouter_base_url.clone());
            Arc::new(OpenAiCompatProvider::new("openrouter", &settings.api_key).with_base_url(base_url))
        }
        Provider::Google => {
            let mut provider = OpenAiCompatProvider::google(&settings.api_key);
            if let Some(base_url) = &settings.base_url {
                provider = provider.with_base_url(base_url);
            }
            Arc::new(provider)
        }
    }
}

//! Model backends for sandclaw.
//!
//! Every backend speaks the OpenAI chat-completions protocol; the provider
//! kind in configuration only decides the endpoint and credentials.

pub mod openai_compat;

use std::sync::Arc;
use sandclaw_config::{ProviderConfig, ProviderKind};
use sandclaw_core::error::ProviderError;
use sandclaw_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the provider selected by configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_default();

    let provider = match config.kind {
        ProviderKind::OpenAi => {
            require_key(config)?;
            match &config.base_url {
                Some(url) => OpenAiCompatProvider::new("openai", url, api_key),
                None => OpenAiCompatProvider::openai(api_key),
            }
        }
        ProviderKind::OpenRouter => {
            require_key(config)?;
            let provider = match &config.base_url {
                Some(url) => OpenAiCompatProvider::new("openrouter", url, api_key),
                None => OpenAiCompatProvider::openrouter(api_key),
            };
            match &config.site_url {
                Some(site) => provider.with_referer(site),
                None => provider,
            }
        }
        ProviderKind::Local => {
            let url = config.base_url.as_deref().ok_or_else(|| {
                ProviderError::NotConfigured("the local provider needs a base_url (LLM_BASE_URL)".into())
            })?;
            OpenAiCompatProvider::local(url)
        }
    };

    tracing::debug!(provider = %config.kind, model = %config.model(), "Created provider");
    Ok(Arc::new(provider))
}

fn require_key(config: &ProviderConfig) -> Result<(), ProviderError> {
    if config.has_api_key() {
        Ok(())
    } else {
        Err(ProviderError::NotConfigured(format!("no API key for {}", config.kind)))
    }
}

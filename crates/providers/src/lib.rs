//! LLM provider implementations for tracefold.
//!
//! Every provider implements `tracefold_core::Provider`. The server talks
//! to a single OpenAI-compatible endpoint chosen by configuration.

pub mod openai_compat;

use std::sync::Arc;
use tracefold_config::ProviderSettings;
use tracefold_core::error::ProviderError;
use tracefold_core::provider::Provider;

pub use openai_compat::OpenAiCompatProvider;

/// Build the configured provider.
///
/// Fails with [`ProviderError::NotConfigured`] when no API key is set,
/// except for local Ollama endpoints which need none.
pub fn build_from_config(settings: &ProviderSettings) -> Result<Arc<dyn Provider>, ProviderError> {
    let name = provider_name(&settings.api_url);
    let api_key = match (&settings.api_key, name) {
        (Some(key), _) if !key.is_empty() => key.clone(),
        (_, "ollama") => "ollama".to_string(),
        _ => {
            return Err(ProviderError::NotConfigured(
                "no API key; set TRACEFOLD_API_KEY or OPENAI_API_KEY".into(),
            ));
        }
    };
    Ok(Arc::new(OpenAiCompatProvider::new(
        name,
        &settings.api_url,
        api_key,
    )))
}

/// A short name for well-known endpoints, used in logs.
fn provider_name(api_url: &str) -> &'static str {
    if api_url.contains("openrouter.ai") {
        "openrouter"
    } else if api_url.contains("api.openai.com") {
        "openai"
    } else if api_url.contains(":11434") {
        "ollama"
    } else {
        "custom"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let result = build_from_config(&ProviderSettings::default());
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn builds_named_provider() {
        let settings = ProviderSettings {
            api_key: Some("sk-test".into()),
            api_url: "https://openrouter.ai/api/v1".into(),
            ..ProviderSettings::default()
        };
        let provider = build_from_config(&settings).unwrap();
        assert_eq!(provider.name(), "openrouter");
    }

    #[test]
    fn ollama_needs_no_key() {
        let settings = ProviderSettings {
            api_url: "http://localhost:11434/v1".into(),
            ..ProviderSettings::default()
        };
        assert_eq!(build_from_config(&settings).unwrap().name(), "ollama");
    }
}

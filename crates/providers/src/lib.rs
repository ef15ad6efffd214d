//! LLM provider implementations for stepwise.
//!
//! All providers implement the `stepwise_core::Provider` trait.
//! `build_from_config` turns the loaded configuration into one.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use std::sync::Arc;
use stepwise_core::error::ProviderError;
use stepwise_core::provider::Provider;

/// Build the configured provider.
///
/// Local endpoints (`localhost`, `127.0.0.1`) work without an API key;
/// anything else needs one.
pub fn build_from_config(
    config: &stepwise_config::AppConfig,
) -> Result<Arc<dyn Provider>, ProviderError> {
    let is_local = config.api_url.contains("localhost") || config.api_url.contains("127.0.0.1");
    let api_key = match (&config.api_key, is_local) {
        (Some(key), _) => key.clone(),
        (None, true) => String::new(),
        (None, false) => {
            return Err(ProviderError::NotConfigured(
                "no API key; set api_key in ~/.stepwise/config.toml or STEPWISE_API_KEY".into(),
            ));
        }
    };

    tracing::debug!(url = %config.api_url, model = %config.model, "Building provider");
    Ok(Arc::new(OpenAiCompatProvider::new(
        "openai-compatible",
        &config.api_url,
        api_key,
    )))
}

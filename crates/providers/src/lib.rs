//! Completion gateways for Counsel.
//!
//! All gateways implement the `counsel_core::Gateway` trait. The one built
//! from configuration is an OpenAI-compatible endpoint wrapped in retries.

pub mod openai_compat;
pub mod retry;

use std::sync::Arc;

use counsel_config::AppConfig;
use counsel_core::{Gateway, GatewayError};
use tracing::info;

pub use openai_compat::OpenAiCompatGateway;
pub use retry::{RetryPolicy, RetryingGateway};

/// Build the gateway described by `config`.
///
/// Local endpoints (Ollama, LM Studio, vLLM on localhost) work without an
/// API key; anything else requires one.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Gateway>, GatewayError> {
    let base_url = config.base_url.trim();
    let api_key = match config.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
        Some(key) => key.to_string(),
        None if is_local(base_url) => "local".to_string(),
        None => {
            return Err(GatewayError::NotConfigured(
                "no API key set; add api_key to config.toml or export COUNSEL_API_KEY".into(),
            ));
        }
    };

    let name = gateway_name(base_url);
    info!(gateway = name, base_url, "Configured completion gateway");

    let inner: Arc<dyn Gateway> = Arc::new(OpenAiCompatGateway::new(name, base_url, api_key));
    Ok(Arc::new(RetryingGateway::new(
        inner,
        RetryPolicy::from_config(&config.retry),
    )))
}

fn is_local(base_url: &str) -> bool {
    let rest = base_url
        .trim_start_matches("http://")
        .trim_start_matches("https://");
    rest.starts_with("localhost") || rest.starts_with("127.0.0.1") || rest.starts_with("[::1]")
}

fn gateway_name(base_url: &str) -> &'static str {
    if base_url.contains("openrouter.ai") {
        "openrouter"
    } else if base_url.contains("api.openai.com") {
        "openai"
    } else if base_url.contains(":11434") {
        "ollama"
    } else {
        "openai-compat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_not_configured() {
        let config = AppConfig::default();
        assert!(matches!(
            build_from_config(&config),
            Err(GatewayError::NotConfigured(_))
        ));
    }

    #[test]
    fn openrouter_by_default() {
        let config = AppConfig {
            api_key: Some("sk-or-test".into()),
            ..AppConfig::default()
        };
        let gateway = build_from_config(&config).unwrap();
        assert_eq!(gateway.name(), "openrouter");
    }

    #[test]
    fn local_endpoint_needs_no_key() {
        let config = AppConfig {
            base_url: "http://localhost:11434/v1".into(),
            ..AppConfig::default()
        };
        let gateway = build_from_config(&config).unwrap();
        assert_eq!(gateway.name(), "ollama");
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let config = AppConfig {
            api_key: Some("  ".into()),
            base_url: "https://api.openai.com/v1".into(),
            ..AppConfig::default()
        };
        assert!(build_from_config(&config).is_err());
    }
}

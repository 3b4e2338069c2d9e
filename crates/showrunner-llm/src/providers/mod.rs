//! Provider adapters
//!
//! One adapter per provider family. Each maps the four request fields onto
//! the provider's wire format and translates its failure signals into the
//! shared error taxonomy.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod xai;

use std::sync::Arc;

use showrunner_core::{ProviderConfig, ProviderKind};

use crate::provider::Provider;

pub use anthropic::AnthropicProvider;
pub use google::GoogleProvider;
pub use openai::OpenAiProvider;
pub use xai::XaiProvider;

/// Construct the adapter matching a provider config's kind
pub fn create_provider(config: ProviderConfig) -> Arc<dyn Provider> {
    match config.provider_kind {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(config)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)),
        ProviderKind::Google => Arc::new(GoogleProvider::new(config)),
        ProviderKind::Xai => Arc::new(XaiProvider::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: ProviderKind, env_var: &str) -> ProviderConfig {
        ProviderConfig {
            name: "test".to_string(),
            provider_kind: kind,
            model: "test-model".to_string(),
            credential_env_var: env_var.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
            timeout_secs: 30,
        }
    }

    #[test]
    fn test_factory_dispatch() {
        let anthropic = create_provider(config(ProviderKind::Anthropic, "SR_TEST_FACTORY_A"));
        assert_eq!(anthropic.kind(), ProviderKind::Anthropic);

        let openai = create_provider(config(ProviderKind::OpenAi, "SR_TEST_FACTORY_B"));
        assert_eq!(openai.kind(), ProviderKind::OpenAi);

        let google = create_provider(config(ProviderKind::Google, "SR_TEST_FACTORY_C"));
        assert_eq!(google.kind(), ProviderKind::Google);

        let xai = create_provider(config(ProviderKind::Xai, "SR_TEST_FACTORY_D"));
        assert_eq!(xai.kind(), ProviderKind::Xai);
    }

    #[test]
    fn test_unavailable_without_credentials() {
        std::env::remove_var("SR_TEST_NO_KEY");
        let provider = create_provider(config(ProviderKind::Google, "SR_TEST_NO_KEY"));
        assert!(!provider.available());
    }

    #[test]
    fn test_available_with_credentials() {
        std::env::set_var("SR_TEST_WITH_KEY", "sk-test");
        let provider = create_provider(config(ProviderKind::Xai, "SR_TEST_WITH_KEY"));
        assert!(provider.available());
        std::env::remove_var("SR_TEST_WITH_KEY");
    }
}

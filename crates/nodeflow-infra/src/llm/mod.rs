//! Completion provider implementations.
//!
//! [`create_provider`] builds the configured provider from the `[ai]`
//! section, resolving the API key from the environment variable the section
//! names.

pub mod openai_compat;

use nodeflow_core::llm::box_provider::BoxLlmProvider;
use nodeflow_types::config::AiSection;
use nodeflow_types::llm::LlmError;
use secrecy::SecretString;

use self::openai_compat::{OpenAiCompatConfig, OpenAiCompatibleProvider};

/// Read the API key named by `section.api_key_env`.
pub fn api_key_from_env(section: &AiSection) -> Option<SecretString> {
    std::env::var(&section.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
}

/// Create a [`BoxLlmProvider`] from the `[ai]` section.
///
/// # Errors
///
/// [`LlmError::AuthenticationFailed`] when no API key is available.
pub fn create_provider(
    section: &AiSection,
    api_key: Option<SecretString>,
) -> Result<BoxLlmProvider, LlmError> {
    let api_key = api_key.ok_or(LlmError::AuthenticationFailed)?;
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig {
        provider_name: section.provider_name.clone(),
        base_url: section.base_url.clone(),
        api_key,
        model: section.default_model.clone(),
    });
    tracing::debug!(
        provider = %section.provider_name,
        base_url = %section.base_url,
        model = %section.default_model,
        "completion provider configured"
    );
    Ok(BoxLlmProvider::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_an_auth_error() {
        let err = create_provider(&AiSection::default(), None).err().unwrap();
        assert!(matches!(err, LlmError::AuthenticationFailed));
    }

    #[test]
    fn provider_uses_section_name() {
        let section = AiSection {
            provider_name: "dashscope".into(),
            ..AiSection::default()
        };
        let provider =
            create_provider(&section, Some(SecretString::from("sk-x".to_string()))).unwrap();
        assert_eq!(provider.name(), "dashscope");
    }

    #[test]
    fn blank_env_key_is_ignored() {
        let section = AiSection {
            api_key_env: "NODEFLOW_TEST_UNSET_KEY_VAR".into(),
            ..AiSection::default()
        };
        assert!(api_key_from_env(&section).is_none());
    }
}

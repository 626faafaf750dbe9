//! Language-model adapters behind `TranslationBackend`.
//!
//! Translation can go to OpenAI, Anthropic or Gemini depending on the server's
//! model setting; language detection always uses the OpenAI classifier.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod openai;
pub mod prompt;

use async_trait::async_trait;
use dtb_core::{
    backend::{BackendError, BackendKind, BackendTranslation, TranslationBackend},
    config::{Config, SystemPrompts},
    language::{Language, Mode},
};

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

/// Every configured provider, dispatched by `BackendKind`.
#[derive(Clone, Debug, Default)]
pub struct LlmBackends {
    openai: Option<OpenAiClient>,
    anthropic: Option<AnthropicClient>,
    gemini: Option<GeminiClient>,
    prompts: SystemPrompts,
}

impl LlmBackends {
    pub fn new(prompts: SystemPrompts) -> Self {
        Self {
            prompts,
            ..Self::default()
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let mut backends = Self::new(cfg.system_prompts.clone());
        backends.openai = cfg.openai_api_key.as_deref().map(OpenAiClient::new);
        backends.anthropic = cfg.anthropic_api_key.as_deref().map(AnthropicClient::new);
        backends.gemini = cfg.google_api_key.as_deref().map(GeminiClient::new);
        backends
    }

    pub fn with_openai(mut self, client: OpenAiClient) -> Self {
        self.openai = Some(client);
        self
    }

    pub fn with_anthropic(mut self, client: AnthropicClient) -> Self {
        self.anthropic = Some(client);
        self
    }

    pub fn with_gemini(mut self, client: GeminiClient) -> Self {
        self.gemini = Some(client);
        self
    }

    pub fn is_configured(&self, kind: BackendKind) -> bool {
        match kind {
            BackendKind::Gpt4o => self.openai.is_some(),
            BackendKind::Claude => self.anthropic.is_some(),
            BackendKind::Gemini => self.gemini.is_some(),
        }
    }

    pub fn configured(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|k| self.is_configured(*k))
            .collect()
    }
}

#[async_trait]
impl TranslationBackend for LlmBackends {
    async fn detect_language(&self, text: &str) -> Result<Language, BackendError> {
        let client = self
            .openai
            .as_ref()
            .ok_or(BackendError::MissingApiKey(BackendKind::Gpt4o))?;
        client.detect_language(text).await
    }

    async fn translate(
        &self,
        kind: BackendKind,
        text: &str,
        source: Language,
        mode: Mode,
    ) -> Result<BackendTranslation, BackendError> {
        let system_prompt = self.prompts.for_mode(mode);
        tracing::debug!("Translating {} chars via {kind} ({source}, {mode})", text.len());

        match kind {
            BackendKind::Gpt4o => {
                let client = self.openai.as_ref().ok_or(BackendError::MissingApiKey(kind))?;
                client.translate(system_prompt, text, source, mode).await
            }
            BackendKind::Claude => {
                let client = self
                    .anthropic
                    .as_ref()
                    .ok_or(BackendError::MissingApiKey(kind))?;
                client.translate(system_prompt, text, source, mode).await
            }
            BackendKind::Gemini => {
                let client = self.gemini.as_ref().ok_or(BackendError::MissingApiKey(kind))?;
                client.translate(system_prompt, text, source, mode).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_configured_providers() {
        let backends = LlmBackends::new(SystemPrompts::default())
            .with_anthropic(AnthropicClient::new("sk-ant"))
            .with_gemini(GeminiClient::new("g-key"));
        assert!(!backends.is_configured(BackendKind::Gpt4o));
        assert_eq!(
            backends.configured(),
            vec![BackendKind::Claude, BackendKind::Gemini]
        );
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_without_a_request() {
        let backends = LlmBackends::new(SystemPrompts::default());

        let err = backends
            .translate(BackendKind::Gemini, "안녕", Language::Kor, Mode::Korean)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingApiKey(BackendKind::Gemini)));

        let err = backends.detect_language("안녕").await.unwrap_err();
        assert!(matches!(err, BackendError::MissingApiKey(BackendKind::Gpt4o)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let backends = LlmBackends::new(SystemPrompts::default())
            .with_openai(OpenAiClient::with_base_url("sk-test", "http://127.0.0.1:9/v1"));

        let err = backends
            .translate(BackendKind::Gpt4o, "hello", Language::Eng, Mode::Korean)
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Transport { provider: "openai", .. }));
    }
}

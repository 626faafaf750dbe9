//! Anthropic messages API.

use dtb_core::{
    backend::{BackendError, BackendTranslation, TokenUsage},
    language::{Language, Mode},
};
use serde::{Deserialize, Serialize};

use crate::{
    http::{build_client, invalid, send_json},
    prompt::{clean_translation, estimate_usage, user_prompt},
};

const PROVIDER: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const MODEL: &str = "claude-3-7-sonnet-20250219";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Clone, Debug)]
pub struct AnthropicClient {
    api_key: String,
    messages_url: String,
    http: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            api_key: api_key.into(),
            messages_url: format!("{}/v1/messages", base_url.trim_end_matches('/')),
            http: build_client(),
        }
    }

    pub async fn translate(
        &self,
        system_prompt: &str,
        text: &str,
        source: Language,
        mode: Mode,
    ) -> Result<BackendTranslation, BackendError> {
        let prompt = user_prompt(text, source, mode);
        let req = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: system_prompt,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };
        let builder = self
            .http
            .post(&self.messages_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&req);
        let resp: MessagesResponse = send_json(PROVIDER, builder).await?;
        parse_translation(&resp, &[system_prompt, prompt.as_str()])
    }
}

fn parse_translation(
    resp: &MessagesResponse,
    prompt_parts: &[&str],
) -> Result<BackendTranslation, BackendError> {
    let text = resp
        .content
        .iter()
        .find_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
            _ => None,
        })
        .ok_or_else(|| invalid(PROVIDER, "no text block in response"))?;

    let translation = clean_translation(text);
    let tokens = match &resp.usage {
        Some(u) => TokenUsage::new(u.input_tokens, u.output_tokens),
        None => estimate_usage(prompt_parts, &translation),
    };
    Ok(BackendTranslation {
        translation,
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uses_reported_usage() {
        let resp: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "text", "text": "Hello"}],
            "usage": {"input_tokens": 40, "output_tokens": 3}
        }))
        .unwrap();
        let out = parse_translation(&resp, &["sys", "prompt"]).unwrap();
        assert_eq!(out.translation, "Hello");
        assert_eq!(out.tokens, TokenUsage::new(40, 3));
    }

    #[test]
    fn estimates_usage_when_missing() {
        let resp: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [{"type": "thinking", "thinking": "..."}, {"type": "text", "text": "Good morning"}]
        }))
        .unwrap();
        let out = parse_translation(&resp, &["abcdefgh", "abcd"]).unwrap();
        assert_eq!(out.translation, "Good morning");
        assert_eq!(out.tokens, TokenUsage::new(3, 3));
    }

    #[test]
    fn missing_text_block_is_invalid() {
        let resp: MessagesResponse =
            serde_json::from_value(serde_json::json!({"content": []})).unwrap();
        assert!(matches!(
            parse_translation(&resp, &[]),
            Err(BackendError::InvalidResponse { .. })
        ));
    }
}

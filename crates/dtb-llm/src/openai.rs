//! OpenAI chat completions: translation (gpt-4o) and language detection (gpt-4o-mini).

use dtb_core::{
    backend::{BackendError, BackendTranslation, TokenUsage},
    language::{Language, Mode},
};
use serde::{Deserialize, Serialize};

use crate::{
    http::{build_client, invalid, send_json},
    prompt::{clean_translation, user_prompt},
};

const PROVIDER: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const TRANSLATE_MODEL: &str = "gpt-4o";
const DETECT_MODEL: &str = "gpt-4o-mini";
const DETECT_PROMPT: &str = "Analyze the text and determine the alphabet used. \
Respond with 'Korean' for 한글, 'Japanese' for 日本語, or 'English' for English or other languages.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl ChatResponse {
    fn first_text(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            http: build_client(),
        }
    }

    async fn chat(&self, req: &ChatRequest<'_>) -> Result<ChatResponse, BackendError> {
        let builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(req);
        send_json(PROVIDER, builder).await
    }

    pub async fn detect_language(&self, text: &str) -> Result<Language, BackendError> {
        let req = ChatRequest {
            model: DETECT_MODEL,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: DETECT_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.0,
            max_tokens: 10,
        };
        let resp = self.chat(&req).await?;
        let answer = resp
            .first_text()
            .ok_or_else(|| invalid(PROVIDER, "empty detection answer"))?;
        Ok(Language::from_classifier_answer(answer))
    }

    pub async fn translate(
        &self,
        system_prompt: &str,
        text: &str,
        source: Language,
        mode: Mode,
    ) -> Result<BackendTranslation, BackendError> {
        let prompt = user_prompt(text, source, mode);
        let req = translate_request(system_prompt, &prompt);
        let resp = self.chat(&req).await?;
        parse_translation(&resp)
    }
}

fn translate_request<'a>(system_prompt: &'a str, prompt: &'a str) -> ChatRequest<'a> {
    ChatRequest {
        model: TRANSLATE_MODEL,
        messages: vec![
            ChatMessage {
                role: "system",
                content: system_prompt,
            },
            ChatMessage {
                role: "user",
                content: prompt,
            },
        ],
        temperature: 0.7,
        max_tokens: 1000,
    }
}

fn parse_translation(resp: &ChatResponse) -> Result<BackendTranslation, BackendError> {
    let text = resp
        .first_text()
        .ok_or_else(|| invalid(PROVIDER, "no choices in response"))?;
    let tokens = resp
        .usage
        .as_ref()
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();
    Ok(BackendTranslation {
        translation: clean_translation(text),
        tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_request_shape() {
        let v = serde_json::to_value(translate_request("be nice", "Translate...")).unwrap();
        assert_eq!(v["model"], "gpt-4o");
        assert_eq!(v["temperature"], 0.7);
        assert_eq!(v["max_tokens"], 1000);
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["messages"][0]["content"], "be nice");
        assert_eq!(v["messages"][1]["role"], "user");
    }

    #[test]
    fn parses_reply_and_usage() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": " Hello \n"}}],
            "usage": {"prompt_tokens": 30, "completion_tokens": 2, "total_tokens": 32}
        }))
        .unwrap();
        let out = parse_translation(&resp).unwrap();
        assert_eq!(out.translation, "Hello");
        assert_eq!(out.tokens, TokenUsage::new(30, 2));
    }

    #[test]
    fn empty_choices_is_invalid() {
        let resp: ChatResponse = serde_json::from_value(serde_json::json!({"choices": []})).unwrap();
        assert!(matches!(
            parse_translation(&resp),
            Err(BackendError::InvalidResponse { provider: "openai", .. })
        ));
    }
}

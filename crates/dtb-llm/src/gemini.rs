//! Google Gemini `generateContent`.

use dtb_core::{
    backend::{BackendError, BackendTranslation, TokenUsage},
    language::{Language, Mode},
};
use serde::{Deserialize, Serialize};

use crate::{
    http::{build_client, invalid, send_json},
    prompt::{clean_translation, estimate_usage, user_prompt},
};

const PROVIDER: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    top_k: u32,
    max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.5,
            top_p: 0.5,
            top_k: 40,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Clone, Debug)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl GeminiClient {
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

    pub async fn translate(
        &self,
        system_prompt: &str,
        text: &str,
        source: Language,
        mode: Mode,
    ) -> Result<BackendTranslation, BackendError> {
        let full_prompt = full_prompt(system_prompt, &user_prompt(text, source, mode));
        let req = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part {
                    text: Some(full_prompt.clone()),
                }],
            }],
            generation_config: GenerationConfig::default(),
        };
        let builder = self
            .http
            .post(format!("{}/models/{MODEL}:generateContent", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .json(&req);
        let resp: GenerateContentResponse = send_json(PROVIDER, builder).await?;
        parse_translation(&resp, &full_prompt)
    }
}

/// Gemini gets the system prompt folded into the single user turn.
fn full_prompt(system_prompt: &str, prompt: &str) -> String {
    if system_prompt.trim().is_empty() {
        prompt.to_string()
    } else {
        format!("{system_prompt}\n\n{prompt}")
    }
}

fn parse_translation(
    resp: &GenerateContentResponse,
    full_prompt: &str,
) -> Result<BackendTranslation, BackendError> {
    let text: String = resp
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(invalid(PROVIDER, "no candidate text in response"));
    }

    let translation = clean_translation(&text);
    let tokens = match &resp.usage_metadata {
        Some(u) if u.prompt_token_count > 0 => {
            TokenUsage::new(u.prompt_token_count, u.candidates_token_count)
        }
        _ => estimate_usage(&[full_prompt], &translation),
    };
    Ok(BackendTranslation {
        translation,
        tokens,
    })
}

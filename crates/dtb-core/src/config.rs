use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    backend::BackendKind, errors::Error, language::Mode, memory::MemoryConfig,
    preprocess::PreprocessConfig, Result,
};

const DEFAULT_KOREAN_PROMPT: &str = "You are a professional translator for a Korean-centric chat community. \
Translate faithfully and naturally, keep names, emoji and formatting intact, \
and reply with the translation only, without quotes or commentary.";

const DEFAULT_JAPANESE_PROMPT: &str = "You are a professional translator for a Japanese-centric chat community. \
Translate faithfully and naturally, keep names, emoji and formatting intact, \
and reply with the translation only, without quotes or commentary.";

/// Reactions used to signal pipeline progress on the original message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEmojis {
    pub translating: String,
    pub error: String,
}

impl Default for ReactionEmojis {
    fn default() -> Self {
        Self {
            translating: "🔄".to_string(),
            error: "❌".to_string(),
        }
    }
}

/// System prompts per mode, handed to every backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemPrompts {
    pub korean: String,
    pub japanese: String,
}

impl SystemPrompts {
    pub fn for_mode(&self, mode: Mode) -> &str {
        match mode {
            Mode::Korean => &self.korean,
            Mode::Japanese => &self.japanese,
        }
    }
}

impl Default for SystemPrompts {
    fn default() -> Self {
        Self {
            korean: DEFAULT_KOREAN_PROMPT.to_string(),
            japanese: DEFAULT_JAPANESE_PROMPT.to_string(),
        }
    }
}

/// Typed configuration loaded from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub discord_token: String,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub command_prefix: String,

    // Server defaults
    pub default_mode: Mode,
    pub default_model: BackendKind,
    pub auto_translate: bool,

    // Storage
    pub data_dir: PathBuf,
    pub translation_memory_path: PathBuf,
    pub server_config_dir: PathBuf,
    pub translation_memory_limit: usize,
    pub memory_write_delay: Duration,
    pub memory_flush_threshold: usize,

    // Pipeline
    pub translation_concurrency: usize,
    pub preprocessing: PreprocessConfig,
    pub emojis: ReactionEmojis,
    pub system_prompts: SystemPrompts,
    pub metrics_log_every: u64,

    // Delivery
    pub message_safe_limit: usize,
    pub part_delay: Duration,
    pub webhook_name: String,
    pub webhook_avatar_url: Option<String>,
    pub error_avatar_url: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let discord_token = env_str("DISCORD_TOKEN").unwrap_or_default();
        if discord_token.trim().is_empty() {
            return Err(Error::Config(
                "DISCORD_TOKEN environment variable is required".to_string(),
            ));
        }

        let openai_api_key = env_str("OPENAI_API_KEY").and_then(non_empty);
        let anthropic_api_key = env_str("ANTHROPIC_API_KEY").and_then(non_empty);
        let google_api_key = env_str("GOOGLE_API_KEY").and_then(non_empty);

        let default_mode = match env_str("DEFAULT_MODE").and_then(non_empty) {
            Some(raw) => raw
                .parse::<Mode>()
                .map_err(|e| Error::Config(format!("DEFAULT_MODE: {e}")))?,
            None => Mode::Korean,
        };
        let default_model = match env_str("DEFAULT_MODEL").and_then(non_empty) {
            Some(raw) => raw
                .parse::<BackendKind>()
                .map_err(|e| Error::Config(format!("DEFAULT_MODEL: {e}")))?,
            None => BackendKind::Gpt4o,
        };

        let data_dir = env_path("DATA_DIR").unwrap_or_else(|| PathBuf::from("data"));
        let translation_memory_path = env_path("TRANSLATION_MEMORY_PATH")
            .unwrap_or_else(|| data_dir.join("translations.json"));
        let server_config_dir =
            env_path("SERVER_CONFIG_DIR").unwrap_or_else(|| data_dir.join("servers"));
        fs::create_dir_all(&data_dir)?;

        let preprocessing = PreprocessConfig {
            enabled: env_bool("PREPROCESS_ENABLED").unwrap_or(true),
            remove_emojis: env_bool("PREPROCESS_REMOVE_EMOJIS").unwrap_or(true),
            remove_timestamps: env_bool("PREPROCESS_REMOVE_TIMESTAMPS").unwrap_or(true),
            remove_urls: env_bool("PREPROCESS_REMOVE_URLS").unwrap_or(true),
        };

        let defaults = ReactionEmojis::default();
        let emojis = ReactionEmojis {
            translating: env_str("EMOJI_TRANSLATING")
                .and_then(non_empty)
                .unwrap_or(defaults.translating),
            error: env_str("EMOJI_ERROR")
                .and_then(non_empty)
                .unwrap_or(defaults.error),
        };

        let prompts = SystemPrompts::default();
        let system_prompts = SystemPrompts {
            korean: env_str("SYSTEM_PROMPT_KOREAN")
                .and_then(non_empty)
                .unwrap_or(prompts.korean),
            japanese: env_str("SYSTEM_PROMPT_JAPANESE")
                .and_then(non_empty)
                .unwrap_or(prompts.japanese),
        };

        Ok(Self {
            discord_token,
            openai_api_key,
            anthropic_api_key,
            google_api_key,
            command_prefix: env_str("COMMAND_PREFIX")
                .and_then(non_empty)
                .unwrap_or_else(|| "!".to_string()),
            default_mode,
            default_model,
            auto_translate: env_bool("AUTO_TRANSLATE").unwrap_or(true),
            data_dir,
            translation_memory_path,
            server_config_dir,
            translation_memory_limit: env_usize("TRANSLATION_MEMORY_LIMIT").unwrap_or(500),
            memory_write_delay: Duration::from_millis(
                env_u64("MEMORY_WRITE_DELAY_MS").unwrap_or(30_000),
            ),
            memory_flush_threshold: env_usize("MEMORY_FLUSH_THRESHOLD").unwrap_or(20).max(1),
            translation_concurrency: env_usize("TRANSLATION_CONCURRENCY").unwrap_or(3).max(1),
            preprocessing,
            emojis,
            system_prompts,
            metrics_log_every: env_u64("METRICS_LOG_EVERY").unwrap_or(50).max(1),
            // Discord caps messages at 2000 characters, part labels included.
            message_safe_limit: env_usize("DISCORD_SAFE_LIMIT").unwrap_or(1950).clamp(100, 2000),
            part_delay: Duration::from_millis(env_u64("PART_DELAY_MS").unwrap_or(500)),
            webhook_name: env_str("WEBHOOK_NAME")
                .and_then(non_empty)
                .unwrap_or_else(|| "TranslationBot".to_string()),
            webhook_avatar_url: env_str("WEBHOOK_AVATAR_URL").and_then(non_empty),
            error_avatar_url: env_str("ERROR_AVATAR_URL").and_then(non_empty),
        })
    }

    /// Providers without a key still load; selecting them fails per request.
    pub fn missing_api_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.openai_api_key.is_none() {
            missing.push("OPENAI_API_KEY");
        }
        if self.anthropic_api_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if self.google_api_key.is_none() {
            missing.push("GOOGLE_API_KEY");
        }
        missing
    }

    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            path: self.translation_memory_path.clone(),
            limit: self.translation_memory_limit,
            write_delay: self.memory_write_delay,
            flush_threshold: self.memory_flush_threshold,
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
pub(crate) fn test_config(data_dir: &Path) -> Config {
    Config {
        discord_token: "x".to_string(),
        openai_api_key: None,
        anthropic_api_key: None,
        google_api_key: None,
        command_prefix: "!".to_string(),
        default_mode: Mode::Korean,
        default_model: BackendKind::Gpt4o,
        auto_translate: true,
        data_dir: data_dir.to_path_buf(),
        translation_memory_path: data_dir.join("translations.json"),
        server_config_dir: data_dir.join("servers"),
        translation_memory_limit: 500,
        memory_write_delay: Duration::from_secs(30),
        memory_flush_threshold: 20,
        translation_concurrency: 3,
        preprocessing: PreprocessConfig::default(),
        emojis: ReactionEmojis::default(),
        system_prompts: SystemPrompts::default(),
        metrics_log_every: 50,
        message_safe_limit: 1950,
        part_delay: Duration::from_millis(0),
        webhook_name: "TranslationBot".to_string(),
        webhook_avatar_url: None,
        error_avatar_url: None,
    }
}

//! Message cleanup before detection and translation.

use regex::Regex;

/// Texts shorter than this (in characters) are passed through untouched.
const MIN_PREPROCESS_CHARS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub remove_emojis: bool,
    pub remove_timestamps: bool,
    pub remove_urls: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remove_emojis: true,
            remove_timestamps: true,
            remove_urls: true,
        }
    }
}

/// Compiled preprocessing rules. Build once, share freely.
#[derive(Clone, Debug)]
pub struct Preprocessor {
    cfg: PreprocessConfig,
    emoji: Regex,
    timestamp: Regex,
    url: Regex,
    blank_lines: Regex,
}

impl Preprocessor {
    pub fn new(cfg: PreprocessConfig) -> Self {
        Self {
            cfg,
            emoji: Regex::new(r":\S+:").expect("emoji regex"),
            // `Name — Today at 3:15 PM` copied out of the Discord client.
            timestamp: Regex::new(
                r"([^—]+) — (?:Today at|Yesterday at|\d{1,2}/\d{1,2}/\d{4}) \d{1,2}:\d{2} [AP]M",
            )
            .expect("timestamp regex"),
            url: Regex::new(r"https?://\S+").expect("url regex"),
            blank_lines: Regex::new(r"\n{3,}").expect("blank line regex"),
        }
    }

    pub fn config(&self) -> PreprocessConfig {
        self.cfg
    }

    pub fn apply(&self, content: &str) -> String {
        if content.chars().count() < MIN_PREPROCESS_CHARS || !self.cfg.enabled {
            return content.to_string();
        }

        let mut out = content.to_string();
        if self.cfg.remove_emojis {
            out = self.emoji.replace_all(&out, "").into_owned();
        }
        if self.cfg.remove_timestamps {
            out = self.timestamp.replace_all(&out, "${1}:").into_owned();
        }
        if self.cfg.remove_urls {
            out = self.url.replace_all(&out, "").into_owned();
        }

        out = self.blank_lines.replace_all(&out, "\n\n").into_owned();
        out.trim().to_string()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(PreprocessConfig::default())
    }
}

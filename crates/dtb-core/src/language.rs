use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Languages supported end-to-end (ISO 639-3 style tags).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Eng,
    Kor,
    Jpn,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Eng, Language::Kor, Language::Jpn];

    pub fn code(self) -> &'static str {
        match self {
            Language::Eng => "eng",
            Language::Kor => "kor",
            Language::Jpn => "jpn",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::Eng => "English",
            Language::Kor => "Korean",
            Language::Jpn => "Japanese",
        }
    }

    /// Flag reaction attached to a translated message.
    pub fn flag(self) -> &'static str {
        match self {
            Language::Eng => "🇺🇸",
            Language::Kor => "🇰🇷",
            Language::Jpn => "🇯🇵",
        }
    }

    /// Map a free-form classifier answer ("Korean", "japanese.", ...) onto a tag.
    /// Anything unrecognised is English.
    pub fn from_classifier_answer(answer: &str) -> Self {
        let lower = answer.trim().to_lowercase();
        if lower.contains("korean") {
            Language::Kor
        } else if lower.contains("japanese") {
            Language::Jpn
        } else {
            Language::Eng
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Per-server language pair policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Korean,
    Japanese,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Korean, Mode::Japanese];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Korean => "korean",
            Mode::Japanese => "japanese",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Mode::Korean => "Korean",
            Mode::Japanese => "Japanese",
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Mode::Korean => "Translates Korean ↔ English and Japanese → Korean",
            Mode::Japanese => "Translates Japanese ↔ English and Korean → Japanese",
        }
    }

    pub fn home_language(self) -> Language {
        match self {
            Mode::Korean => Language::Kor,
            Mode::Japanese => Language::Jpn,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "korean" => Ok(Mode::Korean),
            "japanese" => Ok(Mode::Japanese),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Whether a message in `detected` should be translated at all.
///
/// Every supported language is translated; the gate stays explicit so new
/// languages can opt out without touching the pipeline.
pub fn needs_translation(detected: Language) -> bool {
    matches!(detected, Language::Eng | Language::Kor | Language::Jpn)
}

/// Resolve the target language for a detected source under a mode.
///
/// The mode's home language goes to English; everything else goes to the home
/// language.
pub fn target_language(source: Language, mode: Mode) -> Language {
    match (mode, source) {
        (Mode::Korean, Language::Kor) => Language::Eng,
        (Mode::Korean, Language::Eng) => Language::Kor,
        (Mode::Korean, Language::Jpn) => Language::Kor,
        (Mode::Japanese, Language::Jpn) => Language::Eng,
        (Mode::Japanese, Language::Eng) => Language::Jpn,
        (Mode::Japanese, Language::Kor) => Language::Jpn,
    }
}

//! Prompt text shared by every provider.

use dtb_core::{
    backend::TokenUsage,
    language::{target_language, Language, Mode},
};

/// The user turn sent to every provider.
pub fn user_prompt(text: &str, source: Language, mode: Mode) -> String {
    let target = target_language(source, mode);
    format!(
        "Translate the following {} text to {}: \"{text}\"",
        source.display_name(),
        target.display_name()
    )
}

/// Rough token count for providers that report none: one token per four characters.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Estimate usage from the prompt parts and the reply.
pub fn estimate_usage(prompt_parts: &[&str], completion: &str) -> TokenUsage {
    let prompt = prompt_parts.iter().map(|p| estimate_tokens(p)).sum();
    TokenUsage::new(prompt, estimate_tokens(completion))
}

/// Providers sometimes wrap the answer in the quotes from the prompt.
pub fn clean_translation(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|inner| !inner.contains('"'));
    unquoted.unwrap_or(trimmed).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_both_languages() {
        assert_eq!(
            user_prompt("안녕", Language::Kor, Mode::Korean),
            "Translate the following Korean text to English: \"안녕\""
        );
        assert_eq!(
            user_prompt("hi", Language::Eng, Mode::Japanese),
            "Translate the following English text to Japanese: \"hi\""
        );
        assert_eq!(
            user_prompt("こんにちは", Language::Jpn, Mode::Korean),
            "Translate the following Japanese text to Korean: \"こんにちは\""
        );
    }

    #[test]
    fn estimate_rounds_up_per_character() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("안녕하세요"), 2);

        let usage = estimate_usage(&["abcd", "abcdefgh"], "abc");
        assert_eq!(usage, TokenUsage::new(3, 1));
    }

    #[test]
    fn clean_strips_wrapping_quotes_only() {
        assert_eq!(clean_translation("  \"Hello\"\n"), "Hello");
        assert_eq!(clean_translation("Hello"), "Hello");
        assert_eq!(
            clean_translation("\"a\" and \"b\""),
            "\"a\" and \"b\""
        );
    }
}

//! Text shaping for outbound Discord messages.

use std::time::Duration;

use crate::pipeline::{ServedBy, TranslationResult};

/// Translation body as shown to users. Token usage is appended unless the
/// result came from the translation memory.
pub fn format_translation(result: &TranslationResult) -> String {
    match result.served_by {
        ServedBy::Cache => result.translated.clone(),
        ServedBy::Backend(_) => format!("{}\n📊 Tokens: {}", result.translated, result.tokens.total),
    }
}

/// `1h 2m 3s`, omitting zero hours/minutes; seconds always shown.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut parts = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{seconds}s"));
    parts.join(" ")
}

/// Split `content` into ordered chunks of at most `max_chars` characters,
/// preferring paragraph, then line, then sentence boundaries. Concatenating
/// the chunks yields `content` unchanged.
pub fn split_message_content(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    if char_count(content) <= max_chars {
        return vec![content.to_string()];
    }
    let mut out = Vec::new();
    chunk_segment(content, max_chars, SplitLevel::Paragraph, &mut out);
    out
}

/// Prefix `[Part i/N] ` when there is more than one chunk.
pub fn label_parts(chunks: Vec<String>) -> Vec<String> {
    let total = chunks.len();
    if total <= 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Part {}/{}] {}", i + 1, total, chunk))
        .collect()
}

/// Split then label; every labelled part stays within `max_chars`.
pub fn split_for_delivery(content: &str, max_chars: usize) -> Vec<String> {
    if char_count(content) <= max_chars {
        return vec![content.to_string()];
    }
    let mut reserve = label_len(9);
    loop {
        let chunks = split_message_content(content, max_chars.saturating_sub(reserve));
        let needed = label_len(chunks.len());
        if needed <= reserve {
            return label_parts(chunks);
        }
        reserve = needed;
    }
}

fn label_len(total: usize) -> usize {
    format!("[Part {total}/{total}] ").len()
}

fn char_count(text: &str) -> usize {
    text.chars().count()
}

fn split_keep_delimiter(text: &str, delimiter: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;

    while let Some(relative_pos) = text[start..].find(delimiter) {
        let end = start + relative_pos + delimiter.len();
        parts.push(text[start..end].to_string());
        start = end;
    }

    if start < text.len() {
        parts.push(text[start..].to_string());
    }

    parts
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?' | '。' | '！' | '？') {
            continue;
        }
        if let Some((next_index, next_char)) = chars.peek().copied() {
            if next_char.is_whitespace() {
                let end = next_index + next_char.len_utf8();
                parts.push(text[start..end].to_string());
                start = end;
            }
        }
    }

    if start < text.len() {
        parts.push(text[start..].to_string());
    }

    parts
}

fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for ch in text.chars() {
        if current_len == max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push(ch);
        current_len += 1;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[derive(Clone, Copy)]
enum SplitLevel {
    Paragraph,
    Line,
    Sentence,
    Hard,
}

impl SplitLevel {
    fn next(self) -> Self {
        match self {
            Self::Paragraph => Self::Line,
            Self::Line => Self::Sentence,
            Self::Sentence | Self::Hard => Self::Hard,
        }
    }

    fn split(self, text: &str) -> Vec<String> {
        match self {
            Self::Paragraph => split_keep_delimiter(text, "\n\n"),
            Self::Line => split_keep_delimiter(text, "\n"),
            Self::Sentence => split_sentences(text),
            Self::Hard => vec![text.to_string()],
        }
    }
}

fn chunk_segment(text: &str, max_chars: usize, level: SplitLevel, out: &mut Vec<String>) {
    if text.is_empty() {
        return;
    }

    if char_count(text) <= max_chars {
        out.push(text.to_string());
        return;
    }

    if matches!(level, SplitLevel::Hard) {
        out.extend(hard_split(text, max_chars));
        return;
    }

    let parts = level.split(text);
    if parts.len() <= 1 {
        chunk_segment(text, max_chars, level.next(), out);
        return;
    }

    let mut current = String::new();

    for part in parts {
        if char_count(&part) > max_chars {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            chunk_segment(&part, max_chars, level.next(), out);
            continue;
        }

        if current.is_empty() {
            current = part;
            continue;
        }

        if char_count(&current) + char_count(&part) <= max_chars {
            current.push_str(&part);
        } else {
            out.push(std::mem::take(&mut current));
            current = part;
        }
    }

    if !current.is_empty() {
        out.push(current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{BackendKind, TokenUsage},
        language::Language,
    };

    fn result(served_by: ServedBy) -> TranslationResult {
        TranslationResult {
            original: "안녕".to_string(),
            translated: "Hello".to_string(),
            source: Language::Kor,
            target: Language::Eng,
            served_by,
            tokens: TokenUsage::new(8, 4),
            latency: None,
        }
    }

    #[test]
    fn token_footer_only_for_backend_results() {
        assert_eq!(format_translation(&result(ServedBy::Cache)), "Hello");
        assert_eq!(
            format_translation(&result(ServedBy::Backend(BackendKind::Claude))),
            "Hello\n📊 Tokens: 12"
        );
    }

    #[test]
    fn durations_skip_zero_units() {
        assert_eq!(format_duration(Duration::from_secs(0)), "0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(3600 + 7)), "1h 7s");
        assert_eq!(format_duration(Duration::from_secs(2 * 3600 + 3 * 60)), "2h 3m 0s");
    }

    #[test]
    fn short_content_is_a_single_unlabeled_part() {
        assert_eq!(split_for_delivery("hello", 1950), vec!["hello".to_string()]);
    }

    #[test]
    fn long_content_reassembles_exactly() {
        let paragraph = "This is a sentence that goes on. Another one follows here! ".repeat(20);
        let content = format!("{paragraph}\n\n{paragraph}\nshort tail\n\n{}", "x".repeat(300));

        let chunks = split_message_content(&content, 200);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 200));
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let content = "가".repeat(4000);
        let chunks = split_message_content(&content, 1950);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1950);
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn parts_are_labelled_in_order() {
        let content = format!("{}\n{}", "a".repeat(15), "b".repeat(15));
        let parts = split_for_delivery(&content, 30);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("[Part 1/2] "));
        assert!(parts[1].starts_with("[Part 2/2] "));

        let stripped: String = parts
            .iter()
            .map(|p| p.split_once("] ").map(|(_, rest)| rest).unwrap_or(p))
            .collect();
        assert_eq!(stripped, content);
    }

    #[test]
    fn labelled_parts_fit_the_platform_cap() {
        let content = "word ".repeat(1000);
        let parts = split_for_delivery(&content, 2000);
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| p.chars().count() <= 2000));

        let many = "x".repeat(2000);
        let parts = split_for_delivery(&many, 100);
        assert!(parts.len() >= 10);
        assert!(parts.iter().all(|p| p.chars().count() <= 100));
        assert!(parts.last().unwrap().starts_with(&format!("[Part {0}/{0}] ", parts.len())));
    }
}

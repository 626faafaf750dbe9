//! Per-message translation: preprocess, detect, cache, backend, reactions.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;

use crate::{
    backend::{BackendKind, TokenUsage, TranslationBackend},
    config::ReactionEmojis,
    domain::{IncomingMessage, MessageRef},
    errors::Error,
    language::{needs_translation, target_language, Language},
    memory::TranslationMemory,
    messaging::port::MessagingPort,
    metrics::PipelineMetrics,
    preprocess::Preprocessor,
    server_config::ServerConfig,
    utils::spawn_detached,
};

/// Texts shorter than this (after trimming) are assumed English, unless they
/// contain Korean or Japanese script.
const MIN_DETECT_CHARS: usize = 3;

/// Who produced a translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServedBy {
    Cache,
    Backend(BackendKind),
}

impl ServedBy {
    /// Shown in the webhook identity, e.g. `Translator (claude)`.
    pub fn label(self) -> &'static str {
        match self {
            ServedBy::Cache => "cache",
            ServedBy::Backend(kind) => kind.as_str(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationResult {
    /// Preprocessed source text.
    pub original: String,
    pub translated: String,
    pub source: Language,
    pub target: Language,
    pub served_by: ServedBy,
    pub tokens: TokenUsage,
    pub latency: Option<Duration>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    Backend,
    Unknown,
}

impl FailureKind {
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::Backend(e) if e.is_rate_limit() => FailureKind::RateLimit,
            Error::Backend(_) => FailureKind::Backend,
            _ => FailureKind::Unknown,
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            FailureKind::RateLimit => "❌ Rate limit exceeded. Please try again in a few moments.",
            FailureKind::Backend => "❌ Translation API error. Please try a different model.",
            FailureKind::Unknown => "❌ Failed to translate message. Please try again later.",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl From<&Error> for TranslationFailure {
    fn from(err: &Error) -> Self {
        Self {
            kind: FailureKind::classify(err),
            detail: err.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing left after preprocessing.
    Empty,
    /// Looks like a bot command.
    Command,
    /// Detected language is not translated.
    NotNeeded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Translated(TranslationResult),
    Skipped(SkipReason),
    Failed(TranslationFailure),
}

/// Collaborators shared by every pipeline run.
pub struct TranslationPipeline {
    backend: Arc<dyn TranslationBackend>,
    memory: TranslationMemory,
    messenger: Arc<dyn MessagingPort>,
    preprocessor: Preprocessor,
    emojis: ReactionEmojis,
    command_prefix: String,
    metrics: Arc<PipelineMetrics>,
}

impl TranslationPipeline {
    pub fn new(
        backend: Arc<dyn TranslationBackend>,
        memory: TranslationMemory,
        messenger: Arc<dyn MessagingPort>,
        preprocessor: Preprocessor,
        emojis: ReactionEmojis,
        command_prefix: impl Into<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            backend,
            memory,
            messenger,
            preprocessor,
            emojis,
            command_prefix: command_prefix.into(),
            metrics,
        }
    }

    pub fn memory(&self) -> &TranslationMemory {
        &self.memory
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub async fn translate(&self, msg: &IncomingMessage, cfg: &ServerConfig) -> PipelineOutcome {
        let started = Instant::now();

        let content = self.preprocessor.apply(&msg.content);
        if content.trim().is_empty() {
            return PipelineOutcome::Skipped(SkipReason::Empty);
        }
        if content.starts_with(&self.command_prefix) {
            return PipelineOutcome::Skipped(SkipReason::Command);
        }

        let source = self.detect(&content).await;
        if !needs_translation(source) {
            return PipelineOutcome::Skipped(SkipReason::NotNeeded);
        }
        let target = target_language(source, cfg.mode);

        let lookup_started = Instant::now();
        let cached = self.memory.get(&content, cfg.mode);
        self.metrics.record_attempt(lookup_started.elapsed());

        if let Some(entry) = cached {
            self.metrics.record_cache_hit();
            self.metrics.finish_attempt(started.elapsed());
            self.react_detached(msg.message, source.flag(), "flag reaction on cached translation");
            tracing::debug!("Cache hit for message {} ({source} -> {target})", msg.message.message_id);
            return PipelineOutcome::Translated(TranslationResult {
                original: content,
                translated: entry.translation,
                source,
                target,
                served_by: ServedBy::Cache,
                tokens: entry.tokens,
                latency: None,
            });
        }

        let indicator = {
            let messenger = Arc::clone(&self.messenger);
            let emoji = self.emojis.translating.clone();
            let target_msg = msg.message;
            spawn_detached("translating reaction", async move {
                messenger.add_reaction(target_msg, &emoji).await
            })
        };

        let backend_started = Instant::now();
        let outcome = self
            .backend
            .translate(cfg.model, &content, source, cfg.mode)
            .await;
        self.metrics.record_backend_call(backend_started.elapsed());

        match outcome {
            Ok(out) => {
                self.memory
                    .put(&content, cfg.mode, &out.translation, out.tokens);

                // The indicator must exist before it can be removed.
                let _ = indicator.await;
                if let Err(e) = self
                    .messenger
                    .remove_own_reaction(msg.message, &self.emojis.translating)
                    .await
                {
                    tracing::warn!("Could not remove translating reaction: {e}");
                }
                self.react_detached(msg.message, source.flag(), "flag reaction");

                let latency = started.elapsed();
                self.metrics.finish_attempt(latency);
                tracing::info!(
                    "Translated message {} with {} ({source} -> {target}) in {}ms",
                    msg.message.message_id,
                    cfg.model,
                    latency.as_millis()
                );

                PipelineOutcome::Translated(TranslationResult {
                    original: content,
                    translated: out.translation,
                    source,
                    target,
                    served_by: ServedBy::Backend(cfg.model),
                    tokens: out.tokens,
                    latency: Some(latency),
                })
            }
            Err(e) => {
                let err = Error::from(e);
                let failure = TranslationFailure::from(&err);
                tracing::error!(
                    "Translation failed for message {} ({:?}): {err}",
                    msg.message.message_id,
                    failure.kind
                );
                self.mark_failed(msg.message, indicator);
                self.metrics.finish_attempt(started.elapsed());
                PipelineOutcome::Failed(failure)
            }
        }
    }

    async fn detect(&self, content: &str) -> Language {
        if is_trivial_for_detection(content) {
            return Language::Eng;
        }
        match self.backend.detect_language(content).await {
            Ok(lang) => lang,
            Err(e) => {
                tracing::warn!("Language detection failed, assuming English: {e}");
                Language::Eng
            }
        }
    }

    fn react_detached(&self, msg: MessageRef, emoji: &'static str, label: &'static str) {
        let messenger = Arc::clone(&self.messenger);
        spawn_detached(label, async move { messenger.add_reaction(msg, emoji).await });
    }

    fn mark_failed(&self, msg: MessageRef, indicator: tokio::task::JoinHandle<()>) {
        let messenger = Arc::clone(&self.messenger);
        let error_emoji = self.emojis.error.clone();
        spawn_detached("error reactions", async move {
            let _ = indicator.await;
            if let Err(e) = messenger.clear_reactions(msg).await {
                tracing::warn!("Could not clear reactions: {e}");
            }
            messenger.add_reaction(msg, &error_emoji).await
        });
    }
}

/// Short Latin text ("ok", "lol", "??") is not worth a classifier call; a
/// two-syllable Korean or Japanese word is.
fn is_trivial_for_detection(content: &str) -> bool {
    let trimmed = content.trim();
    trimmed.chars().count() < MIN_DETECT_CHARS && !trimmed.chars().any(is_cjk_script)
}

fn is_cjk_script(c: char) -> bool {
    matches!(c,
        '\u{1100}'..='\u{11FF}'   // Hangul Jamo
        | '\u{3040}'..='\u{30FF}' // Hiragana, Katakana
        | '\u{3130}'..='\u{318F}' // Hangul Compatibility Jamo
        | '\u{4E00}'..='\u{9FFF}' // CJK Unified Ideographs
        | '\u{AC00}'..='\u{D7A3}' // Hangul Syllables
    )
}

use async_trait::async_trait;

use crate::language::{Language, Mode};

use super::types::{BackendError, BackendKind, BackendTranslation};

/// Backend interface used by the translation pipeline.
///
/// Both calls are fallible and latency-bearing. `detect_language` is
/// best-effort: the pipeline absorbs its failures.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn detect_language(&self, text: &str) -> Result<Language, BackendError>;

    async fn translate(
        &self,
        kind: BackendKind,
        text: &str,
        source: Language,
        mode: Mode,
    ) -> Result<BackendTranslation, BackendError>;
}

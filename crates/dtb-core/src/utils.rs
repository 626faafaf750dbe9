use std::future::Future;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::Result;

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs and persisted stats).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Text Helpers ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

// ============== Background Work ==============

/// Run a best-effort side effect (reaction, notification) in the background.
/// Failures are logged with `label` and otherwise ignored.
pub fn spawn_detached<F>(label: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::warn!("{label} failed: {e}");
        }
    })
}

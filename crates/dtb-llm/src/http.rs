use std::time::Duration;

use dtb_core::{backend::BackendError, utils::truncate_text};

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub(crate) fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("reqwest client build")
}

pub(crate) fn transport(provider: &'static str, e: reqwest::Error) -> BackendError {
    BackendError::Transport {
        provider,
        message: e.to_string(),
    }
}

pub(crate) fn invalid(provider: &'static str, message: impl Into<String>) -> BackendError {
    BackendError::InvalidResponse {
        provider,
        message: message.into(),
    }
}

/// Map a non-success HTTP status to the structured error the pipeline classifies.
pub(crate) fn status_error(provider: &'static str, status: u16, body: &str) -> BackendError {
    let message = truncate_text(body.trim(), 200);
    if status == 429 {
        BackendError::RateLimited { provider, message }
    } else {
        BackendError::Api {
            provider,
            status,
            message,
        }
    }
}

/// Send a JSON request and decode a successful JSON body.
pub(crate) async fn send_json<T: serde::de::DeserializeOwned>(
    provider: &'static str,
    req: reqwest::RequestBuilder,
) -> Result<T, BackendError> {
    let resp = req.send().await.map_err(|e| transport(provider, e))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(provider, status.as_u16(), &body));
    }

    let body = resp.text().await.map_err(|e| transport(provider, e))?;
    serde_json::from_str(&body).map_err(|e| invalid(provider, format!("json error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_many_requests_is_a_rate_limit() {
        let err = status_error("openai", 429, "slow down");
        assert!(err.is_rate_limit());
        assert!(err.to_string().contains("slow down"));
    }

    #[test]
    fn other_statuses_keep_their_code() {
        match status_error("gemini", 503, " overloaded ") {
            BackendError::Api {
                provider,
                status,
                message,
            } => {
                assert_eq!(provider, "gemini");
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

pub mod cicero;
pub mod italo;
pub mod motis;
pub mod trentino;
pub mod viaggiatreno;

use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

// Retry configuration shared by all upstream clients.
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 400;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("retryable upstream error: {0}")]
    Retryable(String),
    #[error("upstream has no record for the requested entity")]
    NotFound,
    #[error("failed to parse upstream response: {0}")]
    Parse(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Network(_) | ProviderError::Retryable(_))
    }
}

/// Thin wrapper around a [`reqwest::Client`] with the timeout, retry and
/// auth behavior every upstream feed gets.
///
/// Exhausted retries and upstream 404s both surface as errors here; the
/// adapters collapse them into `None` so callers only ever distinguish
/// "data" from "no data".
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: reqwest::Client,
    auth_header: Option<String>,
    extra_headers: Vec<(&'static str, String)>,
}

impl ProviderClient {
    pub fn new() -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            auth_header: None,
            extra_headers: Vec::new(),
        })
    }

    /// Client sending `Authorization: Basic …` on every request.
    pub fn with_basic_auth(username: &str, password: &str) -> Result<Self, ProviderError> {
        let mut this = Self::new()?;
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{username}:{password}"));
        this.auth_header = Some(format!("Basic {token}"));
        Ok(this)
    }

    /// Attach a header to every request this client makes.
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.extra_headers.push((name, value.into()));
        self
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        let text = self.execute_with_retry(url, None).await?;
        parse_json(&text)
    }

    pub async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &impl Serialize,
    ) -> Result<T, ProviderError> {
        let payload = serde_json::to_string(body)
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        let text = self.execute_with_retry(url, Some(payload)).await?;
        parse_json(&text)
    }

    pub async fn get_text(&self, url: &str) -> Result<String, ProviderError> {
        self.execute_with_retry(url, None).await
    }

    async fn execute_with_retry(
        &self,
        url: &str,
        body: Option<String>,
    ) -> Result<String, ProviderError> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = INITIAL_RETRY_DELAY_MS * 2_u64.pow(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay, url, "retrying upstream request");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.execute_request(url, body.as_deref()).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, url, error = %e, "transient upstream error");
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::Network("retries exhausted".into())))
    }

    async fn execute_request(
        &self,
        url: &str,
        body: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut request = match body {
            Some(payload) => self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .body(payload.to_string()),
            None => self.client.get(url),
        };
        if let Some(auth) = &self.auth_header {
            request = request.header("Authorization", auth);
        }
        for (name, value) in &self.extra_headers {
            request = request.header(*name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if status.as_u16() == 404 {
            return Err(ProviderError::NotFound);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(ProviderError::Retryable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err(ProviderError::Network(format!(
                "HTTP {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        Ok(text)
    }
}

fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    // Some feeds answer 200 with an empty body when they have nothing.
    if text.trim().is_empty() {
        return Err(ProviderError::NotFound);
    }
    serde_json::from_str(text).map_err(|e| {
        tracing::error!(
            error = %e,
            body_preview = %text.chars().take(300).collect::<String>(),
            "failed to parse upstream response"
        );
        ProviderError::Parse(e.to_string())
    })
}

//! Remote model metadata from the HuggingFace Hub API
//!
//! Every fetch is best effort: timeouts, network errors, 4xx/5xx responses and
//! rate limiting all resolve to `None`. An unreachable hub never blocks local
//! configuration resolution.

pub mod metadata;

pub use metadata::{HubModelInfo, ModelSummary, estimate_parameters, parse_model_config};

use crate::config::HubSettings;
use crate::error::{ResolverError, ResolverResult};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Client for the hub's model metadata and raw file endpoints
#[derive(Debug, Clone)]
pub struct HubClient {
    client: Client,
    endpoint: String,
    timeout: Duration,
    offline: bool,
    token: Option<String>,
}

impl HubClient {
    pub fn new(settings: &HubSettings) -> ResolverResult<Self> {
        if settings.timeout_ms == 0 {
            return Err(ResolverError::InvalidHubConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        let endpoint = settings.endpoint.trim_end_matches('/').to_string();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ResolverError::InvalidHubConfig(format!(
                "endpoint must be an http(s) URL (got '{}')",
                settings.endpoint
            )));
        }

        let client = Client::builder()
            .user_agent(concat!("container-config/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: Duration::from_millis(settings.timeout_ms),
            offline: settings.offline,
            token: settings.token.clone(),
        })
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// Model card metadata (`/api/models/{id}`)
    pub async fn fetch_model_metadata(&self, model_id: &str) -> Option<Value> {
        let url = format!("{}/api/models/{}", self.endpoint, model_id);
        self.fetch_json(model_id, &url, "model metadata").await
    }

    /// Raw `tokenizer_config.json` from the main revision
    pub async fn fetch_tokenizer_config(&self, model_id: &str) -> Option<Value> {
        let url = self.file_url(model_id, "tokenizer_config.json");
        self.fetch_json(model_id, &url, "tokenizer config").await
    }

    /// Raw `config.json` from the main revision
    pub async fn fetch_model_config(&self, model_id: &str) -> Option<Value> {
        let url = self.file_url(model_id, "config.json");
        self.fetch_json(model_id, &url, "model config").await
    }

    /// Issue all three fetches concurrently
    pub async fn fetch_model_info(&self, model_id: &str) -> HubModelInfo {
        let (metadata, tokenizer_config, model_config) = tokio::join!(
            self.fetch_model_metadata(model_id),
            self.fetch_tokenizer_config(model_id),
            self.fetch_model_config(model_id),
        );

        HubModelInfo {
            model_id: model_id.to_string(),
            metadata,
            tokenizer_config,
            model_config,
        }
    }

    fn file_url(&self, model_id: &str, file: &str) -> String {
        format!("{}/{}/resolve/main/{}", self.endpoint, model_id, file)
    }

    async fn fetch_json(&self, model_id: &str, url: &str, what: &str) -> Option<Value> {
        if self.offline {
            tracing::debug!(model_id = %model_id, what = %what, "Offline mode, skipping hub fetch");
            return None;
        }
        if !is_valid_model_id(model_id) {
            tracing::debug!(model_id = %model_id, "Not a hub model id, skipping hub fetch");
            return None;
        }

        match self.try_fetch(url).await {
            Ok(value) => {
                tracing::debug!(model_id = %model_id, what = %what, "Fetched from hub");
                Some(value)
            }
            Err(FetchError::Status(StatusCode::NOT_FOUND)) => {
                tracing::debug!(model_id = %model_id, what = %what, "Not found on hub");
                None
            }
            Err(FetchError::Status(StatusCode::TOO_MANY_REQUESTS)) => {
                tracing::warn!(model_id = %model_id, what = %what, "Hub rate limit reached");
                None
            }
            Err(e) => {
                tracing::warn!(model_id = %model_id, what = %what, error = %e, "Hub fetch failed");
                None
            }
        }
    }

    /// Dropping the request future on timeout aborts the request
    async fn try_fetch(&self, url: &str) -> Result<Value, FetchError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let fetch = async {
            let response = request.send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }
            Ok::<_, FetchError>(response.json::<Value>().await?)
        };

        tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))?
    }
}

/// Hub ids are `name` or `org/name` without whitespace or traversal
fn is_valid_model_id(model_id: &str) -> bool {
    !model_id.is_empty()
        && !model_id.starts_with('/')
        && !model_id.ends_with('/')
        && !model_id.contains("..")
        && !model_id.chars().any(char::is_whitespace)
        && model_id.matches('/').count() <= 1
}

//! reqwest-backed [`Dispatch`] for the HTTP collaborators.

use std::time::Duration;

use reqwest::Client;

use examguard_core::config::join_url;
use examguard_core::{ApiRequest, ApiResponse, Body, ClientConfig, Dispatch, Method, ProctorError, Result};

/// Per-request timeout. Login and submission have no cancellation, so this
/// is the only bound on a stuck collaborator.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends [`ApiRequest`]s to a base address with reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestDispatcher {
    client: Client,
    base_url: String,
}

impl ReqwestDispatcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("examguard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProctorError::Transport(e.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(config.api_base_url.clone())
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Dispatch for ReqwestDispatcher {
    async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = join_url(&self.base_url, &request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Form(pairs) => builder.form(pairs),
        };

        log::debug!("{} {}", request.method.as_str(), request.path);
        let response = builder
            .send()
            .await
            .map_err(|e| ProctorError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| ProctorError::Transport(e.to_string()))?;
        log::debug!("{} {} -> {status}", request.method.as_str(), request.path);
        Ok(ApiResponse::new(status, body))
    }
}

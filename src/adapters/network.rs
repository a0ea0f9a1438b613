//! HTTP network adapter.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{AdapterError, NetworkAdapter};
use crate::context::Context;
use crate::decision::Decision;

/// Issues a GET and returns the body as JSON.
///
/// Non-JSON bodies come back as a JSON string. Any non-2xx status is an
/// error.
pub struct HttpNetworkAdapter {
    inner: reqwest::Client,
}

impl HttpNetworkAdapter {
    /// Build a client with the given user agent and connect timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(user_agent: &str, connect_timeout: Duration) -> Result<Self, AdapterError> {
        let inner = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { inner })
    }

    /// Wrap an existing client.
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl NetworkAdapter for HttpNetworkAdapter {
    async fn call(
        &self,
        url: &str,
        context: &Context,
        _decision: &Decision,
    ) -> Result<serde_json::Value, AdapterError> {
        let mut request = self.inner.get(url);
        if let Some(trace_id) = &context.trace_id {
            request = request.header("x-trace-id", trace_id);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::Status {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.text().await?;
        debug!(url, status = status.as_u16(), bytes = body.len(), "network call completed");
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}

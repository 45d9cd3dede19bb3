//! Messaging gateway client.

use super::MessageTransport;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Request body accepted by the gateway.
#[derive(Debug, Serialize)]
struct OutboundMessage<'a> {
    to: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    attachment_url: Option<&'a str>,
}

/// Posts each message as JSON to a single gateway endpoint.
///
/// A non-2xx answer is a delivery failure. Nothing is retried.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpTransport {
    /// Builds a client with `timeout` as its per-request bound.
    pub fn new(endpoint: String, api_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            api_token,
        })
    }
}

#[async_trait]
impl MessageTransport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(
        &self,
        phone_number: &str,
        message: &str,
        attachment_url: Option<&str>,
    ) -> Result<()> {
        let body = OutboundMessage {
            to: phone_number,
            message,
            attachment_url,
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| Error::Transport {
            reason: format!("gateway request failed: {e}"),
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), detail = %detail, "Gateway rejected message");
            return Err(Error::Transport {
                reason: format!("gateway returned HTTP {}", status.as_u16()),
            });
        }

        debug!(status = status.as_u16(), "Gateway accepted message");
        Ok(())
    }
}

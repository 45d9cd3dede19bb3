//! Outbound message delivery.
//!
//! The engine only knows the [`MessageTransport`] trait. Concrete transports:
//! - [`HttpTransport`] posts to a messaging gateway
//! - [`LogTransport`] only logs, for development setups without a gateway

mod http;
mod log;

pub use self::http::HttpTransport;
pub use self::log::LogTransport;

use crate::{
    config::{TransportConfig, TransportKind},
    errors::{Error, Result},
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Sends one rendered message to one phone number.
///
/// Implementations must not retry; a failed send is reported to the caller, which records it.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Delivers `message` (and optional attachment) to `phone_number`.
    async fn send(
        &self,
        phone_number: &str,
        message: &str,
        attachment_url: Option<&str>,
    ) -> Result<()>;
}

/// Runs one send bounded by `timeout`; an elapsed timer becomes [`Error::Transport`].
pub async fn send_with_timeout(
    transport: &dyn MessageTransport,
    timeout: Duration,
    phone_number: &str,
    message: &str,
    attachment_url: Option<&str>,
) -> Result<()> {
    match tokio::time::timeout(timeout, transport.send(phone_number, message, attachment_url))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(Error::Transport {
            reason: format!("transport timed out after {timeout:?}"),
        }),
    }
}

/// Builds the transport selected in the application config.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn MessageTransport>> {
    match config.kind {
        TransportKind::Log => Ok(Arc::new(LogTransport)),
        TransportKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| Error::Config {
                message: "transport.endpoint is required for the http transport".to_string(),
            })?;
            let transport =
                HttpTransport::new(endpoint, config.api_token.clone(), config.timeout())?;
            Ok(Arc::new(transport))
        }
    }
}

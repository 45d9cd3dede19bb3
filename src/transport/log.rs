use super::MessageTransport;
use crate::errors::Result;
use async_trait::async_trait;
use tracing::info;

/// Logs every message instead of delivering it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransport;

#[async_trait]
impl MessageTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(
        &self,
        phone_number: &str,
        message: &str,
        attachment_url: Option<&str>,
    ) -> Result<()> {
        info!(
            to = phone_number,
            attachment = attachment_url.unwrap_or("-"),
            message,
            "Birthday message (log transport)"
        );
        Ok(())
    }
}

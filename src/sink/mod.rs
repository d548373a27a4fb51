//! Notification sinks delivering live items to subscriber endpoints.

use async_trait::async_trait;

use crate::catalog::LiveItem;

pub mod discord_webhook_sink;
pub mod message_builder;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Endpoint rejected delivery with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<wreq::Error> for DeliveryError {
    fn from(e: wreq::Error) -> Self {
        DeliveryError::RequestFailed(Box::new(e))
    }
}

/// Delivers notifications to a subscriber endpoint.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Sends one notification about `item` to `endpoint`.
    async fn deliver(&self, endpoint: &str, item: &LiveItem) -> Result<(), DeliveryError>;

    /// Best-effort reachability probe. Never fails, returns `false` instead.
    async fn validate(&self, endpoint: &str) -> bool;
}

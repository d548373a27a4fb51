//! Sink that posts live notifications to Discord webhooks.

use async_trait::async_trait;
use log::debug;
use log::info;
use log::warn;
use wreq::header::CONTENT_TYPE;

use crate::catalog::LiveItem;
use crate::sink::DeliveryError;
use crate::sink::NotificationSink;
use crate::sink::message_builder::LiveMessageBuilder;

/// Discord webhook delivery over plain HTTP.
pub struct DiscordWebhookSink {
    client: wreq::Client,
}

impl DiscordWebhookSink {
    pub fn new() -> Result<Self, DeliveryError> {
        debug!("Initializing DiscordWebhookSink.");
        Ok(Self {
            client: wreq::Client::builder().build()?,
        })
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    async fn deliver(&self, endpoint: &str, item: &LiveItem) -> Result<(), DeliveryError> {
        let payload = LiveMessageBuilder::new(item).build();

        debug!("Posting live item `{}` to webhook.", item.id);
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(
            "Delivered live item `{}` ({}) to webhook.",
            item.id, item.broadcaster_login
        );
        Ok(())
    }

    async fn validate(&self, endpoint: &str) -> bool {
        match self.client.get(endpoint).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Endpoint validation request failed: {e}");
                false
            }
        }
    }
}

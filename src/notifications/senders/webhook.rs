use async_trait::async_trait;
use reqwest::{Client, header};
use sha2::{Digest, Sha256};
use tracing::info;

use super::{NotificationSender, SenderError, ensure_success};
use crate::notifications::models::{ChannelConfig, Notification};

pub const SIGNATURE_HEADER: &str = "X-Apiwatch-Signature";

/// `sha256=<hex(sha256(secret || body))>`
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(body);
    format!("sha256={}", hex::encode(hasher.finalize()))
}

/// A sender for pushing notifications via a user-supplied webhook.
pub struct WebhookSender {
    client: Client,
    secret: Option<String>,
}

impl WebhookSender {
    pub fn new(client: Client, secret: Option<String>) -> Self {
        Self { client, secret }
    }
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        notification: &Notification,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Webhook { url } = config else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Webhook config, but found a different type.".to_string(),
            ));
        };

        let Some(secret) = self.secret.as_deref() else {
            return Err(SenderError::InvalidConfiguration(
                "webhook_secret is not configured; refusing to send an unsigned webhook."
                    .to_string(),
            ));
        };

        let body = serde_json::to_vec(&notification.webhook_payload())?;
        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, sign_payload(secret, &body))
            .body(body)
            .send()
            .await?;
        ensure_success(response, "Webhook").await?;

        info!(url = %url, monitor_id = notification.monitor.id, "Webhook sent.");
        Ok(())
    }
}

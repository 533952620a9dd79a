use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::{NotificationSender, SenderError, ensure_success};
use crate::notifications::models::{ChannelConfig, Notification};

/// Short text alerts. Without a gateway the message is only logged.
pub struct SmsSender {
    client: Client,
    gateway_url: Option<String>,
}

impl SmsSender {
    pub fn new(client: Client, gateway_url: Option<String>) -> Self {
        Self {
            client,
            gateway_url,
        }
    }
}

#[async_trait]
impl NotificationSender for SmsSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        notification: &Notification,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Sms { phone_number } = config else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Sms config, but found a different type.".to_string(),
            ));
        };
        let text = notification.sms_text();

        let Some(gateway_url) = &self.gateway_url else {
            info!(to = %phone_number, message = %text, "SMS gateway not configured, message logged only.");
            return Ok(());
        };

        let response = self
            .client
            .post(gateway_url)
            .json(&json!({ "to": phone_number, "message": text }))
            .send()
            .await?;
        ensure_success(response, "SMS gateway").await?;

        info!(to = %phone_number, monitor_id = notification.monitor.id, "SMS sent.");
        Ok(())
    }
}

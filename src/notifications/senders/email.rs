use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::info;

use super::{NotificationSender, SenderError, ensure_success};
use crate::notifications::models::{ChannelConfig, Notification};

/// Sends HTML mail through an HTTP mail relay (`POST {from, to, subject, html}`).
pub struct EmailSender {
    client: Client,
    relay_url: Option<String>,
    api_key: Option<String>,
    from: String,
}

impl EmailSender {
    pub fn new(
        client: Client,
        relay_url: Option<String>,
        api_key: Option<String>,
        from: String,
    ) -> Self {
        Self {
            client,
            relay_url,
            api_key,
            from,
        }
    }
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        notification: &Notification,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Email { address } = config else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Email config, but found a different type.".to_string(),
            ));
        };
        let relay_url = self.relay_url.as_deref().ok_or_else(|| {
            SenderError::InvalidConfiguration("No email relay configured.".to_string())
        })?;

        let body = json!({
            "from": self.from,
            "to": address,
            "subject": notification.email_subject(),
            "html": notification.email_html()?,
        });

        let mut request = self.client.post(relay_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        ensure_success(response, "Email relay").await?;

        info!(to = %address, monitor_id = notification.monitor.id, "Email sent.");
        Ok(())
    }
}

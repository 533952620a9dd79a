use futures::future::join_all;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::models::{ChannelConfig, ChannelKind, Notification};
use super::senders::{
    NotificationSender, email::EmailSender, sms::SmsSender, webhook::WebhookSender,
};
use crate::db::models::Owner;
use crate::server::config::ServerConfig;

const SENDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub outcomes: Vec<ChannelOutcome>,
}

impl DispatchReport {
    pub fn attempted(&self, channel: ChannelKind) -> bool {
        self.outcomes.iter().any(|o| o.channel == channel)
    }

    pub fn succeeded(&self, channel: ChannelKind) -> bool {
        self.outcomes
            .iter()
            .any(|o| o.channel == channel && o.error.is_none())
    }
}

/// Fans a notification out to every channel the owner has enabled.
pub struct NotificationService {
    email: Arc<dyn NotificationSender>,
    sms: Arc<dyn NotificationSender>,
    webhook: Arc<dyn NotificationSender>,
}

impl NotificationService {
    pub fn new(
        email: Arc<dyn NotificationSender>,
        sms: Arc<dyn NotificationSender>,
        webhook: Arc<dyn NotificationSender>,
    ) -> Self {
        Self { email, sms, webhook }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(SENDER_TIMEOUT).build()?;
        if config.webhook_secret.is_none() {
            warn!("webhook_secret is not set; webhook notifications will be rejected.");
        }
        Ok(Self::new(
            Arc::new(EmailSender::new(
                client.clone(),
                config.email_relay_url.clone(),
                config.email_api_key.clone(),
                config.email_from.clone(),
            )),
            Arc::new(SmsSender::new(client.clone(), config.sms_gateway_url.clone())),
            Arc::new(WebhookSender::new(client, config.webhook_secret.clone())),
        ))
    }

    /// Channels the owner's preferences enable, in email, SMS, webhook order.
    pub fn enabled_channels(owner: &Owner) -> Vec<ChannelConfig> {
        let prefs = &owner.preferences;
        let mut channels = Vec::new();
        if prefs.email.enabled {
            channels.push(ChannelConfig::Email {
                address: owner.email.clone(),
            });
        }
        if let (true, Some(phone_number)) = (prefs.sms.enabled, &prefs.sms.phone_number) {
            channels.push(ChannelConfig::Sms {
                phone_number: phone_number.clone(),
            });
        }
        if let (true, Some(url)) = (prefs.webhook.enabled, &prefs.webhook.url) {
            channels.push(ChannelConfig::Webhook { url: url.clone() });
        }
        channels
    }

    fn sender_for(&self, kind: ChannelKind) -> &Arc<dyn NotificationSender> {
        match kind {
            ChannelKind::Email => &self.email,
            ChannelKind::Sms => &self.sms,
            ChannelKind::Webhook => &self.webhook,
        }
    }

    /// Attempts every enabled channel concurrently. A failing channel is logged
    /// and recorded in the report; it never stops the others.
    pub async fn dispatch(&self, owner: &Owner, notification: &Notification) -> DispatchReport {
        let channels = Self::enabled_channels(owner);
        let attempts = channels.iter().map(|config| async move {
            let kind = config.kind();
            let result = self.sender_for(kind).send(config, notification).await;
            match &result {
                Ok(()) => info!(
                    user_id = %owner.id,
                    monitor_id = notification.monitor.id,
                    channel = %kind,
                    "Notification delivered."
                ),
                Err(e) => error!(
                    user_id = %owner.id,
                    monitor_id = notification.monitor.id,
                    channel = %kind,
                    error = %e,
                    "Failed to send notification."
                ),
            }
            ChannelOutcome {
                channel: kind,
                error: result.err().map(|e| e.to_string()),
            }
        });

        DispatchReport {
            outcomes: join_all(attempts).await,
        }
    }
}

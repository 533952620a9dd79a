use async_trait::async_trait;
use thiserror::Error;

use super::models::{ChannelConfig, Notification};

pub mod email;
pub mod sms;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// A trait for sending notifications to a specific channel type.
/// All concrete sender implementations (email, SMS, webhook) must implement this trait.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Delivers `notification` to the target described by `config`.
    ///
    /// Implementations reject a `config` variant that is not theirs with
    /// [`SenderError::InvalidConfiguration`].
    async fn send(
        &self,
        config: &ChannelConfig,
        notification: &Notification,
    ) -> Result<(), SenderError>;
}

pub(crate) async fn ensure_success(
    response: reqwest::Response,
    target: &str,
) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{target} returned non-success status: {status}. Body: {error_body}"
    )))
}

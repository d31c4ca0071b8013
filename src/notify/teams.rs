use std::time::Duration;

use log::{error, info};
use reqwest::Client;
use serde_json::Value;

use crate::error::{Result, WatchError};

/// Posts messages to a Microsoft Teams incoming webhook.
///
/// Delivery is attempted once; failures are returned to the caller, which
/// decides whether the run counts as delivered.
#[derive(Debug, Clone)]
pub struct TeamsNotifier {
    client: Client,
    webhook_url: String,
}

impl TeamsNotifier {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let webhook_url = webhook_url.into();
        if webhook_url.trim().is_empty() {
            return Err(WatchError::Config("webhook URL cannot be empty".to_string()));
        }

        let client = Client::builder()
            .user_agent(concat!("launchwatch/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| WatchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            webhook_url,
        })
    }

    pub async fn send(&self, message: &Value) -> Result<()> {
        let response = match self.client.post(&self.webhook_url).json(message).send().await {
            Ok(response) => response,
            Err(e) => {
                error!("Unable to send notification: {e}");
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            error!("Unable to send notification: webhook returned {status}");
            return Err(WatchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        info!("Notification successfully sent");
        Ok(())
    }
}

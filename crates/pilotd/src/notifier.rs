//! Operator notifications.
//!
//! Best effort by design: a delivery failure is logged, never returned -
//! the transport layer (Telegram relay, dashboard) consumes the webhook on
//! its own side. Without a webhook everything lands in the daemon log.

use crate::services::Notifier;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

pub struct WebhookNotifier {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { url, client })
    }

    async fn post(&self, payload: serde_json::Value) -> bool {
        let Some(url) = &self.url else {
            return false;
        };
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!("Notification webhook answered HTTP {}", response.status());
                false
            }
            Err(e) => {
                warn!("Notification webhook unreachable: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_message(&self, channel: &str, text: &str) {
        let delivered = self
            .post(serde_json::json!({ "channel": channel, "text": text }))
            .await;
        if !delivered {
            info!("[notify:{}] {}", channel, text);
        }
    }

    async fn send_confirmation(&self, channel: &str, text: &str, action_id: &str) {
        let delivered = self
            .post(serde_json::json!({
                "channel": channel,
                "text": text,
                "action_id": action_id,
                "buttons": ["approve", "reject"],
            }))
            .await;
        if !delivered {
            info!("[notify:{}] {} (confirmation {})", channel, text, action_id);
        }
    }
}

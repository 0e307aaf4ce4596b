//! Resend client - transactional email sending.

use crate::services::{EmailSender, SendReceipt};
use async_trait::async_trait;
use pilot_common::config::api_keys;
use serde_json::Value;
use std::time::Duration;

const RESEND_API: &str = "https://api.resend.com";

pub struct ResendClient {
    api_key: Option<String>,
    from: Option<String>,
    client: reqwest::Client,
}

impl ResendClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build()?;
        let from = api_keys::get(api_keys::EMAIL_DOMAIN).map(|domain| format!("contact@{}", domain));
        Ok(Self { api_key: api_keys::get(api_keys::EMAIL), from, client })
    }
}

#[async_trait]
impl EmailSender for ResendClient {
    fn configured(&self) -> bool {
        self.api_key.is_some() && self.from.is_some()
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<SendReceipt> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("cle API Resend manquante"))?;
        let from = self
            .from
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("domaine d'envoi non configure"))?;

        let response = self
            .client
            .post(format!("{}/emails", RESEND_API))
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "from": from,
                "to": [to],
                "subject": subject,
                "text": body,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Resend: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        let id = json
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("reponse Resend sans id"))?
            .to_string();
        Ok(SendReceipt { id })
    }
}

//! HubSpot client - contact and deal sync.

use crate::services::{Crm, Deal};
use async_trait::async_trait;
use pilot_common::actions::ContactRef;
use pilot_common::config::api_keys;
use serde_json::Value;
use std::time::Duration;

const HUBSPOT_API: &str = "https://api.hubapi.com";

pub struct HubspotClient {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HubspotClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(20)).build()?;
        Ok(Self { api_key: api_keys::get(api_keys::CRM), client })
    }

    fn key(&self) -> anyhow::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| anyhow::anyhow!("cle API HubSpot manquante"))
    }
}

#[async_trait]
impl Crm for HubspotClient {
    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn find_contact_by_email(&self, email: &str) -> anyhow::Result<Option<String>> {
        let key = self.key()?;
        let body = serde_json::json!({
            "filterGroups": [{
                "filters": [{"propertyName": "email", "operator": "EQ", "value": email}]
            }],
            "limit": 1,
        });
        let response = self
            .client
            .post(format!("{}/crm/v3/objects/contacts/search", HUBSPOT_API))
            .bearer_auth(key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("HubSpot search: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        Ok(json
            .pointer("/results/0/id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()))
    }

    async fn create_contact(&self, contact: &ContactRef, score: Option<f32>) -> anyhow::Result<String> {
        let key = self.key()?;
        let (firstname, lastname) = match contact.nom.as_deref() {
            Some(full) => match full.split_once(' ') {
                Some((first, last)) => (first.to_string(), last.to_string()),
                None => (full.to_string(), String::new()),
            },
            None => (String::new(), String::new()),
        };
        let mut properties = serde_json::json!({
            "email": contact.email,
            "firstname": firstname,
            "lastname": lastname,
            "company": contact.entreprise,
            "jobtitle": contact.titre,
        });
        if let Some(score) = score {
            properties["hs_lead_status"] = serde_json::json!("NEW");
            properties["notes_last_contacted"] = serde_json::json!(format!("Score pilote: {:.1}", score));
        }

        let response = self
            .client
            .post(format!("{}/crm/v3/objects/contacts", HUBSPOT_API))
            .bearer_auth(key)
            .json(&serde_json::json!({ "properties": properties }))
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("HubSpot create contact: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        json.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("reponse HubSpot sans id"))
    }

    async fn create_deal(&self, name: &str) -> anyhow::Result<String> {
        let key = self.key()?;
        let response = self
            .client
            .post(format!("{}/crm/v3/objects/deals", HUBSPOT_API))
            .bearer_auth(key)
            .json(&serde_json::json!({
                "properties": { "dealname": name, "dealstage": "appointmentscheduled" }
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("HubSpot create deal: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        json.get("id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("reponse HubSpot sans id"))
    }

    async fn associate_deal(&self, deal_id: &str, contact_id: &str) -> anyhow::Result<()> {
        let key = self.key()?;
        let response = self
            .client
            .put(format!(
                "{}/crm/v4/objects/deals/{}/associations/default/contacts/{}",
                HUBSPOT_API, deal_id, contact_id
            ))
            .bearer_auth(key)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("HubSpot associate: HTTP {}", response.status());
        }
        Ok(())
    }

    async fn list_deals(&self) -> anyhow::Result<Vec<Deal>> {
        let key = self.key()?;
        let response = self
            .client
            .get(format!("{}/crm/v3/objects/deals?limit=100", HUBSPOT_API))
            .bearer_auth(key)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("HubSpot list deals: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        let results = json.get("results").and_then(|r| r.as_array()).cloned().unwrap_or_default();
        Ok(results
            .iter()
            .filter_map(|deal| {
                Some(Deal {
                    id: deal.get("id")?.as_str()?.to_string(),
                    name: deal.pointer("/properties/dealname")?.as_str()?.to_string(),
                })
            })
            .collect())
    }
}

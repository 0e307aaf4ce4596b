//! Apollo client - people search, metered email reveal, credit balance.

use crate::services::{CreditBalance, FoundLead, LeadSearch};
use async_trait::async_trait;
use pilot_common::config::api_keys;
use pilot_common::state::SearchCriteria;
use serde_json::Value;
use std::time::Duration;

const APOLLO_API: &str = "https://api.apollo.io/v1";
const DEFAULT_PAGE_SIZE: u32 = 25;

pub struct ApolloClient {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl ApolloClient {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self { api_key: api_keys::get(api_keys::LEAD_SEARCH), client })
    }

    fn key(&self) -> anyhow::Result<&str> {
        self.api_key.as_deref().ok_or_else(|| anyhow::anyhow!("cle API Apollo manquante"))
    }

    fn parse_person(person: &Value) -> Option<FoundLead> {
        let organization = person.get("organization").cloned();
        let entreprise = organization
            .as_ref()
            .and_then(|o| o.get("name"))
            .and_then(|n| n.as_str())?
            .to_string();
        Some(FoundLead {
            id: person.get("id").and_then(|v| v.as_str()).map(|s| s.to_string()),
            nom: person.get("name").and_then(|v| v.as_str()).map(|s| s.to_string()),
            entreprise,
            titre: person.get("title").and_then(|v| v.as_str()).map(|s| s.to_string()),
            ville: person.get("city").and_then(|v| v.as_str()).map(|s| s.to_string()),
            industrie: organization
                .as_ref()
                .and_then(|o| o.get("industry"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            // Apollo masks locked addresses as this placeholder
            email: person
                .get("email")
                .and_then(|v| v.as_str())
                .filter(|e| !e.is_empty() && !e.contains("email_not_unlocked"))
                .map(|s| s.to_string()),
            organization,
        })
    }
}

#[async_trait]
impl LeadSearch for ApolloClient {
    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, criteria: &SearchCriteria) -> anyhow::Result<Vec<FoundLead>> {
        let key = self.key()?;
        let mut body = serde_json::json!({
            "page": 1,
            "per_page": criteria.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        });
        if !criteria.titles.is_empty() {
            body["person_titles"] = serde_json::json!(criteria.titles);
        }
        if !criteria.locations.is_empty() {
            body["person_locations"] = serde_json::json!(criteria.locations);
        }
        if !criteria.seniorities.is_empty() {
            body["person_seniorities"] = serde_json::json!(criteria.seniorities);
        }
        if !criteria.industries.is_empty() {
            body["q_organization_keyword_tags"] = serde_json::json!(criteria.industries);
        }
        if let Some(keywords) = &criteria.keywords {
            body["q_keywords"] = serde_json::json!(keywords);
        }
        if !criteria.company_size.is_empty() {
            body["organization_num_employees_ranges"] = serde_json::json!(criteria.company_size);
        }

        let response = self
            .client
            .post(format!("{}/mixed_people/search", APOLLO_API))
            .header("X-Api-Key", key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Apollo search: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        let people = json.get("people").and_then(|p| p.as_array()).cloned().unwrap_or_default();
        Ok(people.iter().filter_map(Self::parse_person).collect())
    }

    async fn reveal(&self, id: &str) -> anyhow::Result<Option<String>> {
        let key = self.key()?;
        let response = self
            .client
            .post(format!("{}/people/match", APOLLO_API))
            .header("X-Api-Key", key)
            .json(&serde_json::json!({ "id": id, "reveal_personal_emails": true }))
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Apollo reveal: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        Ok(json
            .get("person")
            .and_then(|p| p.get("email"))
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty() && !e.contains("email_not_unlocked"))
            .map(|s| s.to_string()))
    }

    async fn credits(&self) -> anyhow::Result<Option<CreditBalance>> {
        let key = self.key()?;
        let response = self
            .client
            .get(format!("{}/usage_stats/api_usage_stats", APOLLO_API))
            .header("X-Api-Key", key)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("Apollo usage: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        let used = json.pointer("/credits/used").and_then(|v| v.as_u64());
        let limit = json.pointer("/credits/limit").and_then(|v| v.as_u64());
        Ok(match (used, limit) {
            (Some(used), Some(limit)) => Some(CreditBalance { used, limit }),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_person_filters_locked_emails() {
        let person = serde_json::json!({
            "id": "p1",
            "name": "Claire Martin",
            "title": "CTO",
            "email": "email_not_unlocked@domain.com",
            "organization": {"name": "Acme", "industry": "SaaS"}
        });
        let lead = ApolloClient::parse_person(&person).unwrap();
        assert_eq!(lead.entreprise, "Acme");
        assert!(lead.email.is_none());
        assert_eq!(lead.industrie.as_deref(), Some("SaaS"));
    }

    #[test]
    fn test_parse_person_requires_organization() {
        let person = serde_json::json!({"id": "p1", "name": "Sans Boite"});
        assert!(ApolloClient::parse_person(&person).is_none());
    }
}

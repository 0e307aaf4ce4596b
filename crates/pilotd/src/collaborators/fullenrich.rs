//! FullEnrich client with a local result store.
//!
//! Enrichment results and their AI classifications persist to
//! `enrichment.json` so the pattern miner and the prospect researcher can
//! read them without spending another credit.

use crate::services::{Classification, Enrichment};
use async_trait::async_trait;
use pilot_common::actions::ContactRef;
use pilot_common::config::api_keys;
use pilot_common::llm::ReasoningService;
use pilot_common::plan::extract_json;
use pilot_common::store::atomic_write_str;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

const FULLENRICH_API: &str = "https://app.fullenrich.com/api/v1";
const ENRICHMENT_FILE: &str = "enrichment.json";

use crate::services::EnrichmentResult;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct EnrichmentDocument {
    results: HashMap<String, EnrichmentResult>,
    classifications: HashMap<String, Classification>,
}

pub struct FullEnrichClient {
    api_key: Option<String>,
    client: reqwest::Client,
    reasoning: Arc<dyn ReasoningService>,
    path: PathBuf,
    doc: Mutex<EnrichmentDocument>,
}

impl FullEnrichClient {
    pub fn new(data_dir: &Path, reasoning: Arc<dyn ReasoningService>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        let path = data_dir.join(ENRICHMENT_FILE);
        let doc = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Ok(Self {
            api_key: api_keys::get(api_keys::ENRICHMENT),
            client,
            reasoning,
            path,
            doc: Mutex::new(doc),
        })
    }

    fn persist(&self, doc: &EnrichmentDocument) {
        match serde_json::to_string_pretty(doc) {
            Ok(json) => {
                if let Err(e) = atomic_write_str(&self.path, &json) {
                    warn!("Failed to persist enrichment store: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize enrichment store: {}", e),
        }
    }

    fn store_result(&self, result: &EnrichmentResult) {
        let mut doc = self.doc.lock().unwrap();
        doc.results.insert(result.email.to_lowercase(), result.clone());
        self.persist(&doc);
    }

    async fn call_enrich(&self, email: &str) -> anyhow::Result<EnrichmentResult> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("cle API FullEnrich manquante"))?;

        let response = self
            .client
            .post(format!("{}/contact/enrich", FULLENRICH_API))
            .bearer_auth(key)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("FullEnrich: HTTP {}", response.status());
        }

        let json: Value = response.json().await?;
        let result = EnrichmentResult {
            success: json.get("person").is_some(),
            email: email.to_string(),
            person: json.get("person").cloned(),
            organization: json.get("organization").cloned(),
        };
        self.store_result(&result);
        Ok(result)
    }
}

#[async_trait]
impl Enrichment for FullEnrichClient {
    fn configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn enrich_by_email(&self, email: &str) -> anyhow::Result<EnrichmentResult> {
        self.call_enrich(email).await
    }

    async fn enrich_batch(&self, contacts: &[ContactRef]) -> anyhow::Result<Vec<EnrichmentResult>> {
        // The bulk endpoint is asynchronous on FullEnrich's side; enriching
        // sequentially keeps the contract simple and respects rate limits.
        let mut results = Vec::new();
        for contact in contacts {
            let Some(email) = contact.email.as_deref() else {
                results.push(EnrichmentResult::default());
                continue;
            };
            match self.call_enrich(email).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("Enrichment failed for {}: {}", email, e);
                    results.push(EnrichmentResult {
                        success: false,
                        email: email.to_string(),
                        ..Default::default()
                    });
                }
            }
        }
        Ok(results)
    }

    fn cached(&self, email: &str) -> Option<EnrichmentResult> {
        self.doc.lock().unwrap().results.get(&email.to_lowercase()).cloned()
    }

    fn classification_for(&self, email: &str) -> Option<Classification> {
        self.doc.lock().unwrap().classifications.get(&email.to_lowercase()).cloned()
    }

    async fn classify(&self, result: &EnrichmentResult) -> anyhow::Result<Option<Classification>> {
        let Some(person) = &result.person else {
            return Ok(None);
        };

        let system = "Tu classifies un contact B2B. Reponds UNIQUEMENT en JSON: {\"job_title\": \"...\", \"industry\": \"...\", \"persona\": \"...\", \"city\": \"...\"} (null pour les champs inconnus)";
        let raw = self.reasoning.complete(system, &person.to_string(), 200).await?;
        let classification: Classification = serde_json::from_value(extract_json(&raw)?)?;

        let mut doc = self.doc.lock().unwrap();
        doc.classifications.insert(result.email.to_lowercase(), classification.clone());
        self.persist(&doc);
        Ok(Some(classification))
    }

    async fn credits(&self) -> anyhow::Result<Option<u64>> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("cle API FullEnrich manquante"))?;
        let response = self
            .client
            .get(format!("{}/account/credits", FULLENRICH_API))
            .bearer_auth(key)
            .send()
            .await?;
        if !response.status().is_success() {
            anyhow::bail!("FullEnrich credits: HTTP {}", response.status());
        }
        let json: Value = response.json().await?;
        Ok(json.get("credits").and_then(|v| v.as_u64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_common::llm::FakeReasoning;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_classification_is_stored_and_survives_reload() {
        let temp = TempDir::new().unwrap();
        let reasoning = Arc::new(FakeReasoning::always(
            "{\"job_title\": \"CTO\", \"industry\": \"SaaS\", \"persona\": \"technique\", \"city\": \"Lyon\"}",
        ));
        let client = FullEnrichClient::new(temp.path(), reasoning.clone()).unwrap();

        let result = EnrichmentResult {
            success: true,
            email: "Claire@Acme.io".to_string(),
            person: Some(serde_json::json!({"headline": "CTO chez Acme"})),
            organization: None,
        };
        let classification = client.classify(&result).await.unwrap().unwrap();
        assert_eq!(classification.job_title.as_deref(), Some("CTO"));

        // Lookup is case-insensitive and persists across a reload
        assert!(client.classification_for("claire@acme.io").is_some());
        let reloaded = FullEnrichClient::new(temp.path(), reasoning).unwrap();
        assert_eq!(
            reloaded.classification_for("claire@acme.io").unwrap().city.as_deref(),
            Some("Lyon")
        );
    }

    #[tokio::test]
    async fn test_classify_without_person_is_none() {
        let temp = TempDir::new().unwrap();
        let client =
            FullEnrichClient::new(temp.path(), Arc::new(FakeReasoning::always("{}"))).unwrap();
        let result = EnrichmentResult { email: "x@y.com".to_string(), ..Default::default() };
        assert!(client.classify(&result).await.unwrap().is_none());
    }
}

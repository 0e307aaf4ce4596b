//! Reasoning-backed skills: lead qualification and email drafting.
//!
//! Both delegate the hard part to the reasoning service and only own the
//! prompt and the JSON extraction.

use crate::services::{EmailDraft, EmailDrafter, FoundLead, LeadQualifier, Qualification};
use async_trait::async_trait;
use pilot_common::actions::ContactRef;
use pilot_common::llm::ReasoningService;
use pilot_common::plan::extract_json;
use std::sync::Arc;

pub struct LlmQualifier {
    reasoning: Arc<dyn ReasoningService>,
}

impl LlmQualifier {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl LeadQualifier for LlmQualifier {
    async fn qualify(&self, lead: &FoundLead) -> anyhow::Result<Qualification> {
        let system = "Tu evalues des prospects B2B. Reponds UNIQUEMENT en JSON: {\"score\": 0-10, \"raison\": \"une phrase\"}";
        let user = format!(
            "Prospect: {} | {} | {} | {} | {}",
            lead.nom.as_deref().unwrap_or("?"),
            lead.titre.as_deref().unwrap_or("titre inconnu"),
            lead.entreprise,
            lead.industrie.as_deref().unwrap_or("industrie inconnue"),
            lead.ville.as_deref().unwrap_or("ville inconnue"),
        );

        let raw = self.reasoning.complete(system, &user, 200).await?;
        let json = extract_json(&raw)?;
        let score = json.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        let raison = json
            .get("raison")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(Qualification { score: score.clamp(0.0, 10.0), raison })
    }
}

pub struct LlmDrafter {
    reasoning: Arc<dyn ReasoningService>,
}

impl LlmDrafter {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl EmailDrafter for LlmDrafter {
    fn configured(&self) -> bool {
        true
    }

    async fn draft(&self, contact: &ContactRef, context: &str) -> anyhow::Result<EmailDraft> {
        let system = "Tu rediges des emails de prospection courts et personnalises. Respecte strictement les regles d'ecriture fournies. Reponds UNIQUEMENT en JSON: {\"subject\": \"...\", \"body\": \"...\"}";
        let user = format!(
            "Destinataire: {} ({}), {}.\n\n{}",
            contact.nom.as_deref().unwrap_or("le prospect"),
            contact.titre.as_deref().unwrap_or("poste inconnu"),
            contact.entreprise.as_deref().unwrap_or("entreprise inconnue"),
            context
        );

        let raw = self.reasoning.complete(system, &user, 800).await?;
        let json = extract_json(&raw)?;
        let subject = json
            .get("subject")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("brouillon sans objet"))?
            .to_string();
        let body = json
            .get("body")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("brouillon sans corps"))?
            .to_string();
        Ok(EmailDraft { subject, body })
    }
}

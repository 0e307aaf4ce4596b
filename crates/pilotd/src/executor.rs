//! Action executor - the only place side effects happen.
//!
//! Dispatches over the closed `Action` vocabulary. Every handler checks its
//! collaborator's preconditions first and converts every failure into an
//! `ExecutionOutcome { success: false, error }`; nothing here ever panics or
//! lets an error escape. Raw plan actions go through `execute_raw`, which
//! turns an unknown type into the standard "Action type inconnu" outcome.

use crate::researcher::ProspectResearcher;
use crate::services::{SentEmail, Services};
use pilot_common::actions::{Action, ContactRef, ExecutionOutcome};
use pilot_common::leads::Lead;
use pilot_common::state::{EmailPreferences, ProgressCounter};
use pilot_common::store::PilotStore;
use pilot_common::LeadStore;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

/// Retries for the transient-failure-prone actions, within one brain cycle.
pub const MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Wire names of the action vocabulary, used to tell "unknown type" apart
/// from "known type, malformed params" when parsing plan actions.
const KNOWN_ACTION_TYPES: &[&str] = &[
    "search_leads",
    "enrich_leads",
    "push_to_crm",
    "generate_email",
    "send_email",
    "update_search_criteria",
    "update_goals",
    "record_learning",
];

pub struct ActionExecutor {
    store: Arc<Mutex<PilotStore>>,
    leads: Arc<Mutex<LeadStore>>,
    services: Services,
    researcher: Arc<ProspectResearcher>,
    retry_backoff: Duration,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<Mutex<PilotStore>>,
        leads: Arc<Mutex<LeadStore>>,
        services: Services,
        researcher: Arc<ProspectResearcher>,
    ) -> Self {
        Self { store, leads, services, researcher, retry_backoff: DEFAULT_RETRY_BACKOFF }
    }

    /// Shorter backoff for tests.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Execute a raw plan action. Unknown types become a failed outcome,
    /// never an error.
    pub async fn execute_raw(&self, raw: &Value) -> ExecutionOutcome {
        match serde_json::from_value::<Action>(raw.clone()) {
            Ok(action) => self.execute(&action).await,
            Err(e) => {
                let type_name = raw.get("type").and_then(|t| t.as_str()).unwrap_or("?");
                if KNOWN_ACTION_TYPES.contains(&type_name) {
                    warn!("Plan action {} has malformed params: {}", type_name, e);
                    ExecutionOutcome::fail(format!("Parametres invalides pour {}", type_name))
                } else {
                    warn!("Plan action with unknown type: {}", type_name);
                    ExecutionOutcome::unknown_type(type_name)
                }
            }
        }
    }

    /// Execute with the brain-cycle retry policy: up to `MAX_RETRIES` extra
    /// attempts for the retryable subset, with a fixed backoff in between.
    /// Returns the final outcome and the number of attempts made.
    pub async fn execute_with_retry(&self, action: &Action) -> (ExecutionOutcome, u32) {
        let max_attempts = if action.retryable() { 1 + MAX_RETRIES } else { 1 };
        let mut attempts = 0;
        loop {
            attempts += 1;
            let outcome = self.execute(action).await;
            if outcome.is_settled() || attempts >= max_attempts {
                return (outcome, attempts);
            }
            info!(
                "Action {} failed (attempt {}/{}), retrying",
                action.type_name(),
                attempts,
                max_attempts
            );
            tokio::time::sleep(self.retry_backoff).await;
        }
    }

    pub async fn execute(&self, action: &Action) -> ExecutionOutcome {
        let result = match action {
            Action::SearchLeads { criteria } => self.search_leads(criteria.as_ref()).await,
            Action::EnrichLeads { contacts, emails } => self.enrich_leads(contacts, emails).await,
            Action::PushToCrm { contacts } => self.push_to_crm(contacts).await,
            Action::GenerateEmail { contact, instructions } => {
                self.generate_email(contact, instructions.as_deref()).await
            }
            Action::SendEmail { to, subject, body, generate_first, research_first } => {
                self.send_email(to, subject.as_deref(), body.as_deref(), *generate_first, *research_first)
                    .await
            }
            Action::UpdateSearchCriteria { updates } => {
                let applied = self.store.lock().unwrap().update_search_criteria(updates);
                if applied {
                    Ok(ExecutionOutcome::ok("Criteres de recherche mis a jour"))
                } else {
                    Ok(ExecutionOutcome::fail("Aucun champ de criteres reconnu"))
                }
            }
            Action::UpdateGoals { updates } => {
                let applied = self.store.lock().unwrap().update_weekly_goals(updates);
                if applied {
                    Ok(ExecutionOutcome::ok("Objectifs hebdo mis a jour"))
                } else {
                    Ok(ExecutionOutcome::fail("Aucun champ d'objectif reconnu"))
                }
            }
            Action::RecordLearning { category, summary, data } => {
                self.store.lock().unwrap().add_learning(
                    *category,
                    pilot_common::state::Learning {
                        summary: summary.clone(),
                        data: data.clone(),
                        source: "brain".to_string(),
                        recorded_at: chrono::Utc::now(),
                    },
                );
                Ok(ExecutionOutcome::ok(format!("Apprentissage note ({})", category.as_str())))
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Action {} failed: {}", action.type_name(), e);
                ExecutionOutcome::fail(e.to_string())
            }
        }
    }

    // ------------------------------------------------------------------
    // search_leads
    // ------------------------------------------------------------------

    async fn search_leads(
        &self,
        criteria: Option<&pilot_common::state::SearchCriteria>,
    ) -> anyhow::Result<ExecutionOutcome> {
        if !self.services.leads.configured() {
            return Ok(ExecutionOutcome::fail("Cle API Apollo manquante"));
        }

        let (criteria, min_score) = {
            let store = self.store.lock().unwrap();
            let state = store.state();
            (
                criteria.cloned().unwrap_or_else(|| state.goals.search_criteria.clone()),
                state.goals.weekly.min_lead_score,
            )
        };

        self.store.lock().unwrap().record_api_call();
        let candidates = self.services.leads.search(&criteria).await?;
        let total = candidates.len();
        let mut qualified = 0usize;
        let mut saved = 0usize;
        let mut credits_spent = 0usize;

        for candidate in candidates {
            // Scoring failure downgrades the candidate, it never aborts the
            // whole search.
            let qualification = match self.services.qualifier.qualify(&candidate).await {
                Ok(q) => q,
                Err(e) => {
                    warn!("Qualification failed for {}: {}", candidate.entreprise, e);
                    crate::services::Qualification { score: 0.0, raison: String::new() }
                }
            };
            if qualification.score >= min_score {
                qualified += 1;
            }

            // The reveal call is metered: spend it only on qualified
            // candidates that still lack an email.
            let mut email = candidate.email.clone();
            if email.is_none() && qualification.score >= min_score {
                if let Some(id) = &candidate.id {
                    self.store.lock().unwrap().record_api_call();
                    credits_spent += 1;
                    match self.services.leads.reveal(id).await {
                        Ok(revealed) => email = revealed,
                        Err(e) => warn!("Reveal failed for {}: {}", id, e),
                    }
                }
            }

            let lead = Lead {
                nom: candidate.nom.clone(),
                entreprise: candidate.entreprise.clone(),
                email,
                titre: candidate.titre.clone(),
                ville: candidate.ville.clone(),
                industrie: candidate.industrie.clone(),
                score: qualification.score,
                raison: if qualification.raison.is_empty() {
                    None
                } else {
                    Some(qualification.raison)
                },
                source: Some("apollo".to_string()),
                found_at: Some(chrono::Utc::now()),
                organization: candidate.organization.clone(),
                ..Default::default()
            };
            self.leads.lock().unwrap().upsert(lead);
            saved += 1;
        }

        if saved > 0 {
            self.store.lock().unwrap().increment_progress(ProgressCounter::LeadsFound, saved as u32);
        }

        let summary = format!(
            "{} candidats, {} qualifies, {} sauvegardes ({} credit(s) de reveal)",
            total, qualified, saved, credits_spent
        );
        info!("search_leads: {}", summary);
        Ok(ExecutionOutcome::ok_with_data(
            summary,
            serde_json::json!({ "total": total, "qualified": qualified, "saved": saved }),
        ))
    }

    // ------------------------------------------------------------------
    // enrich_leads
    // ------------------------------------------------------------------

    async fn enrich_leads(
        &self,
        contacts: &[ContactRef],
        emails: &[String],
    ) -> anyhow::Result<ExecutionOutcome> {
        if !self.services.enrichment.configured() {
            return Ok(ExecutionOutcome::fail("Cle API FullEnrich manquante"));
        }
        if contacts.is_empty() && emails.is_empty() {
            return Ok(ExecutionOutcome::fail("Aucun contact a enrichir"));
        }

        let mut enriched = 0usize;
        let mut classified = 0usize;
        let mut failed = 0usize;

        // Structured contacts go through the batch endpoint
        if !contacts.is_empty() {
            self.store.lock().unwrap().record_api_call();
            let results = self.services.enrichment.enrich_batch(contacts).await?;
            for result in results {
                if result.success {
                    enriched += 1;
                    if let Ok(Some(_)) = self.services.enrichment.classify(&result).await {
                        classified += 1;
                    }
                } else {
                    failed += 1;
                }
            }
        }

        // Bare emails fall back to one-by-one enrichment
        for email in emails {
            self.store.lock().unwrap().record_api_call();
            match self.services.enrichment.enrich_by_email(email).await {
                Ok(result) if result.success => {
                    enriched += 1;
                    if let Ok(Some(_)) = self.services.enrichment.classify(&result).await {
                        classified += 1;
                    }
                }
                Ok(_) => failed += 1,
                Err(e) => {
                    warn!("Enrichment failed for {}: {}", email, e);
                    failed += 1;
                }
            }
        }

        let summary = format!("{} enrichis, {} classifies, {} echecs", enriched, classified, failed);
        info!("enrich_leads: {}", summary);
        Ok(ExecutionOutcome::ok_with_data(
            summary,
            serde_json::json!({ "enriched": enriched, "classified": classified, "failed": failed }),
        ))
    }

    // ------------------------------------------------------------------
    // push_to_crm
    // ------------------------------------------------------------------

    async fn push_to_crm(&self, contacts: &[ContactRef]) -> anyhow::Result<ExecutionOutcome> {
        if !self.services.crm.configured() {
            return Ok(ExecutionOutcome::fail("Cle API HubSpot manquante"));
        }
        if contacts.is_empty() {
            return Ok(ExecutionOutcome::fail("Aucun contact a pousser"));
        }

        let deal_threshold = self.store.lock().unwrap().state().goals.weekly.push_to_crm_above_score;
        let mut contacts_created = 0usize;
        let mut deals_created = 0usize;
        let mut skipped = 0usize;

        for contact in contacts {
            let Some(email) = contact.email.as_deref() else {
                skipped += 1;
                continue;
            };

            self.store.lock().unwrap().record_api_call();
            if self.services.crm.find_contact_by_email(email).await?.is_some() {
                skipped += 1;
                continue;
            }

            let score = self.leads.lock().unwrap().find_by_email(email).map(|l| l.score);
            let contact_id = self.services.crm.create_contact(contact, score).await?;
            contacts_created += 1;

            if score.unwrap_or(0.0) >= deal_threshold {
                let deal_name = format!(
                    "{} - {}",
                    contact.entreprise.as_deref().unwrap_or("?"),
                    contact.nom.as_deref().unwrap_or(email)
                );
                let deal_id = self.services.crm.create_deal(&deal_name).await?;
                self.services.crm.associate_deal(&deal_id, &contact_id).await?;
                deals_created += 1;
            }

            self.leads.lock().unwrap().mark_pushed_to_crm(email);
        }

        let summary =
            format!("{} contact(s) crees, {} deal(s), {} deja presents", contacts_created, deals_created, skipped);
        info!("push_to_crm: {}", summary);
        let mut outcome = ExecutionOutcome::ok_with_data(
            summary,
            serde_json::json!({ "contacts": contacts_created, "deals": deals_created, "skipped": skipped }),
        );
        // Everything already present: settled, not worth a retry
        if contacts_created == 0 && skipped > 0 {
            outcome.deduplicated = true;
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // generate_email / send_email
    // ------------------------------------------------------------------

    /// Drafting context: business description, style rules, offer, and
    /// whatever extra brief the caller collected.
    fn email_context(&self, extra: Option<&str>) -> String {
        let store = self.store.lock().unwrap();
        let config = &store.state().config;
        let mut sections = Vec::new();

        if let Some(context) = &config.business_context {
            sections.push(format!("Activite: {}", context));
        }
        sections.push(render_style_rules(&config.email_preferences));
        let offer = &config.offer;
        if let Some(pitch) = &offer.pitch {
            let mut line = format!("Offre: {}", pitch);
            if let Some(pricing) = &offer.pricing {
                line.push_str(&format!(" ({})", pricing));
            }
            sections.push(line);
        }
        if let Some(extra) = extra {
            if !extra.is_empty() {
                sections.push(format!("Contexte prospect:\n{}", extra));
            }
        }
        sections.join("\n\n")
    }

    async fn generate_email(
        &self,
        contact: &ContactRef,
        instructions: Option<&str>,
    ) -> anyhow::Result<ExecutionOutcome> {
        if !self.services.drafter.configured() {
            return Ok(ExecutionOutcome::fail("Redaction d'email non configuree"));
        }

        let context = self.email_context(instructions);
        self.store.lock().unwrap().record_api_call();
        let draft = self.services.drafter.draft(contact, &context).await?;

        Ok(ExecutionOutcome::ok_with_data(
            format!("Email redige: \"{}\"", draft.subject),
            serde_json::json!({ "subject": draft.subject, "body": draft.body }),
        ))
    }

    async fn send_email(
        &self,
        to: &str,
        subject: Option<&str>,
        body: Option<&str>,
        generate_first: bool,
        research_first: bool,
    ) -> anyhow::Result<ExecutionOutcome> {
        if !self.services.sender.configured() {
            return Ok(ExecutionOutcome::fail("Cle API Resend manquante"));
        }

        let (subject, body) = match (subject, body) {
            (Some(s), Some(b)) if !generate_first => (s.to_string(), b.to_string()),
            _ => {
                if !self.services.drafter.configured() {
                    return Ok(ExecutionOutcome::fail(
                        "Email sans contenu et redaction non configuree",
                    ));
                }
                let contact = self.contact_for(to);
                let brief = if research_first {
                    self.researcher.research_brief(&contact).await.ok()
                } else {
                    None
                };
                let context = self.email_context(brief.as_deref());
                self.store.lock().unwrap().record_api_call();
                let draft = self.services.drafter.draft(&contact, &context).await?;
                (draft.subject, draft.body)
            }
        };

        self.store.lock().unwrap().record_api_call();
        let receipt = self.services.sender.send(to, &subject, &body).await?;

        self.services.mailer.record_send(SentEmail {
            to: to.to_string(),
            subject: subject.clone(),
            sent_at: chrono::Utc::now(),
            opened: false,
            open_count: 0,
            campaign: None,
        });
        self.leads.lock().unwrap().mark_email_sent(to);
        self.store.lock().unwrap().increment_progress(ProgressCounter::EmailsSent, 1);

        info!("send_email: \"{}\" -> {}", subject, to);
        Ok(ExecutionOutcome::ok_with_data(
            format!("Email \"{}\" envoye a {}", subject, to),
            serde_json::json!({ "id": receipt.id, "subject": subject }),
        ))
    }

    /// Best-known contact details for an address, falling back to the bare
    /// email when the lead store has nothing.
    fn contact_for(&self, email: &str) -> ContactRef {
        let leads = self.leads.lock().unwrap();
        match leads.find_by_email(email) {
            Some(lead) => ContactRef {
                nom: lead.nom.clone(),
                entreprise: Some(lead.entreprise.clone()),
                email: Some(email.to_string()),
                titre: lead.titre.clone(),
            },
            None => ContactRef { email: Some(email.to_string()), ..Default::default() },
        }
    }
}

/// Style rules line for drafting prompts.
pub fn render_style_rules(prefs: &EmailPreferences) -> String {
    format!(
        "Regles d'ecriture: {} lignes max, langue {}, ton {}, accroche {}. Mots interdits: {}.",
        prefs.max_lines,
        prefs.language,
        prefs.tone,
        prefs.hook_style,
        prefs.forbidden_words.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{CreditBalance, FoundLead};
    use crate::testing::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: Arc<Mutex<PilotStore>>,
        leads: Arc<Mutex<LeadStore>>,
        services: Services,
        mailer: Arc<InMemoryMailerStore>,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Mutex::new(PilotStore::open(temp.path())));
        let leads = Arc::new(Mutex::new(LeadStore::open(temp.path())));
        let (services, _notifier, mailer, _monitor) = fake_services();
        Fixture { _temp: temp, store, leads, services, mailer }
    }

    fn executor(f: &Fixture) -> ActionExecutor {
        let researcher = Arc::new(ProspectResearcher::new(
            f.store.clone(),
            f.leads.clone(),
            f.services.clone(),
        ));
        ActionExecutor::new(f.store.clone(), f.leads.clone(), f.services.clone(), researcher)
            .with_backoff(Duration::from_millis(1))
    }

    fn candidate(nom: &str, email: Option<&str>) -> FoundLead {
        FoundLead {
            id: Some(format!("id-{}", nom)),
            nom: Some(nom.to_string()),
            entreprise: "Acme".to_string(),
            email: email.map(|e| e.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_action_type() {
        let f = fixture();
        let exec = executor(&f);
        let outcome = exec.execute_raw(&serde_json::json!({"type": "self_destruct"})).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap(), "Action type inconnu: self_destruct");
    }

    #[tokio::test]
    async fn test_search_leads_requires_api_key() {
        let mut f = fixture();
        f.services.leads = Arc::new(FakeLeadSearch::default()); // not configured
        let exec = executor(&f);
        let outcome = exec.execute(&Action::SearchLeads { criteria: None }).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("Apollo"));
    }

    #[tokio::test]
    async fn test_search_leads_reveals_only_qualified_without_email() {
        let mut f = fixture();
        let mut search = FakeLeadSearch::with_leads(vec![
            candidate("avec-email", Some("a@acme.com")),
            candidate("sans-email", None),
        ]);
        search.reveals.insert("id-sans-email".to_string(), "b@acme.com".to_string());
        search.credits = Some(CreditBalance { used: 0, limit: 100 });
        let search = Arc::new(search);
        f.services.leads = search.clone();

        let exec = executor(&f);
        let outcome = exec.execute(&Action::SearchLeads { criteria: None }).await;
        assert!(outcome.success);

        // Exactly one metered reveal: the qualified candidate without email
        assert_eq!(search.reveal_calls.load(std::sync::atomic::Ordering::Relaxed), 1);
        assert!(f.leads.lock().unwrap().find_by_email("b@acme.com").is_some());
        assert_eq!(f.store.lock().unwrap().state().progress.leads_found_this_week, 2);
    }

    #[tokio::test]
    async fn test_search_leads_no_reveal_for_low_scores() {
        let mut f = fixture();
        f.services.qualifier = Arc::new(FakeQualifier { default_score: 2.0, overrides: Default::default() });
        let search = Arc::new(FakeLeadSearch::with_leads(vec![candidate("faible", None)]));
        f.services.leads = search.clone();

        let exec = executor(&f);
        let outcome = exec.execute(&Action::SearchLeads { criteria: None }).await;
        assert!(outcome.success);
        assert_eq!(search.reveal_calls.load(std::sync::atomic::Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_push_to_crm_dedups_and_creates_deals() {
        let mut f = fixture();
        let crm = Arc::new(FakeCrm::configured());
        crm.existing.lock().unwrap().insert("deja@acme.com".to_string(), "c-0".to_string());
        f.services.crm = crm.clone();

        // A stored lead above the deal threshold
        f.leads.lock().unwrap().upsert(Lead {
            nom: Some("Claire".to_string()),
            entreprise: "Acme".to_string(),
            email: Some("new@acme.com".to_string()),
            score: 9.0,
            ..Default::default()
        });

        let exec = executor(&f);
        let contacts = vec![
            ContactRef { email: Some("deja@acme.com".to_string()), ..Default::default() },
            ContactRef {
                nom: Some("Claire".to_string()),
                entreprise: Some("Acme".to_string()),
                email: Some("new@acme.com".to_string()),
                titre: None,
            },
        ];
        let outcome = exec.execute(&Action::PushToCrm { contacts }).await;
        assert!(outcome.success);
        assert_eq!(crm.contacts_created.lock().unwrap().len(), 1);
        assert_eq!(crm.deals_created.lock().unwrap().len(), 1);
        assert_eq!(crm.associations.lock().unwrap().len(), 1);
        assert!(f.leads.lock().unwrap().find_by_email("new@acme.com").unwrap().pushed_to_crm);
    }

    #[tokio::test]
    async fn test_push_to_crm_all_existing_is_deduplicated() {
        let mut f = fixture();
        let crm = Arc::new(FakeCrm::configured());
        crm.existing.lock().unwrap().insert("a@acme.com".to_string(), "c-1".to_string());
        f.services.crm = crm;

        let exec = executor(&f);
        let outcome = exec
            .execute(&Action::PushToCrm {
                contacts: vec![ContactRef { email: Some("a@acme.com".to_string()), ..Default::default() }],
            })
            .await;
        assert!(outcome.deduplicated);
        assert!(outcome.is_settled());
    }

    #[tokio::test]
    async fn test_send_email_generates_when_asked() {
        let f = fixture();
        let exec = executor(&f);

        let outcome = exec
            .execute(&Action::SendEmail {
                to: "a@acme.com".to_string(),
                subject: None,
                body: None,
                generate_first: true,
                research_first: false,
            })
            .await;
        assert!(outcome.success);

        let sent = f.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Question rapide");
        drop(sent);
        assert_eq!(f.store.lock().unwrap().state().progress.emails_sent_this_week, 1);
    }

    #[tokio::test]
    async fn test_send_email_retry_succeeds_after_transient_failure() {
        let mut f = fixture();
        f.services.sender = Arc::new(FakeSender::failing_first(1));
        let exec = executor(&f);

        let action = Action::SendEmail {
            to: "a@acme.com".to_string(),
            subject: Some("Objet".to_string()),
            body: Some("Corps".to_string()),
            generate_first: false,
            research_first: false,
        };
        let (outcome, attempts) = exec.execute_with_retry(&action).await;
        assert!(outcome.success);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_send_email_gives_up_after_retries() {
        let mut f = fixture();
        f.services.sender = Arc::new(FakeSender::failing_first(10));
        let exec = executor(&f);

        let action = Action::SendEmail {
            to: "a@acme.com".to_string(),
            subject: Some("Objet".to_string()),
            body: Some("Corps".to_string()),
            generate_first: false,
            research_first: false,
        };
        let (outcome, attempts) = exec.execute_with_retry(&action).await;
        assert!(!outcome.success);
        assert_eq!(attempts, 1 + MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_non_retryable_action_single_attempt() {
        let mut f = fixture();
        f.services.leads = Arc::new(FakeLeadSearch::default());
        let exec = executor(&f);
        let (outcome, attempts) = exec.execute_with_retry(&Action::SearchLeads { criteria: None }).await;
        assert!(!outcome.success);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_update_goals_whitelist() {
        let f = fixture();
        let exec = executor(&f);

        let outcome = exec
            .execute(&Action::UpdateGoals { updates: pilot_common::actions::GoalsUpdate::default() })
            .await;
        assert!(!outcome.success);

        let outcome = exec
            .execute(&Action::UpdateGoals {
                updates: pilot_common::actions::GoalsUpdate {
                    emails_to_send: Some(25),
                    ..Default::default()
                },
            })
            .await;
        assert!(outcome.success);
        assert_eq!(f.store.lock().unwrap().state().goals.weekly.emails_to_send, 25);
    }

    #[tokio::test]
    async fn test_enrichment_counts() {
        let mut f = fixture();
        let mut enrichment = FakeEnrichment::configured();
        enrichment.results.insert(
            "ok@acme.com".to_string(),
            crate::services::EnrichmentResult {
                success: true,
                email: "ok@acme.com".to_string(),
                ..Default::default()
            },
        );
        f.services.enrichment = Arc::new(enrichment);
        let exec = executor(&f);

        let outcome = exec
            .execute(&Action::EnrichLeads {
                contacts: vec![],
                emails: vec!["ok@acme.com".to_string(), "inconnu@acme.com".to_string()],
            })
            .await;
        assert!(outcome.success);
        let data = outcome.data.unwrap();
        assert_eq!(data["enriched"], 1);
        assert_eq!(data["failed"], 1);
    }

    #[tokio::test]
    async fn test_record_learning_validates_category_via_enum() {
        let f = fixture();
        let exec = executor(&f);
        // A bogus category cannot even be constructed; via raw JSON it is
        // rejected before execution.
        let outcome = exec
            .execute_raw(&serde_json::json!({
                "type": "record_learning",
                "category": "best_excuses",
                "summary": "x"
            }))
            .await;
        assert!(!outcome.success);
    }
}

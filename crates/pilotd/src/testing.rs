//! Scripted collaborator fakes.
//!
//! One fake per trait in `services.rs`, all recording their calls so tests
//! can assert on what the brain actually did. Compiled into the library the
//! same way the reasoning fake is, so integration tests can use them too.

use crate::services::*;
use async_trait::async_trait;
use pilot_common::actions::ContactRef;
use pilot_common::state::SearchCriteria;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct FakeLeadSearch {
    pub configured: bool,
    pub leads: Vec<FoundLead>,
    /// id -> email revealed by the metered call
    pub reveals: HashMap<String, String>,
    pub credits: Option<CreditBalance>,
    pub search_calls: AtomicU64,
    pub reveal_calls: AtomicU64,
}

impl FakeLeadSearch {
    pub fn with_leads(leads: Vec<FoundLead>) -> Self {
        Self { configured: true, leads, ..Default::default() }
    }
}

#[async_trait]
impl LeadSearch for FakeLeadSearch {
    fn configured(&self) -> bool {
        self.configured
    }

    async fn search(&self, _criteria: &SearchCriteria) -> anyhow::Result<Vec<FoundLead>> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.leads.clone())
    }

    async fn reveal(&self, id: &str) -> anyhow::Result<Option<String>> {
        self.reveal_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.reveals.get(id).cloned())
    }

    async fn credits(&self) -> anyhow::Result<Option<CreditBalance>> {
        Ok(self.credits)
    }
}

/// Scores every candidate with the same result unless an override matches
/// the company name.
pub struct FakeQualifier {
    pub default_score: f32,
    pub overrides: HashMap<String, f32>,
}

impl Default for FakeQualifier {
    fn default() -> Self {
        Self { default_score: 8.0, overrides: HashMap::new() }
    }
}

#[async_trait]
impl LeadQualifier for FakeQualifier {
    async fn qualify(&self, lead: &FoundLead) -> anyhow::Result<Qualification> {
        let score = self.overrides.get(&lead.entreprise).copied().unwrap_or(self.default_score);
        Ok(Qualification { score, raison: format!("profil pertinent ({})", lead.entreprise) })
    }
}

#[derive(Default)]
pub struct FakeEnrichment {
    pub configured: bool,
    pub results: HashMap<String, EnrichmentResult>,
    pub cached: Mutex<HashMap<String, EnrichmentResult>>,
    pub classifications: Mutex<HashMap<String, Classification>>,
    pub credits: Option<u64>,
    pub enrich_calls: AtomicU64,
}

impl FakeEnrichment {
    pub fn configured() -> Self {
        Self { configured: true, ..Default::default() }
    }

    pub fn set_classification(&self, email: &str, classification: Classification) {
        self.classifications.lock().unwrap().insert(email.to_lowercase(), classification);
    }
}

#[async_trait]
impl Enrichment for FakeEnrichment {
    fn configured(&self) -> bool {
        self.configured
    }

    async fn enrich_by_email(&self, email: &str) -> anyhow::Result<EnrichmentResult> {
        self.enrich_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .results
            .get(&email.to_lowercase())
            .cloned()
            .unwrap_or(EnrichmentResult { success: false, email: email.to_string(), ..Default::default() }))
    }

    async fn enrich_batch(&self, contacts: &[ContactRef]) -> anyhow::Result<Vec<EnrichmentResult>> {
        let mut out = Vec::new();
        for contact in contacts {
            let email = contact.email.clone().unwrap_or_default();
            out.push(self.enrich_by_email(&email).await?);
        }
        Ok(out)
    }

    fn cached(&self, email: &str) -> Option<EnrichmentResult> {
        self.cached.lock().unwrap().get(&email.to_lowercase()).cloned()
    }

    fn classification_for(&self, email: &str) -> Option<Classification> {
        self.classifications.lock().unwrap().get(&email.to_lowercase()).cloned()
    }

    async fn classify(&self, result: &EnrichmentResult) -> anyhow::Result<Option<Classification>> {
        Ok(self.classification_for(&result.email))
    }

    async fn credits(&self) -> anyhow::Result<Option<u64>> {
        Ok(self.credits)
    }
}

#[derive(Default)]
pub struct FakeCrm {
    pub configured: bool,
    /// Contacts that already exist, email -> contact id
    pub existing: Mutex<HashMap<String, String>>,
    pub contacts_created: Mutex<Vec<ContactRef>>,
    pub deals_created: Mutex<Vec<String>>,
    pub associations: Mutex<Vec<(String, String)>>,
    pub deals: Vec<Deal>,
}

impl FakeCrm {
    pub fn configured() -> Self {
        Self { configured: true, ..Default::default() }
    }
}

#[async_trait]
impl Crm for FakeCrm {
    fn configured(&self) -> bool {
        self.configured
    }

    async fn find_contact_by_email(&self, email: &str) -> anyhow::Result<Option<String>> {
        Ok(self.existing.lock().unwrap().get(&email.to_lowercase()).cloned())
    }

    async fn create_contact(&self, contact: &ContactRef, _score: Option<f32>) -> anyhow::Result<String> {
        let id = format!("contact-{}", self.contacts_created.lock().unwrap().len() + 1);
        if let Some(email) = &contact.email {
            self.existing.lock().unwrap().insert(email.to_lowercase(), id.clone());
        }
        self.contacts_created.lock().unwrap().push(contact.clone());
        Ok(id)
    }

    async fn create_deal(&self, name: &str) -> anyhow::Result<String> {
        let id = format!("deal-{}", self.deals_created.lock().unwrap().len() + 1);
        self.deals_created.lock().unwrap().push(name.to_string());
        Ok(id)
    }

    async fn associate_deal(&self, deal_id: &str, contact_id: &str) -> anyhow::Result<()> {
        self.associations.lock().unwrap().push((deal_id.to_string(), contact_id.to_string()));
        Ok(())
    }

    async fn list_deals(&self) -> anyhow::Result<Vec<Deal>> {
        Ok(self.deals.clone())
    }
}

pub struct FakeDrafter {
    pub configured: bool,
    pub draft: EmailDraft,
}

impl Default for FakeDrafter {
    fn default() -> Self {
        Self {
            configured: true,
            draft: EmailDraft {
                subject: "Question rapide".to_string(),
                body: "Bonjour,\n\nUne question rapide sur votre equipe.".to_string(),
            },
        }
    }
}

#[async_trait]
impl EmailDrafter for FakeDrafter {
    fn configured(&self) -> bool {
        self.configured
    }

    async fn draft(&self, _contact: &ContactRef, _context: &str) -> anyhow::Result<EmailDraft> {
        Ok(self.draft.clone())
    }
}

#[derive(Default)]
pub struct FakeSender {
    pub configured: bool,
    /// Fail this many sends before succeeding, to exercise the retry loop
    pub fail_first: AtomicU64,
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl FakeSender {
    pub fn configured() -> Self {
        Self { configured: true, ..Default::default() }
    }

    pub fn failing_first(n: u64) -> Self {
        Self { configured: true, fail_first: AtomicU64::new(n), ..Default::default() }
    }
}

#[async_trait]
impl EmailSender for FakeSender {
    fn configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<SendReceipt> {
        let remaining = self.fail_first.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::Relaxed);
            anyhow::bail!("temporary send failure");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(SendReceipt { id: format!("msg-{}", sent.len()) })
    }
}

#[derive(Default)]
pub struct InMemoryMailerStore {
    pub sent: Mutex<Vec<SentEmail>>,
    pub follow_ups: Mutex<Vec<FollowUpSequence>>,
    pub campaigns: usize,
}

impl InMemoryMailerStore {
    pub fn with_sends(sends: Vec<SentEmail>) -> Self {
        Self { sent: Mutex::new(sends), ..Default::default() }
    }
}

impl MailerStore for InMemoryMailerStore {
    fn sent_emails(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }

    fn open_rate(&self) -> Option<f32> {
        let sent = self.sent.lock().unwrap();
        if sent.is_empty() {
            return None;
        }
        let opened = sent.iter().filter(|e| e.opened).count();
        Some(opened as f32 / sent.len() as f32)
    }

    fn active_campaigns(&self) -> usize {
        self.campaigns
    }

    fn record_send(&self, email: SentEmail) {
        self.sent.lock().unwrap().push(email);
    }

    fn has_follow_up(&self, email: &str) -> bool {
        self.follow_ups
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.contact_email.eq_ignore_ascii_case(email))
    }

    fn create_follow_up(&self, sequence: FollowUpSequence) {
        self.follow_ups.lock().unwrap().push(sequence);
    }

    fn hot_leads(&self, min_opens: u32) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.open_count >= min_opens)
            .map(|e| e.to.clone())
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryMonitorStore {
    pub articles: Vec<Article>,
    pub trend_list: Vec<Trend>,
    pub signals: Vec<MarketSignal>,
    pub digest: Option<String>,
    pub watch_list: Mutex<Vec<Watch>>,
}

impl MonitorStore for InMemoryMonitorStore {
    fn recent_articles(&self, min_relevance: f32, limit: usize) -> Vec<Article> {
        self.articles.iter().filter(|a| a.relevance >= min_relevance).take(limit).cloned().collect()
    }

    fn articles_about(&self, company: &str, limit: usize) -> Vec<Article> {
        self.articles
            .iter()
            .filter(|a| a.company.as_deref().map(|c| c.eq_ignore_ascii_case(company)).unwrap_or(false))
            .take(limit)
            .cloned()
            .collect()
    }

    fn trends(&self) -> Vec<Trend> {
        self.trend_list.clone()
    }

    fn market_signals(&self) -> Vec<MarketSignal> {
        self.signals.clone()
    }

    fn competitive_digest(&self) -> Option<String> {
        self.digest.clone()
    }

    fn watches(&self) -> Vec<Watch> {
        self.watch_list.lock().unwrap().clone()
    }

    fn create_watch(&self, name: &str, kind: WatchKind) {
        self.watch_list.lock().unwrap().push(Watch { name: name.to_string(), kind });
    }
}

pub struct FakeImprovement {
    pub analysis: Option<String>,
    pub recommendations: Vec<String>,
}

impl SelfImprovement for FakeImprovement {
    fn last_analysis(&self) -> Option<String> {
        self.analysis.clone()
    }

    fn pending_recommendations(&self) -> Vec<String> {
        self.recommendations.clone()
    }
}

/// Records everything sent to the operator.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<(String, String)>>,
    pub confirmations: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, channel: &str, text: &str) {
        self.messages.lock().unwrap().push((channel.to_string(), text.to_string()));
    }

    async fn send_confirmation(&self, channel: &str, text: &str, action_id: &str) {
        self.confirmations.lock().unwrap().push((
            channel.to_string(),
            text.to_string(),
            action_id.to_string(),
        ));
    }
}

#[derive(Default)]
pub struct FakeWebFetcher {
    pub site_text: Option<String>,
    pub news: Vec<NewsItem>,
    pub site_calls: AtomicU64,
}

#[async_trait]
impl WebFetcher for FakeWebFetcher {
    async fn fetch_site(&self, _domain: &str) -> anyhow::Result<String> {
        self.site_calls.fetch_add(1, Ordering::Relaxed);
        self.site_text.clone().ok_or_else(|| anyhow::anyhow!("site unreachable"))
    }

    async fn search_news(&self, _company: &str) -> anyhow::Result<Vec<NewsItem>> {
        Ok(self.news.clone())
    }
}

/// A fully faked registry; tests override individual fields as needed.
pub fn fake_services() -> (
    Services,
    std::sync::Arc<RecordingNotifier>,
    std::sync::Arc<InMemoryMailerStore>,
    std::sync::Arc<InMemoryMonitorStore>,
) {
    use std::sync::Arc;

    let notifier = Arc::new(RecordingNotifier::default());
    let mailer = Arc::new(InMemoryMailerStore::default());
    let monitor = Arc::new(InMemoryMonitorStore::default());

    let services = Services {
        reasoning: Arc::new(pilot_common::llm::FakeReasoning::always("{\"reasoning\": \"ok\", \"actions\": []}")),
        leads: Arc::new(FakeLeadSearch::default()),
        qualifier: Arc::new(FakeQualifier::default()),
        enrichment: Arc::new(FakeEnrichment::configured()),
        crm: Arc::new(FakeCrm::configured()),
        drafter: Arc::new(FakeDrafter::default()),
        sender: Arc::new(FakeSender::configured()),
        mailer: mailer.clone(),
        monitor: monitor.clone(),
        improvement: None,
        notifier: notifier.clone(),
        web: Arc::new(FakeWebFetcher::default()),
    };
    (services, notifier, mailer, monitor)
}

//! Collaborator seams.
//!
//! Every external system the pilot touches is a narrow async trait, injected
//! once at startup through the `Services` registry. The brain and the
//! executor never discover collaborators themselves, so tests can substitute
//! the fakes from `testing.rs` for any of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pilot_common::actions::ContactRef;
use pilot_common::llm::ReasoningService;
use pilot_common::state::SearchCriteria;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Lead search
// ---------------------------------------------------------------------------

/// A candidate returned by the search collaborator. The email may be locked
/// behind a metered reveal call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FoundLead {
    pub id: Option<String>,
    pub nom: Option<String>,
    pub entreprise: String,
    pub titre: Option<String>,
    pub ville: Option<String>,
    pub industrie: Option<String>,
    pub email: Option<String>,
    /// Raw organization payload, kept for the prospect researcher
    pub organization: Option<Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct CreditBalance {
    pub used: u64,
    pub limit: u64,
}

impl CreditBalance {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used)
    }
}

#[async_trait]
pub trait LeadSearch: Send + Sync {
    fn configured(&self) -> bool;

    async fn search(&self, criteria: &SearchCriteria) -> anyhow::Result<Vec<FoundLead>>;

    /// Metered (1 credit per call); returns the revealed email if any.
    async fn reveal(&self, id: &str) -> anyhow::Result<Option<String>>;

    async fn credits(&self) -> anyhow::Result<Option<CreditBalance>>;
}

// ---------------------------------------------------------------------------
// Qualification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Qualification {
    pub score: f32,
    pub raison: String,
}

#[async_trait]
pub trait LeadQualifier: Send + Sync {
    async fn qualify(&self, lead: &FoundLead) -> anyhow::Result<Qualification>;
}

// ---------------------------------------------------------------------------
// Enrichment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EnrichmentResult {
    pub success: bool,
    pub email: String,
    pub person: Option<Value>,
    pub organization: Option<Value>,
}

/// AI classification of an enriched contact, joined against sent emails by
/// the pattern miner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Classification {
    pub job_title: Option<String>,
    pub industry: Option<String>,
    pub persona: Option<String>,
    pub city: Option<String>,
}

#[async_trait]
pub trait Enrichment: Send + Sync {
    fn configured(&self) -> bool;

    async fn enrich_by_email(&self, email: &str) -> anyhow::Result<EnrichmentResult>;

    async fn enrich_batch(&self, contacts: &[ContactRef]) -> anyhow::Result<Vec<EnrichmentResult>>;

    /// Previously stored result for this email, to avoid duplicate calls.
    fn cached(&self, email: &str) -> Option<EnrichmentResult>;

    /// Stored classification for this email, if the contact was classified.
    fn classification_for(&self, email: &str) -> Option<Classification>;

    /// Classify an enrichment result and store the classification.
    async fn classify(&self, result: &EnrichmentResult) -> anyhow::Result<Option<Classification>>;

    async fn credits(&self) -> anyhow::Result<Option<u64>>;
}

// ---------------------------------------------------------------------------
// CRM
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait Crm: Send + Sync {
    fn configured(&self) -> bool;

    async fn find_contact_by_email(&self, email: &str) -> anyhow::Result<Option<String>>;

    async fn create_contact(&self, contact: &ContactRef, score: Option<f32>) -> anyhow::Result<String>;

    async fn create_deal(&self, name: &str) -> anyhow::Result<String>;

    async fn associate_deal(&self, deal_id: &str, contact_id: &str) -> anyhow::Result<()>;

    async fn list_deals(&self) -> anyhow::Result<Vec<Deal>>;
}

// ---------------------------------------------------------------------------
// Email drafting & sending
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmailDraft {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait EmailDrafter: Send + Sync {
    fn configured(&self) -> bool;

    async fn draft(&self, contact: &ContactRef, context: &str) -> anyhow::Result<EmailDraft>;
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SendReceipt {
    pub id: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    fn configured(&self) -> bool;

    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<SendReceipt>;
}

// ---------------------------------------------------------------------------
// Mailer store (sibling subsystem)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub opened: bool,
    #[serde(default)]
    pub open_count: u32,
    #[serde(default)]
    pub campaign: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpStep {
    /// Days after the previous step
    pub day_offset: u32,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpSequence {
    pub contact_email: String,
    pub steps: Vec<FollowUpStep>,
    pub created_at: DateTime<Utc>,
}

pub trait MailerStore: Send + Sync {
    fn sent_emails(&self) -> Vec<SentEmail>;

    /// None until anything was sent.
    fn open_rate(&self) -> Option<f32>;

    fn active_campaigns(&self) -> usize;

    fn record_send(&self, email: SentEmail);

    fn has_follow_up(&self, email: &str) -> bool;

    fn create_follow_up(&self, sequence: FollowUpSequence);

    /// Emails whose open count crossed the hot-lead threshold.
    fn hot_leads(&self, min_opens: u32) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Monitoring (sibling subsystem)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    pub relevance: f32,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trend {
    pub topic: String,
    pub mentions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSignal {
    pub id: String,
    /// funding, acquisition, expansion, product_launch, leadership_change,
    /// hiring, ...
    pub kind: String,
    pub company: String,
    pub headline: String,
    pub detected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchKind {
    Industry,
    Company,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Watch {
    pub name: String,
    pub kind: WatchKind,
}

pub trait MonitorStore: Send + Sync {
    fn recent_articles(&self, min_relevance: f32, limit: usize) -> Vec<Article>;

    fn articles_about(&self, company: &str, limit: usize) -> Vec<Article>;

    fn trends(&self) -> Vec<Trend>;

    fn market_signals(&self) -> Vec<MarketSignal>;

    fn competitive_digest(&self) -> Option<String>;

    fn watches(&self) -> Vec<Watch>;

    fn create_watch(&self, name: &str, kind: WatchKind);
}

// ---------------------------------------------------------------------------
// Self-improvement (sibling subsystem, optional)
// ---------------------------------------------------------------------------

pub trait SelfImprovement: Send + Sync {
    fn last_analysis(&self) -> Option<String>;

    fn pending_recommendations(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Notification channel
// ---------------------------------------------------------------------------

/// Best effort by contract: implementations log failures and never return
/// them - a dead webhook must not take a brain cycle down with it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_message(&self, channel: &str, text: &str);

    /// Message carrying an approve/reject affordance for a queued action.
    async fn send_confirmation(&self, channel: &str, text: &str, action_id: &str);
}

// ---------------------------------------------------------------------------
// Web intel (prospect researcher sources)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    #[serde(default)]
    pub date: Option<String>,
}

#[async_trait]
pub trait WebFetcher: Send + Sync {
    /// Readable text of a company website's landing page.
    async fn fetch_site(&self, domain: &str) -> anyhow::Result<String>;

    /// Company-name news search, already bounded by the implementation.
    async fn search_news(&self, company: &str) -> anyhow::Result<Vec<NewsItem>>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// All collaborator handles, built once in `main` and cloned into whichever
/// component needs a subset.
#[derive(Clone)]
pub struct Services {
    pub reasoning: Arc<dyn ReasoningService>,
    pub leads: Arc<dyn LeadSearch>,
    pub qualifier: Arc<dyn LeadQualifier>,
    pub enrichment: Arc<dyn Enrichment>,
    pub crm: Arc<dyn Crm>,
    pub drafter: Arc<dyn EmailDrafter>,
    pub sender: Arc<dyn EmailSender>,
    pub mailer: Arc<dyn MailerStore>,
    pub monitor: Arc<dyn MonitorStore>,
    pub improvement: Option<Arc<dyn SelfImprovement>>,
    pub notifier: Arc<dyn Notifier>,
    pub web: Arc<dyn WebFetcher>,
}

//! Persisted pilot state document.
//!
//! Everything the pilot knows about itself lives in one versioned JSON
//! document: operator config, goals, weekly progress, the action queue and
//! history, open diagnostics, learnings, experiments, mined patterns, the
//! criteria adjustment audit log, the prospect research cache and counters.
//! The document is only ever mutated through `PilotStore` accessors.

use crate::actions::{Action, ExecutionOutcome};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Current document schema version. Bump together with a new entry in
/// `store::MIGRATIONS`.
pub const STATE_VERSION: u32 = 3;

/// Retention caps, matching what the operator dashboard can usefully show.
pub const ACTION_HISTORY_CAP: usize = 500;
pub const LEARNING_CAP: usize = 50;
pub const WEEKLY_PERFORMANCE_CAP: usize = 52;
pub const CRITERIA_ADJUSTMENT_CAP: usize = 100;
pub const RESEARCH_CACHE_CAP: usize = 500;
pub const RESEARCH_TTL_DAYS: i64 = 7;
pub const PROCESSED_SIGNAL_CAP: usize = 1000;

/// Operator-facing pilot configuration (mutable at runtime)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PilotConfig {
    pub enabled: bool,
    /// Channel the pilot reports to (confirmations, summaries, bilans)
    pub admin_channel_id: Option<String>,
    /// Free-form description of the business the pilot sells for
    pub business_context: Option<String>,
    pub autonomy_level: AutonomyLevel,
    pub offer: Offer,
    pub email_preferences: EmailPreferences,
    pub brain_schedule: BrainSchedule,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_channel_id: None,
            business_context: None,
            autonomy_level: AutonomyLevel::Semi,
            offer: Offer::default(),
            email_preferences: EmailPreferences::default(),
            brain_schedule: BrainSchedule::default(),
        }
    }
}

/// How much the pilot may do without asking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AutonomyLevel {
    /// Execute everything, including criteria auto-adjustment
    Full,
    /// Execute routine actions, queue the rest for confirmation
    #[default]
    Semi,
    /// Queue everything for confirmation
    Manual,
}

impl AutonomyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutonomyLevel::Full => "full",
            AutonomyLevel::Semi => "semi",
            AutonomyLevel::Manual => "manual",
        }
    }
}

/// Commercial offer the emails pitch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Offer {
    pub pitch: Option<String>,
    pub pricing: Option<String>,
    pub target: Option<String>,
}

/// Style rules applied to every generated email
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailPreferences {
    pub max_lines: u32,
    pub language: String,
    pub tone: String,
    pub forbidden_words: Vec<String>,
    pub hook_style: String,
}

impl EmailPreferences {
    /// Words that read as bulk-mail filler; always banned unless the
    /// operator overrides the list with a non-empty one of their own.
    pub fn default_forbidden_words() -> Vec<String> {
        ["synergie", "leader du marche", "revolutionnaire", "incontournable", "opportunite unique"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl Default for EmailPreferences {
    fn default() -> Self {
        Self {
            max_lines: 8,
            language: "fr".to_string(),
            tone: "direct".to_string(),
            forbidden_words: Self::default_forbidden_words(),
            hook_style: "question".to_string(),
        }
    }
}

/// Cycle cadence, seconds between runs of each cycle kind
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainSchedule {
    pub brain_interval_secs: u64,
    pub light_interval_secs: u64,
}

impl Default for BrainSchedule {
    fn default() -> Self {
        // Twice daily for both, offset by the scheduler
        Self { brain_interval_secs: 12 * 3600, light_interval_secs: 12 * 3600 }
    }
}

/// Weekly targets plus the active search criteria
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Goals {
    pub weekly: WeeklyGoals,
    pub search_criteria: SearchCriteria,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyGoals {
    pub leads_to_find: u32,
    pub emails_to_send: u32,
    pub responses_target: u32,
    pub rdv_target: u32,
    /// Open rate below which the week counts as underperforming
    pub min_open_rate: f32,
    /// Minimum qualification score before a lead is worth an email
    pub min_lead_score: f32,
    /// Score at or above which a CRM push also creates a deal
    pub push_to_crm_above_score: f32,
}

impl Default for WeeklyGoals {
    fn default() -> Self {
        Self {
            leads_to_find: 20,
            emails_to_send: 15,
            responses_target: 3,
            rdv_target: 1,
            min_open_rate: 0.15,
            min_lead_score: 7.0,
            push_to_crm_above_score: 8.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct SearchCriteria {
    pub titles: Vec<String>,
    pub locations: Vec<String>,
    pub seniorities: Vec<String>,
    pub industries: Vec<String>,
    pub keywords: Option<String>,
    pub company_size: Vec<String>,
    pub limit: Option<u32>,
}

/// Weekly counters; zeroed on the weekly reset, never decremented otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Progress {
    pub week_start: Option<DateTime<Utc>>,
    pub leads_found_this_week: u32,
    pub emails_sent_this_week: u32,
    pub responses_this_week: u32,
    pub rdv_this_week: u32,
}

impl Progress {
    pub fn zeroed(week_start: DateTime<Utc>) -> Self {
        Self { week_start: Some(week_start), ..Default::default() }
    }

    /// Days elapsed since the start of the current week (0 on day one).
    pub fn days_into_week(&self, now: DateTime<Utc>) -> i64 {
        self.week_start.map(|ws| (now - ws).num_days().max(0)).unwrap_or(0)
    }
}

/// One counter the brain can bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressCounter {
    LeadsFound,
    EmailsSent,
    Responses,
    Rdv,
}

/// Queue entry awaiting (or past) operator confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionQueueEntry {
    pub id: String,
    pub action: Action,
    /// Short human-readable description shown with the approve/reject prompt
    pub preview: String,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    pub result: Option<ExecutionOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Confirmed,
    Rejected,
    Completed,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueueStatus::Rejected | QueueStatus::Completed)
    }
}

/// Record of an executed action, auto or confirmed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionHistoryEntry {
    pub id: String,
    pub action: Action,
    /// True when the brain executed it without operator confirmation
    pub auto: bool,
    pub attempts: u32,
    pub result: ExecutionOutcome,
    pub executed_at: DateTime<Utc>,
}

/// An issue surfaced by the diagnostic checker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticItem {
    pub id: String,
    pub kind: DiagnosticKind,
    pub priority: DiagnosticPriority,
    pub category: String,
    pub message: String,
    pub suggestion: Option<String>,
    pub status: DiagnosticStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DiagnosticItem {
    pub fn new(
        kind: DiagnosticKind,
        priority: DiagnosticPriority,
        category: &str,
        message: String,
        suggestion: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            priority,
            category: category.to_string(),
            message,
            suggestion,
            status: DiagnosticStatus::Open,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }
}

/// Who has to act on the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Needs the operator (billing, DNS, credentials)
    OwnerAction,
    /// The pilot can work around or fix it itself
    BotFixable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticPriority {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStatus {
    Open,
    Resolved,
}

/// Something the pilot decided is worth remembering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub summary: String,
    #[serde(default)]
    pub data: Option<Value>,
    /// Where the insight came from (brain cycle, weekly analysis, operator)
    pub source: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningCategory {
    BestSearchCriteria,
    BestEmailStyles,
    BestSendTimes,
}

impl LearningCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "best_search_criteria" => Some(Self::BestSearchCriteria),
            "best_email_styles" => Some(Self::BestEmailStyles),
            "best_send_times" => Some(Self::BestSendTimes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BestSearchCriteria => "best_search_criteria",
            Self::BestEmailStyles => "best_email_styles",
            Self::BestSendTimes => "best_send_times",
        }
    }
}

/// Learnings per category plus the archived weekly snapshots
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Learnings {
    pub best_search_criteria: Vec<Learning>,
    pub best_email_styles: Vec<Learning>,
    pub best_send_times: Vec<Learning>,
    pub weekly_performance: Vec<WeeklySnapshot>,
}

impl Learnings {
    pub fn category_mut(&mut self, category: LearningCategory) -> &mut Vec<Learning> {
        match category {
            LearningCategory::BestSearchCriteria => &mut self.best_search_criteria,
            LearningCategory::BestEmailStyles => &mut self.best_email_styles,
            LearningCategory::BestSendTimes => &mut self.best_send_times,
        }
    }
}

/// Archived end-of-week state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySnapshot {
    pub progress: Progress,
    pub goals: WeeklyGoals,
    pub archived_at: DateTime<Utc>,
}

/// A/B experiment proposed by the reasoning service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub kind: String,
    pub description: String,
    pub hypothesis: String,
    #[serde(default)]
    pub variants: Vec<String>,
    pub metric: String,
    pub started_at: DateTime<Utc>,
    pub status: ExperimentStatus,
    #[serde(default)]
    pub results: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentStatus {
    Running,
    Completed,
}

/// Send/open counts for one value of one dimension
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternBucket {
    pub value: String,
    pub sends: u32,
    pub opens: u32,
    pub open_rate: f32,
}

/// Mined send-performance patterns, fully replaced each recomputation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Patterns {
    pub computed_at: Option<DateTime<Utc>>,
    pub sample_size: u32,
    pub titles: Vec<PatternBucket>,
    pub industries: Vec<PatternBucket>,
    pub cities: Vec<PatternBucket>,
    pub subject_styles: Vec<PatternBucket>,
    pub send_hours: Vec<PatternBucket>,
    pub best: BestPatterns,
}

/// Top value per dimension, None when no bucket qualified
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BestPatterns {
    pub title: Option<String>,
    pub industry: Option<String>,
    pub city: Option<String>,
    pub subject_style: Option<String>,
    pub send_hour: Option<u32>,
}

/// Audit record for one automatic criteria change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriteriaAdjustment {
    pub action: AdjustmentKind,
    pub value: String,
    pub reason: String,
    pub adjusted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentKind {
    Added,
    Removed,
}

/// Cached prospect intel, keyed by lowercased email in the document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResearch {
    pub intel: Value,
    pub brief: String,
    pub cached_at: DateTime<Utc>,
}

/// Monotonic counters the pilot keeps about itself
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Stats {
    pub total_brain_cycles: u64,
    pub total_light_cycles: u64,
    pub total_weekly_resets: u64,
    pub total_actions_executed: u64,
    pub total_fallback_plans: u64,
    pub last_brain_cycle_at: Option<DateTime<Utc>>,
    /// Collaborator + reasoning calls made today, against the daily budget
    pub api_calls_today: u64,
    /// Day `api_calls_today` refers to, "YYYY-MM-DD"
    pub api_calls_day: Option<String>,
}

impl Stats {
    /// Bump today's API call counter, rolling the day over when needed.
    pub fn record_api_call(&mut self, now: DateTime<Utc>) {
        let today = now.format("%Y-%m-%d").to_string();
        if self.api_calls_day.as_deref() != Some(today.as_str()) {
            self.api_calls_day = Some(today);
            self.api_calls_today = 0;
        }
        self.api_calls_today += 1;
    }
}

/// The whole persisted document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PilotState {
    pub version: u32,
    pub config: PilotConfig,
    pub goals: Goals,
    pub progress: Progress,
    pub action_queue: Vec<ActionQueueEntry>,
    pub action_history: Vec<ActionHistoryEntry>,
    pub diagnostics: Vec<DiagnosticItem>,
    pub learnings: Learnings,
    pub experiments: Vec<Experiment>,
    pub patterns: Patterns,
    pub criteria_adjustments: Vec<CriteriaAdjustment>,
    pub prospect_research: BTreeMap<String, CachedResearch>,
    /// (signal id, lead email) pairs already boosted by the light cycle
    pub processed_signals: BTreeSet<String>,
    pub stats: Stats,
}

/// Derived pilot lifecycle; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// No business context defined yet
    Idle,
    Active,
    Paused,
    /// Fatal configuration problem
    Error,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Active => "active",
            Lifecycle::Paused => "paused",
            Lifecycle::Error => "error",
        }
    }

    /// Allowed transitions: idle→active, active→paused|error, paused→active,
    /// error→active|idle. Anything else is forced (logged, not blocked).
    pub fn transition_allowed(from: Lifecycle, to: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (from, to),
            (Idle, Active) | (Active, Paused) | (Active, Error) | (Paused, Active) | (Error, Active) | (Error, Idle)
        )
    }
}

impl PilotState {
    pub fn lifecycle(&self) -> Lifecycle {
        if self.config.business_context.is_none() {
            Lifecycle::Idle
        } else if self.config.enabled {
            Lifecycle::Active
        } else {
            Lifecycle::Paused
        }
    }

    /// Open diagnostics, critical first.
    pub fn open_diagnostics(&self) -> Vec<&DiagnosticItem> {
        let mut open: Vec<&DiagnosticItem> =
            self.diagnostics.iter().filter(|d| d.status == DiagnosticStatus::Open).collect();
        open.sort_by_key(|d| match d.priority {
            DiagnosticPriority::Critical => 0,
            DiagnosticPriority::Warning => 1,
            DiagnosticPriority::Info => 2,
        });
        open
    }

    pub fn running_experiments(&self) -> Vec<&Experiment> {
        self.experiments.iter().filter(|e| e.status == ExperimentStatus::Running).collect()
    }

    pub fn pending_confirmations(&self) -> usize {
        self.action_queue.iter().filter(|e| e.status == QueueStatus::Pending).count()
    }
}

/// Monday 00:00 UTC of the week containing `now`.
pub fn week_start_of(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = now.weekday().num_days_from_monday() as i64;
    (now - chrono::Duration::days(days_from_monday))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or(now)
}

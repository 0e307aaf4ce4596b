//! The pilot's action vocabulary.
//!
//! Two closed sets: `Action` is everything the executor can do against the
//! outside world, `ControlAction` is everything the conversational handler
//! may change about the pilot itself. Reasoning-service output is parsed
//! against these enums; an unrecognized type never reaches execution.

use crate::state::{LearningCategory, SearchCriteria};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A contact as referenced inside action parameters. `entreprise` is the
/// company name; the field names follow the wire format the collaborators
/// and the reasoning service already speak.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ContactRef {
    #[serde(default)]
    pub nom: Option<String>,
    #[serde(default)]
    pub entreprise: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub titre: Option<String>,
}

/// Partial update to the stored search criteria; only present fields apply.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CriteriaUpdate {
    pub titles: Option<Vec<String>>,
    pub locations: Option<Vec<String>>,
    pub seniorities: Option<Vec<String>>,
    pub industries: Option<Vec<String>>,
    pub keywords: Option<String>,
    pub company_size: Option<Vec<String>>,
    pub limit: Option<u32>,
}

impl CriteriaUpdate {
    pub fn is_empty(&self) -> bool {
        self.titles.is_none()
            && self.locations.is_none()
            && self.seniorities.is_none()
            && self.industries.is_none()
            && self.keywords.is_none()
            && self.company_size.is_none()
            && self.limit.is_none()
    }
}

/// Partial update to the weekly goals; only present fields apply.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GoalsUpdate {
    pub leads_to_find: Option<u32>,
    pub emails_to_send: Option<u32>,
    pub responses_target: Option<u32>,
    pub rdv_target: Option<u32>,
    pub min_open_rate: Option<f32>,
    pub min_lead_score: Option<f32>,
    pub push_to_crm_above_score: Option<f32>,
}

impl GoalsUpdate {
    pub fn is_empty(&self) -> bool {
        self.leads_to_find.is_none()
            && self.emails_to_send.is_none()
            && self.responses_target.is_none()
            && self.rdv_target.is_none()
            && self.min_open_rate.is_none()
            && self.min_lead_score.is_none()
            && self.push_to_crm_above_score.is_none()
    }
}

/// Everything the executor can do. Tagged so reasoning-service JSON
/// round-trips directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SearchLeads {
        /// Defaults to the stored search criteria when absent
        #[serde(default)]
        criteria: Option<SearchCriteria>,
    },
    EnrichLeads {
        /// Structured contacts, enriched as a batch
        #[serde(default)]
        contacts: Vec<ContactRef>,
        /// Bare emails, enriched one by one as a fallback
        #[serde(default)]
        emails: Vec<String>,
    },
    PushToCrm {
        #[serde(default)]
        contacts: Vec<ContactRef>,
    },
    GenerateEmail {
        contact: ContactRef,
        #[serde(default)]
        instructions: Option<String>,
    },
    SendEmail {
        to: String,
        #[serde(default)]
        subject: Option<String>,
        #[serde(default)]
        body: Option<String>,
        /// Draft the email first instead of using a literal subject/body
        #[serde(default)]
        generate_first: bool,
        /// Run prospect research before drafting
        #[serde(default)]
        research_first: bool,
    },
    UpdateSearchCriteria {
        updates: CriteriaUpdate,
    },
    UpdateGoals {
        updates: GoalsUpdate,
    },
    RecordLearning {
        category: LearningCategory,
        summary: String,
        #[serde(default)]
        data: Option<Value>,
    },
}

impl Action {
    /// Wire name, used in history and operator-facing summaries.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::SearchLeads { .. } => "search_leads",
            Action::EnrichLeads { .. } => "enrich_leads",
            Action::PushToCrm { .. } => "push_to_crm",
            Action::GenerateEmail { .. } => "generate_email",
            Action::SendEmail { .. } => "send_email",
            Action::UpdateSearchCriteria { .. } => "update_search_criteria",
            Action::UpdateGoals { .. } => "update_goals",
            Action::RecordLearning { .. } => "record_learning",
        }
    }

    /// Actions worth retrying on transient collaborator failure.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            Action::SendEmail { .. } | Action::PushToCrm { .. } | Action::EnrichLeads { .. }
        )
    }

    /// One-line description for queue previews and cycle summaries.
    pub fn preview(&self) -> String {
        match self {
            Action::SearchLeads { criteria } => match criteria {
                Some(c) if !c.titles.is_empty() => {
                    format!("Rechercher des leads ({})", c.titles.join(", "))
                }
                _ => "Rechercher des leads (criteres actuels)".to_string(),
            },
            Action::EnrichLeads { contacts, emails } => {
                format!("Enrichir {} contact(s)", contacts.len() + emails.len())
            }
            Action::PushToCrm { contacts } => {
                format!("Pousser {} contact(s) vers le CRM", contacts.len())
            }
            Action::GenerateEmail { contact, .. } => format!(
                "Rediger un email pour {}",
                contact.email.as_deref().or(contact.nom.as_deref()).unwrap_or("?")
            ),
            Action::SendEmail { to, subject, .. } => match subject {
                Some(s) => format!("Envoyer \"{}\" a {}", s, to),
                None => format!("Envoyer un email a {}", to),
            },
            Action::UpdateSearchCriteria { .. } => "Modifier les criteres de recherche".to_string(),
            Action::UpdateGoals { .. } => "Modifier les objectifs hebdo".to_string(),
            Action::RecordLearning { category, .. } => {
                format!("Noter un apprentissage ({})", category.as_str())
            }
        }
    }
}

/// Outcome of one action execution. Failures are values, never panics.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub error: Option<String>,
    pub summary: Option<String>,
    pub data: Option<Value>,
    /// The collaborator reported the work was already done; treated as
    /// success by the retry loop.
    pub deduplicated: bool,
}

impl ExecutionOutcome {
    pub fn ok(summary: impl Into<String>) -> Self {
        Self { success: true, summary: Some(summary.into()), ..Default::default() }
    }

    pub fn ok_with_data(summary: impl Into<String>, data: Value) -> Self {
        Self { success: true, summary: Some(summary.into()), data: Some(data), ..Default::default() }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self { success: false, error: Some(error.into()), ..Default::default() }
    }

    /// Error returned for a plan action whose type is not in the vocabulary.
    pub fn unknown_type(type_name: &str) -> Self {
        Self::fail(format!("Action type inconnu: {}", type_name))
    }

    pub fn is_settled(&self) -> bool {
        self.success || self.deduplicated
    }
}

/// Control actions the conversational handler may execute. This whitelist is
/// the entire surface through which chat can reconfigure the pilot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlAction {
    UpdateGoals { params: GoalsUpdate },
    UpdateCriteria { params: CriteriaUpdate },
    UpdateEmailPrefs { params: Value },
    UpdateBusiness { params: Value },
    UpdateOffer { params: Value },
    UpdateAutonomy { params: Value },
    Pause,
    Resume,
    ForceBrainCycle,
    RunDiagnostic,
}

impl ControlAction {
    pub fn type_name(&self) -> &'static str {
        match self {
            ControlAction::UpdateGoals { .. } => "update_goals",
            ControlAction::UpdateCriteria { .. } => "update_criteria",
            ControlAction::UpdateEmailPrefs { .. } => "update_email_prefs",
            ControlAction::UpdateBusiness { .. } => "update_business",
            ControlAction::UpdateOffer { .. } => "update_offer",
            ControlAction::UpdateAutonomy { .. } => "update_autonomy",
            ControlAction::Pause => "pause",
            ControlAction::Resume => "resume",
            ControlAction::ForceBrainCycle => "force_brain_cycle",
            ControlAction::RunDiagnostic => "run_diagnostic",
        }
    }
}

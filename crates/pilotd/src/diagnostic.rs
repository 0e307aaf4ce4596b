//! Diagnostic checker - a fixed battery of independent health checks.
//!
//! Each check is a pure function over a `DiagnosticContext` gathered up
//! front; checks inspect state, never mutate it, and never call out to the
//! network themselves. After a run the findings are merged into the store's
//! open set: duplicates (by message) are kept once, and open items the run
//! no longer reproduces resolve themselves.

use crate::services::{CreditBalance, Services};
use chrono::{DateTime, Utc};
use pilot_common::config::api_keys;
use pilot_common::state::{
    DiagnosticItem, DiagnosticKind, DiagnosticPriority, Progress, WeeklyGoals,
};
use pilot_common::store::PilotStore;
use pilot_common::LeadStore;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Remaining lead-search credits below which the checker warns.
const LOW_CREDIT_THRESHOLD: u64 = 10;
/// Daily API budget utilization above which the checker warns.
const BUDGET_WARN_UTILIZATION: f64 = 0.90;
/// Days without a single found lead before the pipeline counts as stale.
const STALE_LEAD_DAYS: i64 = 3;
/// Open-rate floor, applied once at least this many emails went out.
const LOW_OPEN_RATE: f32 = 0.15;
const LOW_OPEN_RATE_MIN_SENDS: usize = 10;

/// Everything the checks look at, gathered once per run.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticContext {
    pub email_domain_configured: bool,
    pub reasoning_key: bool,
    pub lead_search_key: bool,
    pub crm_key: bool,
    pub email_key: bool,
    pub enrichment_key: bool,
    pub credits: Option<CreditBalance>,
    pub api_calls_today: u64,
    pub daily_api_budget: u64,
    pub last_lead_found_at: Option<DateTime<Utc>>,
    pub open_rate: Option<f32>,
    pub emails_sent_total: usize,
    pub progress: Progress,
    pub goals: WeeklyGoals,
    pub business_context_defined: bool,
    pub now: DateTime<Utc>,
}

fn owner(priority: DiagnosticPriority, category: &str, message: String, suggestion: &str) -> DiagnosticItem {
    DiagnosticItem::new(
        DiagnosticKind::OwnerAction,
        priority,
        category,
        message,
        Some(suggestion.to_string()),
    )
}

fn fixable(priority: DiagnosticPriority, category: &str, message: String, suggestion: &str) -> DiagnosticItem {
    DiagnosticItem::new(
        DiagnosticKind::BotFixable,
        priority,
        category,
        message,
        Some(suggestion.to_string()),
    )
}

pub fn check_sending_domain(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    if ctx.email_domain_configured {
        return None;
    }
    Some(owner(
        DiagnosticPriority::Critical,
        "email",
        "Domaine d'envoi non configure".to_string(),
        "Verifier le domaine sur Resend et renseigner RESEND_DOMAIN",
    ))
}

pub fn check_search_credits(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    let credits = ctx.credits?;
    let remaining = credits.remaining();
    if remaining == 0 {
        return Some(owner(
            DiagnosticPriority::Critical,
            "credits",
            format!("Credits Apollo epuises ({}/{})", credits.used, credits.limit),
            "Recharger les credits ou attendre le renouvellement",
        ));
    }
    if remaining < LOW_CREDIT_THRESHOLD {
        return Some(owner(
            DiagnosticPriority::Warning,
            "credits",
            format!("Credits Apollo presque epuises: {} restants", remaining),
            "Prevoir une recharge avant la prochaine recherche",
        ));
    }
    None
}

pub fn check_api_budget(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    if ctx.daily_api_budget == 0 {
        return None;
    }
    let utilization = ctx.api_calls_today as f64 / ctx.daily_api_budget as f64;
    if utilization < BUDGET_WARN_UTILIZATION {
        return None;
    }
    Some(fixable(
        DiagnosticPriority::Warning,
        "budget",
        format!(
            "Budget API quotidien utilise a {}% ({}/{})",
            (utilization * 100.0).round() as u64,
            ctx.api_calls_today,
            ctx.daily_api_budget
        ),
        "Les cycles restants du jour seront reduits",
    ))
}

/// One item per missing key: the reasoning key is critical, collaborator
/// keys degrade single skills.
pub fn check_api_keys(ctx: &DiagnosticContext) -> Vec<DiagnosticItem> {
    let mut items = Vec::new();
    if !ctx.reasoning_key {
        items.push(owner(
            DiagnosticPriority::Critical,
            "config",
            format!("Cle API manquante: {}", api_keys::REASONING),
            "Sans cle de raisonnement, seuls les plans de secours tournent",
        ));
    }
    let optional = [
        (ctx.lead_search_key, api_keys::LEAD_SEARCH, "recherche de leads"),
        (ctx.crm_key, api_keys::CRM, "synchronisation CRM"),
        (ctx.email_key, api_keys::EMAIL, "envoi d'emails"),
        (ctx.enrichment_key, api_keys::ENRICHMENT, "enrichissement"),
    ];
    for (present, key, skill) in optional {
        if !present {
            items.push(owner(
                DiagnosticPriority::Warning,
                "config",
                format!("Cle API manquante: {} ({} desactivee)", key, skill),
                "Renseigner la cle pour reactiver cette competence",
            ));
        }
    }
    items
}

pub fn check_stale_leads(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    let last = ctx.last_lead_found_at?;
    let days = (ctx.now - last).num_days();
    if days < STALE_LEAD_DAYS {
        return None;
    }
    Some(fixable(
        DiagnosticPriority::Warning,
        "prospection",
        format!("Aucun lead trouve depuis {} jours", days),
        "Elargir les criteres de recherche ou verifier les credits",
    ))
}

pub fn check_open_rate(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    let rate = ctx.open_rate?;
    if ctx.emails_sent_total < LOW_OPEN_RATE_MIN_SENDS || rate >= LOW_OPEN_RATE {
        return None;
    }
    Some(fixable(
        DiagnosticPriority::Warning,
        "emails",
        format!(
            "Taux d'ouverture faible: {}% sur {} envois",
            (rate * 100.0).round() as u32,
            ctx.emails_sent_total
        ),
        "Revoir les objets d'email et les horaires d'envoi",
    ))
}

/// With two days or less left in the week, a goal not yet half reached is
/// treated as unreachable.
pub fn check_weekly_goal(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    let days_in = ctx.progress.days_into_week(ctx.now);
    let days_left = (7 - days_in).max(0);
    if days_left > 2 {
        return None;
    }
    let leads_behind = ctx.progress.leads_found_this_week * 2 < ctx.goals.leads_to_find;
    let emails_behind = ctx.progress.emails_sent_this_week * 2 < ctx.goals.emails_to_send;
    if !leads_behind && !emails_behind {
        return None;
    }
    Some(fixable(
        DiagnosticPriority::Info,
        "objectifs",
        format!(
            "Objectif hebdo hors de portee a {} jour(s) de la fin ({}/{} leads, {}/{} emails)",
            days_left,
            ctx.progress.leads_found_this_week,
            ctx.goals.leads_to_find,
            ctx.progress.emails_sent_this_week,
            ctx.goals.emails_to_send
        ),
        "Ajuster l'objectif ou intensifier la prospection la semaine prochaine",
    ))
}

pub fn check_business_context(ctx: &DiagnosticContext) -> Option<DiagnosticItem> {
    if ctx.business_context_defined {
        return None;
    }
    Some(owner(
        DiagnosticPriority::Critical,
        "config",
        "Contexte business non defini".to_string(),
        "Decrire l'activite via pilotctl chat avant d'activer le pilote",
    ))
}

/// Run every check over a prepared context.
pub fn run_checks(ctx: &DiagnosticContext) -> Vec<DiagnosticItem> {
    let mut items = Vec::new();
    items.extend(check_sending_domain(ctx));
    items.extend(check_search_credits(ctx));
    items.extend(check_api_budget(ctx));
    items.extend(check_api_keys(ctx));
    items.extend(check_stale_leads(ctx));
    items.extend(check_open_rate(ctx));
    items.extend(check_weekly_goal(ctx));
    items.extend(check_business_context(ctx));
    items
}

/// Gathers context from the stores and collaborators, runs the battery and
/// persists the merged open set.
pub struct DiagnosticChecker {
    store: Arc<Mutex<PilotStore>>,
    leads: Arc<Mutex<LeadStore>>,
    services: Services,
    daily_api_budget: u64,
}

impl DiagnosticChecker {
    pub fn new(
        store: Arc<Mutex<PilotStore>>,
        leads: Arc<Mutex<LeadStore>>,
        services: Services,
        daily_api_budget: u64,
    ) -> Self {
        Self { store, leads, services, daily_api_budget }
    }

    async fn gather_context(&self) -> DiagnosticContext {
        // Credit lookup goes through the collaborator, everything else is
        // local state. A failed lookup just means no credit check this run.
        let credits = self.services.leads.credits().await.ok().flatten();

        let (progress, goals, api_calls_today, business_context_defined) = {
            let store = self.store.lock().unwrap();
            let state = store.state();
            (
                state.progress.clone(),
                state.goals.weekly.clone(),
                state.stats.api_calls_today,
                state.config.business_context.is_some(),
            )
        };

        let last_lead_found_at = self.leads.lock().unwrap().last_found_at();
        let sent = self.services.mailer.sent_emails();

        DiagnosticContext {
            email_domain_configured: api_keys::get(api_keys::EMAIL_DOMAIN).is_some(),
            reasoning_key: api_keys::get(api_keys::REASONING).is_some(),
            lead_search_key: api_keys::get(api_keys::LEAD_SEARCH).is_some(),
            crm_key: api_keys::get(api_keys::CRM).is_some(),
            email_key: api_keys::get(api_keys::EMAIL).is_some(),
            enrichment_key: api_keys::get(api_keys::ENRICHMENT).is_some(),
            credits,
            api_calls_today,
            daily_api_budget: self.daily_api_budget,
            last_lead_found_at,
            open_rate: self.services.mailer.open_rate(),
            emails_sent_total: sent.len(),
            progress,
            goals,
            business_context_defined,
            now: Utc::now(),
        }
    }

    /// Full run: gather, check, merge, persist. Returns the open items.
    pub async fn run_full(&self) -> Vec<DiagnosticItem> {
        let ctx = self.gather_context().await;
        let found = run_checks(&ctx);
        info!("Diagnostic run: {} finding(s)", found.len());

        let mut store = self.store.lock().unwrap();
        store.merge_diagnostics(found);
        store.state().open_diagnostics().into_iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy_context() -> DiagnosticContext {
        DiagnosticContext {
            email_domain_configured: true,
            reasoning_key: true,
            lead_search_key: true,
            crm_key: true,
            email_key: true,
            enrichment_key: true,
            credits: Some(CreditBalance { used: 10, limit: 100 }),
            api_calls_today: 50,
            daily_api_budget: 500,
            last_lead_found_at: Some(Utc::now()),
            open_rate: Some(0.35),
            emails_sent_total: 40,
            progress: Progress {
                week_start: Some(Utc::now()),
                leads_found_this_week: 10,
                emails_sent_this_week: 8,
                ..Default::default()
            },
            goals: WeeklyGoals::default(),
            business_context_defined: true,
            now: Utc::now(),
        }
    }

    #[test]
    fn test_healthy_context_is_clean() {
        assert!(run_checks(&healthy_context()).is_empty());
    }

    #[test]
    fn test_credit_thresholds() {
        let mut ctx = healthy_context();

        ctx.credits = Some(CreditBalance { used: 100, limit: 100 });
        let item = check_search_credits(&ctx).unwrap();
        assert_eq!(item.priority, DiagnosticPriority::Critical);
        assert!(item.message.contains("epuises"));

        ctx.credits = Some(CreditBalance { used: 95, limit: 100 });
        let item = check_search_credits(&ctx).unwrap();
        assert_eq!(item.priority, DiagnosticPriority::Warning);

        ctx.credits = Some(CreditBalance { used: 10, limit: 100 });
        assert!(check_search_credits(&ctx).is_none());
    }

    #[test]
    fn test_budget_utilization() {
        let mut ctx = healthy_context();
        ctx.api_calls_today = 449;
        assert!(check_api_budget(&ctx).is_none());

        ctx.api_calls_today = 450;
        let item = check_api_budget(&ctx).unwrap();
        assert!(item.message.contains("90%"));
    }

    #[test]
    fn test_missing_keys_produce_one_item_each() {
        let mut ctx = healthy_context();
        ctx.reasoning_key = false;
        ctx.crm_key = false;

        let items = check_api_keys(&ctx);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].priority, DiagnosticPriority::Critical);
        assert_eq!(items[1].priority, DiagnosticPriority::Warning);
    }

    #[test]
    fn test_stale_leads() {
        let mut ctx = healthy_context();
        ctx.last_lead_found_at = Some(Utc::now() - chrono::Duration::days(4));
        let item = check_stale_leads(&ctx).unwrap();
        assert!(item.message.contains("4 jours"));

        ctx.last_lead_found_at = Some(Utc::now() - chrono::Duration::days(1));
        assert!(check_stale_leads(&ctx).is_none());

        // Empty lead store: nothing to report yet
        ctx.last_lead_found_at = None;
        assert!(check_stale_leads(&ctx).is_none());
    }

    #[test]
    fn test_open_rate_needs_enough_sends() {
        let mut ctx = healthy_context();
        ctx.open_rate = Some(0.05);
        ctx.emails_sent_total = 5;
        assert!(check_open_rate(&ctx).is_none());

        ctx.emails_sent_total = 12;
        let item = check_open_rate(&ctx).unwrap();
        assert!(item.message.contains("12 envois"));
    }

    #[test]
    fn test_weekly_goal_only_fires_late_in_week() {
        let mut ctx = healthy_context();
        ctx.progress.leads_found_this_week = 2;
        ctx.progress.emails_sent_this_week = 1;

        // Early week: quiet
        ctx.progress.week_start = Some(ctx.now - chrono::Duration::days(1));
        assert!(check_weekly_goal(&ctx).is_none());

        // Two days left and below half: fires
        ctx.progress.week_start = Some(ctx.now - chrono::Duration::days(5));
        assert!(check_weekly_goal(&ctx).is_some());

        // On track: quiet even late
        ctx.progress.leads_found_this_week = 18;
        ctx.progress.emails_sent_this_week = 14;
        assert!(check_weekly_goal(&ctx).is_none());
    }

    #[test]
    fn test_business_context_check() {
        let mut ctx = healthy_context();
        ctx.business_context_defined = false;
        let item = check_business_context(&ctx).unwrap();
        assert_eq!(item.priority, DiagnosticPriority::Critical);
    }
}

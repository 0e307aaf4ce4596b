//! Prompt building for the brain cycle.
//!
//! The system prompt carries identity, business context, style rules and
//! the action catalog; the user prompt carries the state snapshot. Both are
//! plain strings - the reply comes back through the tolerant plan parser.

use crate::executor::render_style_rules;
use crate::services::{Article, MarketSignal, Trend};
use pilot_common::state::{ActionHistoryEntry, DiagnosticItem, PilotState};

/// Everything the brain shows the reasoning service about the current
/// situation, gathered at the start of the cycle.
#[derive(Debug, Clone, Default)]
pub struct StateSnapshot {
    pub lead_total: usize,
    pub recent_leads: usize,
    pub open_rate: Option<f32>,
    pub active_campaigns: usize,
    pub enrichment_credits: Option<u64>,
    pub hot_leads: Vec<String>,
    pub articles: Vec<Article>,
    pub trends: Vec<Trend>,
    pub market_signals: Vec<MarketSignal>,
    pub competitive_digest: Option<String>,
    pub improvement_analysis: Option<String>,
    pub improvement_recommendations: Vec<String>,
    pub api_calls_today: u64,
    pub daily_api_budget: u64,
}

/// The action catalog the reasoning service may draw from, with parameter
/// shapes. Kept in one place so the contract only changes deliberately.
const ACTION_CATALOG: &str = r#"Actions disponibles (champ "type", flag "auto_execute" pour execution immediate):
- search_leads {criteria?: {titles[], locations[], industries[], seniorities[], keywords?, company_size[], limit?}}
- enrich_leads {contacts?: [{nom, entreprise, email?}], emails?: [string]}
- push_to_crm {contacts: [{nom, entreprise, email, titre?}]}
- generate_email {contact: {nom?, entreprise?, email?, titre?}, instructions?: string}
- send_email {to: string, subject?: string, body?: string, generate_first?: bool, research_first?: bool}
- update_search_criteria {updates: {titles?, locations?, seniorities?, industries?, keywords?, company_size?, limit?}}
- update_goals {updates: {leads_to_find?, emails_to_send?, responses_target?, rdv_target?, min_open_rate?, min_lead_score?, push_to_crm_above_score?}}
- record_learning {category: "best_search_criteria"|"best_email_styles"|"best_send_times", summary: string, data?: object}"#;

const PLAN_SHAPE: &str = r#"Reponds UNIQUEMENT avec un objet JSON:
{
  "reasoning": "ton raisonnement",
  "actions": [{"type": "...", "auto_execute": true|false, ...params}],
  "experiments": [{"kind": "...", "description": "...", "hypothesis": "...", "variants": [], "metric": "..."}],
  "learnings": [{"category": "...", "summary": "...", "data": {}}],
  "diagnostic_items": [{"priority": "critical"|"warning"|"info", "category": "...", "message": "...", "suggestion": "..."}],
  "weekly_assessment": "ou en est la semaine"
}"#;

pub fn build_system_prompt(state: &PilotState) -> String {
    let config = &state.config;
    let mut sections = vec![
        "Tu es le pilote automatique commercial d'une petite entreprise. Tu decides des actions de prospection a mener sur ce cycle, avec prudence et sans spammer.".to_string(),
    ];

    if let Some(context) = &config.business_context {
        sections.push(format!("Activite: {}", context));
    }
    if let Some(pitch) = &config.offer.pitch {
        let mut offer = format!("Offre: {}", pitch);
        if let Some(pricing) = &config.offer.pricing {
            offer.push_str(&format!(" | Prix: {}", pricing));
        }
        if let Some(target) = &config.offer.target {
            offer.push_str(&format!(" | Cible: {}", target));
        }
        sections.push(offer);
    }
    sections.push(render_style_rules(&config.email_preferences));
    sections.push(format!("Niveau d'autonomie: {}", config.autonomy_level.as_str()));
    sections.push(ACTION_CATALOG.to_string());
    sections.push(PLAN_SHAPE.to_string());
    sections.join("\n\n")
}

fn render_diagnostics(diagnostics: &[&DiagnosticItem]) -> String {
    if diagnostics.is_empty() {
        return "aucun".to_string();
    }
    diagnostics
        .iter()
        .map(|d| format!("[{:?}] {}", d.priority, d.message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_actions(actions: &[ActionHistoryEntry]) -> String {
    if actions.is_empty() {
        return "aucune".to_string();
    }
    actions
        .iter()
        .map(|a| {
            let status = if a.result.success { "ok" } else { "echec" };
            format!("{} ({})", a.action.type_name(), status)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn build_cycle_prompt(state: &PilotState, snapshot: &StateSnapshot) -> String {
    let goals = &state.goals.weekly;
    let progress = &state.progress;
    let mut sections = Vec::new();

    sections.push(format!(
        "Progression de la semaine: {}/{} leads trouves, {}/{} emails envoyes, {}/{} reponses, {}/{} rdv.",
        progress.leads_found_this_week,
        goals.leads_to_find,
        progress.emails_sent_this_week,
        goals.emails_to_send,
        progress.responses_this_week,
        goals.responses_target,
        progress.rdv_this_week,
        goals.rdv_target
    ));

    sections.push(format!(
        "Criteres de recherche actifs: titres {:?}, lieux {:?}, industries {:?}.",
        state.goals.search_criteria.titles,
        state.goals.search_criteria.locations,
        state.goals.search_criteria.industries
    ));

    sections.push(format!("Diagnostics ouverts:\n{}", render_diagnostics(&state.open_diagnostics())));

    let recent: Vec<ActionHistoryEntry> = state.action_history.iter().take(10).cloned().collect();
    sections.push(format!("Dernieres actions: {}", render_actions(&recent)));

    let learnings: Vec<String> = state
        .learnings
        .best_email_styles
        .iter()
        .chain(state.learnings.best_search_criteria.iter())
        .chain(state.learnings.best_send_times.iter())
        .take(6)
        .map(|l| l.summary.clone())
        .collect();
    if !learnings.is_empty() {
        sections.push(format!("Apprentissages: {}", learnings.join(" | ")));
    }

    let experiments: Vec<String> =
        state.running_experiments().iter().map(|e| e.description.clone()).collect();
    if !experiments.is_empty() {
        sections.push(format!("Experiences en cours: {}", experiments.join(" | ")));
    }

    if state.patterns.sample_size > 0 {
        let best = &state.patterns.best;
        sections.push(format!(
            "Patterns de performance ({} envois analyses): meilleur titre {:?}, industrie {:?}, ville {:?}, style d'objet {:?}, heure {:?}.",
            state.patterns.sample_size,
            best.title,
            best.industry,
            best.city,
            best.subject_style,
            best.send_hour
        ));
    }

    // Cross-system digest
    let mut digest = vec![format!(
        "Leads en base: {} (dont {} recents)",
        snapshot.lead_total, snapshot.recent_leads
    )];
    if let Some(rate) = snapshot.open_rate {
        digest.push(format!("taux d'ouverture {}%", (rate * 100.0).round() as u32));
    }
    digest.push(format!("{} campagne(s) active(s)", snapshot.active_campaigns));
    if let Some(credits) = snapshot.enrichment_credits {
        digest.push(format!("{} credit(s) d'enrichissement", credits));
    }
    if !snapshot.hot_leads.is_empty() {
        digest.push(format!("leads chauds: {}", snapshot.hot_leads.join(", ")));
    }
    digest.push(format!(
        "budget API: {}/{} appels aujourd'hui",
        snapshot.api_calls_today, snapshot.daily_api_budget
    ));
    sections.push(format!("Etat des systemes: {}.", digest.join(", ")));

    if !snapshot.articles.is_empty() {
        let titles: Vec<String> =
            snapshot.articles.iter().take(5).map(|a| a.title.clone()).collect();
        sections.push(format!("Veille (articles pertinents): {}", titles.join(" | ")));
    }
    if !snapshot.trends.is_empty() {
        let trends: Vec<String> = snapshot
            .trends
            .iter()
            .take(5)
            .map(|t| format!("{} ({})", t.topic, t.mentions))
            .collect();
        sections.push(format!("Tendances: {}", trends.join(", ")));
    }
    if !snapshot.market_signals.is_empty() {
        let signals: Vec<String> = snapshot
            .market_signals
            .iter()
            .take(5)
            .map(|s| format!("{} - {} ({})", s.company, s.headline, s.kind))
            .collect();
        sections.push(format!("Signaux marche: {}", signals.join(" | ")));
    }
    if let Some(digest) = &snapshot.competitive_digest {
        sections.push(format!("Concurrence: {}", digest));
    }
    if let Some(analysis) = &snapshot.improvement_analysis {
        sections.push(format!("Derniere auto-analyse: {}", analysis));
    }
    if !snapshot.improvement_recommendations.is_empty() {
        sections.push(format!(
            "Recommandations en attente: {}",
            snapshot.improvement_recommendations.join(" | ")
        ));
    }

    sections.push("Decide du plan pour ce cycle.".to_string());
    sections.join("\n\n")
}

/// Prompt for the weekly analysis, sent to the higher-tier model.
pub fn build_weekly_analysis_prompt(state: &PilotState) -> String {
    let history: Vec<String> = state
        .learnings
        .weekly_performance
        .iter()
        .take(4)
        .map(|w| {
            format!(
                "{} leads / {} emails / {} reponses / {} rdv (objectifs {}/{}/{}/{})",
                w.progress.leads_found_this_week,
                w.progress.emails_sent_this_week,
                w.progress.responses_this_week,
                w.progress.rdv_this_week,
                w.goals.leads_to_find,
                w.goals.emails_to_send,
                w.goals.responses_target,
                w.goals.rdv_target
            )
        })
        .collect();

    let recent: Vec<ActionHistoryEntry> = state.action_history.iter().take(20).cloned().collect();

    format!(
        "Analyse la semaine ecoulee du pilote commercial.\n\nSemaines recentes (plus recente d'abord):\n{}\n\nDernieres actions: {}\n\nCriteres actuels: titres {:?}, industries {:?}, lieux {:?}.\n\nReponds UNIQUEMENT en JSON: {{\"analysis\": \"...\", \"criteria_updates\": {{...}}, \"goal_updates\": {{...}}, \"learnings\": [...], \"experiments\": [...]}}",
        history.join("\n"),
        render_actions(&recent),
        state.goals.search_criteria.titles,
        state.goals.search_criteria.industries,
        state.goals.search_criteria.locations,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_carries_context_and_catalog() {
        let mut state = PilotState::default();
        state.config.business_context = Some("Agence de design".to_string());
        state.config.offer.pitch = Some("Refonte de site en 3 semaines".to_string());

        let prompt = build_system_prompt(&state);
        assert!(prompt.contains("Agence de design"));
        assert!(prompt.contains("Refonte de site"));
        assert!(prompt.contains("search_leads"));
        assert!(prompt.contains("record_learning"));
        assert!(prompt.contains("Mots interdits"));
        assert!(prompt.contains("\"reasoning\""));
    }

    #[test]
    fn test_cycle_prompt_shows_progress_and_digest() {
        let mut state = PilotState::default();
        state.progress.leads_found_this_week = 4;
        state.goals.weekly.leads_to_find = 20;

        let snapshot = StateSnapshot {
            lead_total: 37,
            open_rate: Some(0.25),
            api_calls_today: 12,
            daily_api_budget: 500,
            ..Default::default()
        };
        let prompt = build_cycle_prompt(&state, &snapshot);
        assert!(prompt.contains("4/20 leads"));
        assert!(prompt.contains("Leads en base: 37"));
        assert!(prompt.contains("25%"));
        assert!(prompt.contains("12/500"));
    }
}

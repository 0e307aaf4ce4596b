//! Deterministic fallback plan.
//!
//! When the reasoning service is down or returns something unusable, the
//! pilot degrades to "keep doing the obviously useful thing" instead of
//! stalling: search if behind on leads, email the best unsent leads, plan
//! follow-ups for contacts gone quiet, push qualified leads to the CRM.
//! Pure function of current state, so the degraded behavior is fully
//! testable without any collaborator.

use crate::services::{FollowUpSequence, FollowUpStep, MailerStore};
use pilot_common::plan::{Plan, PlanAction};
use pilot_common::state::PilotState;
use pilot_common::LeadStore;

/// Per-cycle caps for the degraded mode.
const MAX_FALLBACK_EMAILS: usize = 5;
const MAX_FALLBACK_FOLLOW_UPS: usize = 10;
const MAX_FALLBACK_CRM_PUSHES: usize = 10;
/// Days of silence after a send before a follow-up sequence is planned.
const FOLLOW_UP_AFTER_DAYS: i64 = 3;
/// Cadence between follow-up steps.
const FOLLOW_UP_STEP_DAYS: u32 = 4;
const FOLLOW_UP_STEPS: usize = 3;

fn action(raw: serde_json::Value) -> PlanAction {
    PlanAction { raw }
}

/// Build the fallback plan plus the follow-up sequences to create. The
/// caller registers the sequences with the mailer after adopting the plan.
pub fn build_fallback_plan(
    state: &PilotState,
    leads: &LeadStore,
    mailer: &dyn MailerStore,
) -> (Plan, Vec<FollowUpSequence>) {
    let goals = &state.goals.weekly;
    let progress = &state.progress;
    let mut actions = Vec::new();

    // Behind on lead discovery: one search with the stored criteria
    if progress.leads_found_this_week < goals.leads_to_find {
        actions.push(action(serde_json::json!({
            "type": "search_leads",
            "auto_execute": true,
        })));
    }

    // Behind on sends: email the best qualifying leads, with fresh research
    // and a generated draft per contact
    if progress.emails_sent_this_week < goals.emails_to_send {
        let budget = (goals.emails_to_send - progress.emails_sent_this_week) as usize;
        for lead in leads.ready_to_email(goals.min_lead_score, budget.min(MAX_FALLBACK_EMAILS)) {
            if let Some(email) = &lead.email {
                actions.push(action(serde_json::json!({
                    "type": "send_email",
                    "to": email,
                    "generate_first": true,
                    "research_first": true,
                    "auto_execute": true,
                })));
            }
        }
    }

    // Contacts emailed days ago with no sequence yet: plan one
    let mut follow_ups = Vec::new();
    for lead in leads.emailed_before(FOLLOW_UP_AFTER_DAYS, MAX_FALLBACK_FOLLOW_UPS) {
        let Some(email) = &lead.email else { continue };
        if mailer.has_follow_up(email) {
            continue;
        }
        follow_ups.push(FollowUpSequence {
            contact_email: email.clone(),
            steps: (1..=FOLLOW_UP_STEPS)
                .map(|i| FollowUpStep {
                    day_offset: FOLLOW_UP_STEP_DAYS,
                    note: format!("Relance {} pour {}", i, lead.entreprise),
                })
                .collect(),
            created_at: chrono::Utc::now(),
        });
    }

    // Qualified leads never pushed: one CRM push action
    let to_push = leads.ready_to_push(goals.push_to_crm_above_score, MAX_FALLBACK_CRM_PUSHES);
    if !to_push.is_empty() {
        let contacts: Vec<serde_json::Value> = to_push
            .iter()
            .map(|l| {
                serde_json::json!({
                    "nom": l.nom,
                    "entreprise": l.entreprise,
                    "email": l.email,
                    "titre": l.titre,
                })
            })
            .collect();
        actions.push(action(serde_json::json!({
            "type": "push_to_crm",
            "contacts": contacts,
            "auto_execute": true,
        })));
    }

    let plan = Plan {
        reasoning: format!(
            "Plan de secours (service de raisonnement indisponible): {} action(s) evidentes, {} relance(s) planifiee(s)",
            actions.len(),
            follow_ups.len()
        ),
        actions,
        fallback: true,
        ..Default::default()
    };
    (plan, follow_ups)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryMailerStore;
    use chrono::Utc;
    use pilot_common::leads::Lead;
    use tempfile::TempDir;

    fn lead(email: &str, score: f32) -> Lead {
        Lead {
            nom: Some("Test".to_string()),
            entreprise: "Acme".to_string(),
            email: Some(email.to_string()),
            score,
            found_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    fn types(plan: &Plan) -> Vec<String> {
        plan.actions.iter().map(|a| a.type_name()).collect()
    }

    #[test]
    fn test_search_only_when_behind_lead_goal() {
        let temp = TempDir::new().unwrap();
        let leads = LeadStore::open(temp.path());
        let mailer = InMemoryMailerStore::default();

        let mut state = PilotState::default();
        state.goals.weekly.leads_to_find = 20;

        state.progress.leads_found_this_week = 5;
        let (plan, _) = build_fallback_plan(&state, &leads, &mailer);
        assert!(types(&plan).contains(&"search_leads".to_string()));
        assert!(plan.fallback);
        assert!(plan.reasoning.contains("secours"));

        state.progress.leads_found_this_week = 25;
        let (plan, _) = build_fallback_plan(&state, &leads, &mailer);
        assert!(!types(&plan).contains(&"search_leads".to_string()));
    }

    #[test]
    fn test_one_generated_email_per_qualifying_lead() {
        let temp = TempDir::new().unwrap();
        let mut leads = LeadStore::open(temp.path());
        leads.upsert(lead("a@b.com", 9.0));
        let mailer = InMemoryMailerStore::default();

        let mut state = PilotState::default();
        state.goals.weekly.min_lead_score = 7.0;
        state.goals.weekly.emails_to_send = 15;

        let (plan, _) = build_fallback_plan(&state, &leads, &mailer);
        let sends: Vec<&PlanAction> =
            plan.actions.iter().filter(|a| a.type_name() == "send_email").collect();
        assert_eq!(sends.len(), 1);
        let raw = &sends[0].raw;
        assert_eq!(raw["to"], "a@b.com");
        assert_eq!(raw["generate_first"], true);
        assert_eq!(raw["research_first"], true);
        assert!(raw.get("subject").is_none());
        assert!(raw.get("body").is_none());
        assert!(sends[0].auto_execute());
    }

    #[test]
    fn test_email_cap_and_goal_gate() {
        let temp = TempDir::new().unwrap();
        let mut leads = LeadStore::open(temp.path());
        for i in 0..8 {
            leads.upsert(lead(&format!("l{}@b.com", i), 9.0));
        }
        let mailer = InMemoryMailerStore::default();

        let mut state = PilotState::default();
        state.goals.weekly.emails_to_send = 15;

        let (plan, _) = build_fallback_plan(&state, &leads, &mailer);
        let sends = plan.actions.iter().filter(|a| a.type_name() == "send_email").count();
        assert_eq!(sends, MAX_FALLBACK_EMAILS);

        // Email goal already met: no sends at all
        state.progress.emails_sent_this_week = 15;
        let (plan, _) = build_fallback_plan(&state, &leads, &mailer);
        assert_eq!(plan.actions.iter().filter(|a| a.type_name() == "send_email").count(), 0);
    }

    #[test]
    fn test_follow_ups_for_quiet_contacts_without_sequence() {
        let temp = TempDir::new().unwrap();
        let mut leads = LeadStore::open(temp.path());
        let mut quiet = lead("quiet@b.com", 8.0);
        quiet.email_sent = true;
        quiet.email_sent_at = Some(Utc::now() - chrono::Duration::days(5));
        leads.upsert(quiet);

        let mut covered = lead("covered@b.com", 8.0);
        covered.email_sent = true;
        covered.email_sent_at = Some(Utc::now() - chrono::Duration::days(5));
        leads.upsert(covered);

        let mailer = InMemoryMailerStore::default();
        mailer.create_follow_up(FollowUpSequence {
            contact_email: "covered@b.com".to_string(),
            steps: vec![],
            created_at: Utc::now(),
        });

        let state = PilotState::default();
        let (_, follow_ups) = build_fallback_plan(&state, &leads, &mailer);
        assert_eq!(follow_ups.len(), 1);
        assert_eq!(follow_ups[0].contact_email, "quiet@b.com");
        assert_eq!(follow_ups[0].steps.len(), FOLLOW_UP_STEPS);
        assert!(follow_ups[0].steps.iter().all(|s| s.day_offset == FOLLOW_UP_STEP_DAYS));
    }

    #[test]
    fn test_crm_push_for_unpushed_qualified_leads() {
        let temp = TempDir::new().unwrap();
        let mut leads = LeadStore::open(temp.path());
        for i in 0..12 {
            leads.upsert(lead(&format!("l{}@b.com", i), 9.0));
        }
        let mut pushed = lead("done@b.com", 9.0);
        pushed.pushed_to_crm = true;
        leads.upsert(pushed);
        let mailer = InMemoryMailerStore::default();

        let mut state = PilotState::default();
        state.goals.weekly.push_to_crm_above_score = 8.0;

        let (plan, _) = build_fallback_plan(&state, &leads, &mailer);
        let push = plan.actions.iter().find(|a| a.type_name() == "push_to_crm").unwrap();
        let contacts = push.raw["contacts"].as_array().unwrap();
        assert_eq!(contacts.len(), MAX_FALLBACK_CRM_PUSHES);
        assert!(!contacts.iter().any(|c| c["email"] == "done@b.com"));
    }
}

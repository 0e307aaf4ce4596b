//! Conversational facade - free-form operator chat.
//!
//! Every message goes to the reasoning service with a fully rendered system
//! prompt; the reply is returned verbatim to the operator after stripping
//! an optional `<actions>[...]</actions>` block. Entries in that block are
//! validated against a ten-item whitelist of control actions and executed
//! independently - one failure becomes a visible note, never an abort, and
//! nothing outside the whitelist ever runs.

use crate::diagnostic::DiagnosticChecker;
use crate::executor::render_style_rules;
use crate::services::Services;
use pilot_common::actions::ControlAction;
use pilot_common::config::api_keys;
use pilot_common::llm::ReasoningService;
use pilot_common::plan::extract_actions_block;
use pilot_common::state::{AutonomyLevel, PilotState};
use pilot_common::store::PilotStore;
use pilot_common::LeadStore;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// At most this many control actions run per message.
pub const MAX_CHAT_ACTIONS: usize = 5;

const APOLOGY: &str =
    "Desole, je n'arrive pas a repondre pour le moment. Reessayez dans quelques minutes.";

#[derive(Debug, Clone, Default)]
pub struct HandlerReply {
    pub content: String,
    pub trigger_brain_cycle: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct EmailPrefsUpdate {
    max_lines: Option<u32>,
    language: Option<String>,
    tone: Option<String>,
    forbidden_words: Option<Vec<String>>,
    hook_style: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OfferUpdate {
    pitch: Option<String>,
    pricing: Option<String>,
    target: Option<String>,
}

pub struct AutonomousHandler {
    store: Arc<Mutex<PilotStore>>,
    leads: Arc<Mutex<LeadStore>>,
    reasoning: Arc<dyn ReasoningService>,
    checker: Arc<DiagnosticChecker>,
}

impl AutonomousHandler {
    pub fn new(
        store: Arc<Mutex<PilotStore>>,
        leads: Arc<Mutex<LeadStore>>,
        services: Services,
        checker: Arc<DiagnosticChecker>,
    ) -> Self {
        Self { store, leads, reasoning: services.reasoning, checker }
    }

    pub async fn handle_message(&self, text: &str, _channel_id: &str) -> HandlerReply {
        let system = {
            let store = self.store.lock().unwrap();
            let lead_total = self.leads.lock().unwrap().len();
            render_system_prompt(store.state(), lead_total)
        };

        self.store.lock().unwrap().record_api_call();
        let raw = match self.reasoning.complete(&system, text, 1500).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Chat reasoning call failed: {}", e);
                return HandlerReply { content: APOLOGY.to_string(), trigger_brain_cycle: false };
            }
        };

        let (mut content, entries) = extract_actions_block(&raw);
        let mut reply = HandlerReply::default();
        let mut notes = Vec::new();

        let actions = validate_entries(&entries);
        let dropped = entries.len() - actions.len();
        if dropped > 0 {
            warn!("Dropped {} invalid chat action(s)", dropped);
        }
        if actions.len() > MAX_CHAT_ACTIONS {
            warn!("Chat proposed {} actions, keeping {}", actions.len(), MAX_CHAT_ACTIONS);
            notes.push(format!(
                "Seules les {} premieres actions ont ete appliquees.",
                MAX_CHAT_ACTIONS
            ));
        }

        for action in actions.into_iter().take(MAX_CHAT_ACTIONS) {
            info!("Chat control action: {}", action.type_name());
            if let Err(note) = self.apply(&action, &mut reply).await {
                notes.push(format!("Action {} non appliquee: {}", action.type_name(), note));
            }
        }

        if !notes.is_empty() {
            content.push_str("\n\n");
            content.push_str(&notes.join("\n"));
        }
        reply.content = content;
        reply
    }

    async fn apply(&self, action: &ControlAction, reply: &mut HandlerReply) -> Result<(), String> {
        match action {
            ControlAction::UpdateGoals { params } => {
                if self.store.lock().unwrap().update_weekly_goals(params) {
                    Ok(())
                } else {
                    Err("aucun champ reconnu".to_string())
                }
            }
            ControlAction::UpdateCriteria { params } => {
                if self.store.lock().unwrap().update_search_criteria(params) {
                    Ok(())
                } else {
                    Err("aucun champ reconnu".to_string())
                }
            }
            ControlAction::UpdateEmailPrefs { params } => {
                let update: EmailPrefsUpdate =
                    serde_json::from_value(params.clone()).map_err(|e| e.to_string())?;
                self.store.lock().unwrap().update_config(|config| {
                    let prefs = &mut config.email_preferences;
                    if let Some(v) = update.max_lines {
                        prefs.max_lines = v;
                    }
                    if let Some(v) = update.language {
                        prefs.language = v;
                    }
                    if let Some(v) = update.tone {
                        prefs.tone = v;
                    }
                    if let Some(v) = update.forbidden_words {
                        if !v.is_empty() {
                            prefs.forbidden_words = v;
                        }
                    }
                    if let Some(v) = update.hook_style {
                        prefs.hook_style = v;
                    }
                });
                Ok(())
            }
            ControlAction::UpdateBusiness { params } => {
                let context = params
                    .get("context")
                    .or_else(|| params.get("business_context"))
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "champ context manquant".to_string())?;
                let context = context.to_string();
                self.store
                    .lock()
                    .unwrap()
                    .update_config(|config| config.business_context = Some(context));
                Ok(())
            }
            ControlAction::UpdateOffer { params } => {
                let update: OfferUpdate =
                    serde_json::from_value(params.clone()).map_err(|e| e.to_string())?;
                self.store.lock().unwrap().update_config(|config| {
                    if update.pitch.is_some() {
                        config.offer.pitch = update.pitch;
                    }
                    if update.pricing.is_some() {
                        config.offer.pricing = update.pricing;
                    }
                    if update.target.is_some() {
                        config.offer.target = update.target;
                    }
                });
                Ok(())
            }
            ControlAction::UpdateAutonomy { params } => {
                let level = params
                    .get("level")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "champ level manquant".to_string())?;
                let level = match level {
                    "full" => AutonomyLevel::Full,
                    "semi" => AutonomyLevel::Semi,
                    "manual" => AutonomyLevel::Manual,
                    other => return Err(format!("niveau inconnu: {}", other)),
                };
                self.store.lock().unwrap().update_config(|config| config.autonomy_level = level);
                Ok(())
            }
            ControlAction::Pause => {
                self.store.lock().unwrap().set_enabled(false);
                Ok(())
            }
            ControlAction::Resume => {
                self.store.lock().unwrap().set_enabled(true);
                Ok(())
            }
            ControlAction::ForceBrainCycle => {
                reply.trigger_brain_cycle = true;
                Ok(())
            }
            ControlAction::RunDiagnostic => {
                let open = self.checker.run_full().await;
                info!("Diagnostic run from chat: {} open item(s)", open.len());
                Ok(())
            }
        }
    }
}

/// Keep only whitelisted, well-formed entries: an object with a recognized
/// `type` and, when present, object-shaped `params`.
fn validate_entries(entries: &[Value]) -> Vec<ControlAction> {
    entries
        .iter()
        .filter_map(|entry| {
            if !entry.is_object() {
                warn!("Dropping non-object chat action");
                return None;
            }
            if let Some(params) = entry.get("params") {
                if !params.is_object() {
                    warn!("Dropping chat action with non-object params");
                    return None;
                }
            }
            match serde_json::from_value::<ControlAction>(entry.clone()) {
                Ok(action) => Some(action),
                Err(_) => {
                    let type_name =
                        entry.get("type").and_then(|t| t.as_str()).unwrap_or("?");
                    warn!("Dropping non-whitelisted chat action: {}", type_name);
                    None
                }
            }
        })
        .collect()
}

fn render_system_prompt(state: &PilotState, lead_total: usize) -> String {
    let config = &state.config;
    let goals = &state.goals;
    let mut sections = vec![
        "Tu es l'assistant de pilotage commercial. Reponds a l'operateur en francais, de facon courte et concrete.".to_string(),
    ];

    match &config.business_context {
        Some(context) => sections.push(format!("Activite: {}", context)),
        None => sections.push("Activite: PAS ENCORE DEFINIE - propose a l'operateur de la decrire.".to_string()),
    }
    if let Some(pitch) = &config.offer.pitch {
        sections.push(format!("Offre: {}", pitch));
    }
    sections.push(render_style_rules(&config.email_preferences));

    let integrations = [
        (api_keys::LEAD_SEARCH, "recherche"),
        (api_keys::CRM, "crm"),
        (api_keys::EMAIL, "emails"),
        (api_keys::ENRICHMENT, "enrichissement"),
    ]
    .iter()
    .map(|(key, label)| {
        format!("{}: {}", label, if api_keys::get(key).is_some() { "ok" } else { "absente" })
    })
    .collect::<Vec<_>>()
    .join(", ");
    sections.push(format!(
        "Etat: pilote {}, autonomie {}, integrations [{}], {} leads en base.",
        state.lifecycle().as_str(),
        config.autonomy_level.as_str(),
        integrations,
        lead_total
    ));

    sections.push(format!(
        "Semaine: {}/{} leads, {}/{} emails. Criteres: titres {:?}, industries {:?}.",
        state.progress.leads_found_this_week,
        goals.weekly.leads_to_find,
        state.progress.emails_sent_this_week,
        goals.weekly.emails_to_send,
        goals.search_criteria.titles,
        goals.search_criteria.industries
    ));

    let open = state.open_diagnostics();
    if !open.is_empty() {
        let lines: Vec<String> = open.iter().take(5).map(|d| d.message.clone()).collect();
        sections.push(format!("Problemes ouverts: {}", lines.join(" | ")));
    }
    let pending = state.pending_confirmations();
    if pending > 0 {
        sections.push(format!("{} action(s) en attente de confirmation.", pending));
    }
    let recent: Vec<String> =
        state.action_history.iter().take(5).map(|a| a.action.type_name().to_string()).collect();
    if !recent.is_empty() {
        sections.push(format!("Dernieres actions: {}", recent.join(", ")));
    }
    let experiments: Vec<String> =
        state.running_experiments().iter().map(|e| e.description.clone()).collect();
    if !experiments.is_empty() {
        sections.push(format!("Experiences en cours: {}", experiments.join(" | ")));
    }
    let learnings: Vec<String> = state
        .learnings
        .best_email_styles
        .iter()
        .chain(state.learnings.best_send_times.iter())
        .take(3)
        .map(|l| l.summary.clone())
        .collect();
    if !learnings.is_empty() {
        sections.push(format!("Apprentissages: {}", learnings.join(" | ")));
    }

    sections.push(
        r#"Si l'operateur demande un changement, ajoute en fin de reponse un bloc:
<actions>[{"type": "...", "params": {...}}]</actions>
Types autorises: update_goals, update_criteria, update_email_prefs, update_business, update_offer, update_autonomy, pause, resume, force_brain_cycle, run_diagnostic. Rien d'autre."#
            .to_string(),
    );
    sections.join("\n\n")
}

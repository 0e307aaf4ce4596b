//! Brain engine - the pilot's decision loop.
//!
//! Three cycle kinds on independent schedules: the full brain cycle
//! (reasoning service + action execution), the light cycle (free
//! heuristics) and the weekly reset+learn. Cycles read state fresh at the
//! start of each run and only ever make additive, idempotent updates, so an
//! overlapping or failed run is harmless; the scheduler catches and logs
//! anything a cycle throws and just waits for the next tick.

pub mod criteria;
pub mod fallback;
pub mod light;
pub mod patterns;
pub mod prompt;
pub mod weekly;

use crate::diagnostic::DiagnosticChecker;
use crate::executor::ActionExecutor;
use crate::services::{Services, WatchKind};
use pilot_common::metrics::PilotMetrics;
use pilot_common::plan::{parse_plan, Plan};
use pilot_common::state::{
    DiagnosticItem, DiagnosticKind, DiagnosticPriority, Experiment, ExperimentStatus, Learning,
    LearningCategory, PilotState,
};
use pilot_common::store::PilotStore;
use pilot_common::{AutonomyLevel, LeadStore};
use prompt::StateSnapshot;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Hard cap on actions per brain cycle, whatever the plan says.
pub const MAX_ACTIONS_PER_CYCLE: usize = 10;
/// Cap on new CRM-derived monitoring watches per cycle.
const MAX_NEW_CRM_WATCHES: usize = 10;
/// Repeated opens before a recipient counts as a hot lead.
const HOT_LEAD_MIN_OPENS: u32 = 3;
/// Relevance floor for articles surfaced to the reasoning service.
const ARTICLE_MIN_RELEVANCE: f32 = 0.7;

/// What one brain cycle did, for logs and tests.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub fallback: bool,
    pub planned: usize,
    pub truncated: usize,
    pub executed: usize,
    pub failed: usize,
    pub queued: usize,
    pub dropped: usize,
}

pub struct BrainEngine {
    store: Arc<Mutex<PilotStore>>,
    leads: Arc<Mutex<LeadStore>>,
    services: Services,
    executor: Arc<ActionExecutor>,
    checker: Arc<DiagnosticChecker>,
    metrics: Arc<PilotMetrics>,
    daily_api_budget: u64,
}

impl BrainEngine {
    pub fn new(
        store: Arc<Mutex<PilotStore>>,
        leads: Arc<Mutex<LeadStore>>,
        services: Services,
        executor: Arc<ActionExecutor>,
        checker: Arc<DiagnosticChecker>,
        metrics: Arc<PilotMetrics>,
        daily_api_budget: u64,
    ) -> Self {
        Self { store, leads, services, executor, checker, metrics, daily_api_budget }
    }

    pub(crate) fn store(&self) -> &Arc<Mutex<PilotStore>> {
        &self.store
    }

    pub(crate) fn leads(&self) -> &Arc<Mutex<LeadStore>> {
        &self.leads
    }

    pub(crate) fn services(&self) -> &Services {
        &self.services
    }

    pub(crate) fn executor(&self) -> &ActionExecutor {
        &self.executor
    }

    pub(crate) fn metrics(&self) -> &PilotMetrics {
        &self.metrics
    }

    /// Channel the operator reads.
    pub(crate) fn admin_channel(&self) -> String {
        self.store
            .lock()
            .unwrap()
            .state()
            .config
            .admin_channel_id
            .clone()
            .unwrap_or_else(|| "operator".to_string())
    }

    // ------------------------------------------------------------------
    // Brain cycle
    // ------------------------------------------------------------------

    pub async fn run_brain_cycle(&self) -> anyhow::Result<CycleReport> {
        info!("Brain cycle starting");
        PilotMetrics::incr(&self.metrics.brain_cycles);

        // 1. Snapshot the state as it stands - this cycle reasons over the
        // previous run's diagnostics, the checker below feeds the next one.
        let state_at_start = self.store.lock().unwrap().state().clone();
        let snapshot = self.collect_snapshot(&state_at_start).await;

        // 2. Refresh diagnostics for the next cycle.
        self.checker.run_full().await;

        // 3-4. Ask for a plan; degrade to the deterministic fallback when
        // the service or its output is unusable.
        let mut plan = self.obtain_plan(&state_at_start, &snapshot).await;

        // 5. Safety cap.
        let mut report = CycleReport {
            fallback: plan.fallback,
            planned: plan.actions.len(),
            ..Default::default()
        };
        if plan.actions.len() > MAX_ACTIONS_PER_CYCLE {
            warn!(
                "Plan proposed {} actions, truncating to {}",
                plan.actions.len(),
                MAX_ACTIONS_PER_CYCLE
            );
            report.truncated = plan.actions.len() - MAX_ACTIONS_PER_CYCLE;
            plan.actions.truncate(MAX_ACTIONS_PER_CYCLE);
        }

        // 6. Execute or queue.
        let autonomy = state_at_start.config.autonomy_level;
        let channel = self.admin_channel();
        let mut executed_summaries = Vec::new();
        for plan_action in &plan.actions {
            let action = match plan_action.parse() {
                Ok(action) => action,
                Err(type_name) => {
                    warn!("Dropping plan action with unusable type/params: {}", type_name);
                    report.dropped += 1;
                    continue;
                }
            };

            let auto = plan_action.auto_execute() && autonomy != AutonomyLevel::Manual;
            if auto {
                let (outcome, attempts) = self.executor.execute_with_retry(&action).await;
                if outcome.is_settled() {
                    report.executed += 1;
                    PilotMetrics::incr(&self.metrics.actions_executed);
                    executed_summaries.push(format!(
                        "- {}",
                        outcome.summary.clone().unwrap_or_else(|| action.type_name().to_string())
                    ));
                } else {
                    report.failed += 1;
                    PilotMetrics::incr(&self.metrics.actions_failed);
                }
                self.store.lock().unwrap().record_action(action, true, attempts, outcome);
            } else {
                let preview = action.preview();
                let id = self.store.lock().unwrap().add_to_queue(action);
                self.services
                    .notifier
                    .send_confirmation(&channel, &format!("Confirmer: {}", preview), &id)
                    .await;
                report.queued += 1;
            }
        }

        // 7. Experiments, learnings and diagnostics proposed by the plan.
        self.persist_plan_outputs(&plan);

        // 8. Pattern mining, then criteria auto-tuning under full autonomy.
        let mined = patterns::analyze_patterns(&self.services.mailer.sent_emails(), |email| {
            self.services.enrichment.classification_for(email)
        });
        if let Some(mined) = mined {
            let mut store = self.store.lock().unwrap();
            if autonomy == AutonomyLevel::Full {
                let planned =
                    criteria::plan_adjustments(&mined, &store.state().goals.search_criteria);
                criteria::apply_adjustments(&mut store, &planned);
            }
            store.save_patterns(mined);
        }

        // 9. Keep monitoring aligned with what we sell to and chase.
        self.sync_watches().await;

        // 10. Operator summary, only when the cycle had anything to say.
        if !plan.actions.is_empty() {
            let summary = render_cycle_summary(&plan, &report, &executed_summaries);
            self.services.notifier.send_message(&channel, &summary).await;
            PilotMetrics::incr(&self.metrics.notifications_sent);
        }

        self.store.lock().unwrap().record_brain_cycle(plan.fallback);
        info!(
            "Brain cycle done: {} executed, {} queued, {} failed{}",
            report.executed,
            report.queued,
            report.failed,
            if plan.fallback { " (fallback plan)" } else { "" }
        );
        Ok(report)
    }

    async fn obtain_plan(&self, state: &PilotState, snapshot: &StateSnapshot) -> Plan {
        let system = prompt::build_system_prompt(state);
        let user = prompt::build_cycle_prompt(state, snapshot);

        PilotMetrics::incr(&self.metrics.reasoning_calls);
        self.store.lock().unwrap().record_api_call();

        let raw = match self.services.reasoning.complete(&system, &user, 4000).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Reasoning service unavailable, using fallback plan: {}", e);
                PilotMetrics::incr(&self.metrics.reasoning_failures);
                return self.fallback_plan(state);
            }
        };

        match parse_plan(&raw) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Unusable reasoning output, using fallback plan: {}", e);
                PilotMetrics::incr(&self.metrics.reasoning_failures);
                self.fallback_plan(state)
            }
        }
    }

    fn fallback_plan(&self, state: &PilotState) -> Plan {
        let leads = self.leads.lock().unwrap();
        let (plan, follow_ups) =
            fallback::build_fallback_plan(state, &leads, self.services.mailer.as_ref());
        drop(leads);
        for sequence in follow_ups {
            info!("Fallback: follow-up sequence planned for {}", sequence.contact_email);
            self.services.mailer.create_follow_up(sequence);
        }
        plan
    }

    fn persist_plan_outputs(&self, plan: &Plan) {
        let mut store = self.store.lock().unwrap();

        for experiment in &plan.experiments {
            store.add_experiment(Experiment {
                id: uuid::Uuid::new_v4().to_string(),
                kind: experiment.kind.clone(),
                description: experiment.description.clone(),
                hypothesis: experiment.hypothesis.clone(),
                variants: experiment.variants.clone(),
                metric: experiment.metric.clone(),
                started_at: chrono::Utc::now(),
                status: ExperimentStatus::Running,
                results: None,
            });
        }

        for learning in &plan.learnings {
            match LearningCategory::parse(&learning.category) {
                Some(category) => store.add_learning(
                    category,
                    Learning {
                        summary: learning.summary.clone(),
                        data: learning.data.clone(),
                        source: "brain".to_string(),
                        recorded_at: chrono::Utc::now(),
                    },
                ),
                None => warn!("Dropping learning with unknown category: {}", learning.category),
            }
        }

        for item in &plan.diagnostic_items {
            let priority = match item.priority.as_deref() {
                Some("critical") => DiagnosticPriority::Critical,
                Some("warning") => DiagnosticPriority::Warning,
                _ => DiagnosticPriority::Info,
            };
            let kind = match item.kind.as_deref() {
                Some("bot_fixable") => DiagnosticKind::BotFixable,
                _ => DiagnosticKind::OwnerAction,
            };
            store.add_diagnostic_item(DiagnosticItem::new(
                kind,
                priority,
                &item.category,
                item.message.clone(),
                item.suggestion.clone(),
            ));
        }
    }

    async fn collect_snapshot(&self, state: &PilotState) -> StateSnapshot {
        let (lead_total, recent_leads) = {
            let leads = self.leads.lock().unwrap();
            let week_ago = chrono::Utc::now() - chrono::Duration::days(7);
            let recent = leads
                .all()
                .iter()
                .filter(|l| l.found_at.map(|at| at > week_ago).unwrap_or(false))
                .count();
            (leads.len(), recent)
        };

        let enrichment_credits = self.services.enrichment.credits().await.ok().flatten();

        StateSnapshot {
            lead_total,
            recent_leads,
            open_rate: self.services.mailer.open_rate(),
            active_campaigns: self.services.mailer.active_campaigns(),
            enrichment_credits,
            hot_leads: self.services.mailer.hot_leads(HOT_LEAD_MIN_OPENS),
            articles: self.services.monitor.recent_articles(ARTICLE_MIN_RELEVANCE, 5),
            trends: self.services.monitor.trends(),
            market_signals: self.services.monitor.market_signals(),
            competitive_digest: self.services.monitor.competitive_digest(),
            improvement_analysis: self
                .services
                .improvement
                .as_ref()
                .and_then(|i| i.last_analysis()),
            improvement_recommendations: self
                .services
                .improvement
                .as_ref()
                .map(|i| i.pending_recommendations())
                .unwrap_or_default(),
            api_calls_today: state.stats.api_calls_today,
            daily_api_budget: self.daily_api_budget,
        }
    }

    /// Create a monitoring watch per unmonitored criteria industry, plus one
    /// per unmonitored prospect company found in CRM deal names (bounded).
    async fn sync_watches(&self) {
        let watched: Vec<String> = self
            .services
            .monitor
            .watches()
            .into_iter()
            .map(|w| w.name.to_lowercase())
            .collect();

        let industries = self.store.lock().unwrap().state().goals.search_criteria.industries.clone();
        for industry in industries {
            if !watched.contains(&industry.to_lowercase()) {
                info!("Creating industry watch: {}", industry);
                self.services.monitor.create_watch(&industry, WatchKind::Industry);
            }
        }

        // Deal names follow the "Entreprise - Contact" convention
        let deals = match self.services.crm.list_deals().await {
            Ok(deals) => deals,
            Err(_) => return,
        };
        let mut created = 0;
        for deal in deals {
            if created >= MAX_NEW_CRM_WATCHES {
                break;
            }
            let company = deal.name.split(" - ").next().unwrap_or("").trim().to_string();
            if company.is_empty() || watched.contains(&company.to_lowercase()) {
                continue;
            }
            if self
                .services
                .monitor
                .watches()
                .iter()
                .any(|w| w.name.eq_ignore_ascii_case(&company))
            {
                continue;
            }
            info!("Creating company watch from CRM deal: {}", company);
            self.services.monitor.create_watch(&company, WatchKind::Company);
            created += 1;
        }
    }
}

fn render_cycle_summary(plan: &Plan, report: &CycleReport, executed: &[String]) -> String {
    let mut text = String::from("Cycle du pilote termine.\n");
    let reasoning: String = plan.reasoning.chars().take(200).collect();
    if !reasoning.is_empty() {
        text.push_str(&format!("Raisonnement: {}\n", reasoning));
    }
    if !executed.is_empty() {
        text.push_str(&format!("Actions executees:\n{}\n", executed.join("\n")));
    }
    if report.queued > 0 {
        text.push_str(&format!("{} action(s) en attente de confirmation.\n", report.queued));
    }
    if !plan.experiments.is_empty() {
        text.push_str(&format!("{} nouvelle(s) experience(s).\n", plan.experiments.len()));
    }
    if let Some(assessment) = &plan.weekly_assessment {
        text.push_str(&format!("Bilan: {}", assessment));
    }
    text.trim_end().to_string()
}

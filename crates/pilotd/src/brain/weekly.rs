//! Weekly reset + learn cycle.
//!
//! Archives the outgoing week, zeroes the counters, force-closes stale
//! experiments and sends the operator a bilan. Separately, the archived
//! week goes to the analysis-tier model; suggested criteria or goal changes
//! only apply under full autonomy, while learnings and experiments are
//! always kept.

use super::{prompt, BrainEngine};
use pilot_common::metrics::PilotMetrics;
use pilot_common::plan::parse_weekly_analysis;
use pilot_common::state::{
    Experiment, ExperimentStatus, Learning, LearningCategory, WeeklySnapshot,
};
use pilot_common::AutonomyLevel;
use tracing::{info, warn};

/// Running experiments older than this are force-completed.
const EXPERIMENT_MAX_AGE_DAYS: i64 = 7;

impl BrainEngine {
    pub async fn run_weekly_cycle(&self) -> anyhow::Result<()> {
        info!("Weekly reset+learn cycle starting");
        PilotMetrics::incr(&self.metrics().weekly_resets);
        let channel = self.admin_channel();

        // Archive and zero the counters
        let snapshot = self.store().lock().unwrap().reset_weekly_progress();

        // Close out experiments that ran their course
        let stale: Vec<String> = {
            let store = self.store().lock().unwrap();
            let cutoff = chrono::Utc::now() - chrono::Duration::days(EXPERIMENT_MAX_AGE_DAYS);
            store
                .state()
                .experiments
                .iter()
                .filter(|e| e.status == ExperimentStatus::Running && e.started_at < cutoff)
                .map(|e| e.id.clone())
                .collect()
        };
        for id in &stale {
            self.store().lock().unwrap().complete_experiment(
                id,
                Some("Cloture automatique apres 7 jours".to_string()),
            );
        }
        if !stale.is_empty() {
            info!("Force-completed {} stale experiment(s)", stale.len());
        }

        // Operator bilan
        self.services().notifier.send_message(&channel, &render_bilan(&snapshot)).await;

        // Higher-level weekly analysis
        self.run_weekly_analysis().await;

        info!("Weekly cycle done");
        Ok(())
    }

    async fn run_weekly_analysis(&self) {
        let state = self.store().lock().unwrap().state().clone();
        let user = prompt::build_weekly_analysis_prompt(&state);
        let system = "Tu es l'analyste hebdomadaire d'un pilote commercial autonome. Tire les lecons de la semaine et propose des ajustements concrets.";

        PilotMetrics::incr(&self.metrics().reasoning_calls);
        self.store().lock().unwrap().record_api_call();

        let raw = match self.services().reasoning.complete_analysis(system, &user, 2000).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Weekly analysis unavailable: {}", e);
                PilotMetrics::incr(&self.metrics().reasoning_failures);
                return;
            }
        };
        let analysis = match parse_weekly_analysis(&raw) {
            Ok(analysis) => analysis,
            Err(e) => {
                warn!("Unusable weekly analysis output: {}", e);
                PilotMetrics::incr(&self.metrics().reasoning_failures);
                return;
            }
        };

        // Criteria and goal changes require full autonomy; learnings and
        // experiments are knowledge, not actions, and always persist.
        let autonomy = state.config.autonomy_level;
        let mut store = self.store().lock().unwrap();
        if autonomy == AutonomyLevel::Full {
            if let Some(updates) = &analysis.criteria_updates {
                if store.update_search_criteria(updates) {
                    info!("Weekly analysis adjusted search criteria");
                }
            }
            if let Some(updates) = &analysis.goal_updates {
                if store.update_weekly_goals(updates) {
                    info!("Weekly analysis adjusted weekly goals");
                }
            }
        } else if analysis.criteria_updates.is_some() || analysis.goal_updates.is_some() {
            info!("Weekly analysis suggested changes, held back (autonomy: {})", autonomy.as_str());
        }

        for learning in &analysis.learnings {
            match LearningCategory::parse(&learning.category) {
                Some(category) => store.add_learning(
                    category,
                    Learning {
                        summary: learning.summary.clone(),
                        data: learning.data.clone(),
                        source: "weekly_analysis".to_string(),
                        recorded_at: chrono::Utc::now(),
                    },
                ),
                None => warn!("Dropping weekly learning with unknown category: {}", learning.category),
            }
        }
        for experiment in &analysis.experiments {
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
    }
}

fn render_bilan(snapshot: &WeeklySnapshot) -> String {
    let p = &snapshot.progress;
    let g = &snapshot.goals;
    let verdict = |done: u32, target: u32| {
        if target == 0 || done >= target {
            "atteint"
        } else {
            "manque"
        }
    };
    format!(
        "Bilan de la semaine:\n\
         - Leads trouves: {}/{} ({})\n\
         - Emails envoyes: {}/{} ({})\n\
         - Reponses: {}/{} ({})\n\
         - RDV: {}/{} ({})\n\
         Les compteurs repartent de zero pour la nouvelle semaine.",
        p.leads_found_this_week,
        g.leads_to_find,
        verdict(p.leads_found_this_week, g.leads_to_find),
        p.emails_sent_this_week,
        g.emails_to_send,
        verdict(p.emails_sent_this_week, g.emails_to_send),
        p.responses_this_week,
        g.responses_target,
        verdict(p.responses_this_week, g.responses_target),
        p.rdv_this_week,
        g.rdv_target,
        verdict(p.rdv_this_week, g.rdv_target),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_common::state::{Progress, WeeklyGoals};

    #[test]
    fn test_bilan_wording() {
        let snapshot = WeeklySnapshot {
            progress: Progress {
                leads_found_this_week: 22,
                emails_sent_this_week: 10,
                ..Default::default()
            },
            goals: WeeklyGoals::default(),
            archived_at: chrono::Utc::now(),
        };
        let bilan = render_bilan(&snapshot);
        assert!(bilan.contains("22/20 (atteint)"));
        assert!(bilan.contains("10/15 (manque)"));
    }
}

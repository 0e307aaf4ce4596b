//! Weekly reset+learn integration tests.

mod common;

use chrono::Utc;
use common::BrainFixture;
use pilot_common::llm::{FakeReasoning, ReasoningError};
use pilot_common::state::{
    AutonomyLevel, Experiment, ExperimentStatus, ProgressCounter,
};
use std::sync::Arc;

#[tokio::test]
async fn test_reset_archives_then_zeroes_and_sends_bilan() {
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.services.reasoning = Arc::new(FakeReasoning::always("{\"analysis\": \"semaine correcte\"}"));
    {
        let mut store = f.store.lock().unwrap();
        store.increment_progress(ProgressCounter::LeadsFound, 12);
        store.increment_progress(ProgressCounter::EmailsSent, 7);
    }

    f.engine().run_weekly_cycle().await.unwrap();

    let store = f.store.lock().unwrap();
    let progress = &store.state().progress;
    assert_eq!(progress.leads_found_this_week, 0);
    assert_eq!(progress.emails_sent_this_week, 0);
    assert_eq!(progress.responses_this_week, 0);
    assert_eq!(progress.rdv_this_week, 0);

    let archived = &store.state().learnings.weekly_performance[0];
    assert_eq!(archived.progress.leads_found_this_week, 12);
    assert_eq!(archived.progress.emails_sent_this_week, 7);
    drop(store);

    let messages = f.notifier.messages.lock().unwrap();
    assert!(messages.iter().any(|(_, text)| text.contains("Bilan de la semaine")));
}

#[tokio::test]
async fn test_stale_experiments_force_completed() {
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.services.reasoning = Arc::new(FakeReasoning::always("{\"analysis\": \"ras\"}"));
    {
        let mut store = f.store.lock().unwrap();
        store.add_experiment(Experiment {
            id: "exp-old".to_string(),
            kind: "subject".to_string(),
            description: "objets courts".to_string(),
            hypothesis: "court > long".to_string(),
            variants: vec![],
            metric: "open_rate".to_string(),
            started_at: Utc::now() - chrono::Duration::days(9),
            status: ExperimentStatus::Running,
            results: None,
        });
        store.add_experiment(Experiment {
            id: "exp-fresh".to_string(),
            kind: "send_time".to_string(),
            description: "matin vs soir".to_string(),
            hypothesis: "matin".to_string(),
            variants: vec![],
            metric: "open_rate".to_string(),
            started_at: Utc::now() - chrono::Duration::days(2),
            status: ExperimentStatus::Running,
            results: None,
        });
    }

    f.engine().run_weekly_cycle().await.unwrap();

    let store = f.store.lock().unwrap();
    let old = store.state().experiments.iter().find(|e| e.id == "exp-old").unwrap();
    assert_eq!(old.status, ExperimentStatus::Completed);
    assert!(old.results.as_deref().unwrap().contains("automatique"));
    let fresh = store.state().experiments.iter().find(|e| e.id == "exp-fresh").unwrap();
    assert_eq!(fresh.status, ExperimentStatus::Running);
}

#[tokio::test]
async fn test_weekly_analysis_changes_apply_only_under_full_autonomy() {
    let analysis = serde_json::json!({
        "analysis": "les CTO repondent mieux",
        "criteria_updates": {"titles": ["CTO"]},
        "goal_updates": {"emails_to_send": 25},
        "learnings": [{"category": "best_search_criteria", "summary": "viser les CTO"}],
        "experiments": [],
    })
    .to_string();

    // Semi autonomy: suggestions held back, knowledge kept
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.services.reasoning = Arc::new(FakeReasoning::always(&analysis));
    f.engine().run_weekly_cycle().await.unwrap();
    {
        let store = f.store.lock().unwrap();
        assert!(store.state().goals.search_criteria.titles.is_empty());
        assert_eq!(
            store.state().goals.weekly.emails_to_send,
            pilot_common::state::WeeklyGoals::default().emails_to_send
        );
        assert_eq!(store.state().learnings.best_search_criteria.len(), 1);
    }

    // Full autonomy: applied
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.store.lock().unwrap().update_config(|c| c.autonomy_level = AutonomyLevel::Full);
    f.services.reasoning = Arc::new(FakeReasoning::always(&analysis));
    f.engine().run_weekly_cycle().await.unwrap();
    {
        let store = f.store.lock().unwrap();
        assert_eq!(store.state().goals.search_criteria.titles, vec!["CTO"]);
        assert_eq!(store.state().goals.weekly.emails_to_send, 25);
    }
}

#[tokio::test]
async fn test_weekly_cycle_survives_analysis_outage() {
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.services.reasoning = Arc::new(FakeReasoning::always_error(ReasoningError::Timeout(120)));
    {
        let mut store = f.store.lock().unwrap();
        store.increment_progress(ProgressCounter::LeadsFound, 3);
    }

    // Reset still happens, bilan still goes out
    f.engine().run_weekly_cycle().await.unwrap();
    assert_eq!(f.store.lock().unwrap().state().progress.leads_found_this_week, 0);
    assert!(f
        .notifier
        .messages
        .lock()
        .unwrap()
        .iter()
        .any(|(_, text)| text.contains("Bilan")));
}

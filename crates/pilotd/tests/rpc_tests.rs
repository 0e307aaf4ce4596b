//! Control-surface tests: status, chat relay, and the approve/reject flow
//! that closes the confirmation loop on queued actions.

mod common;

use common::BrainFixture;
use pilot_common::actions::Action;
use pilot_common::ipc::{Method, Request, StatusData};
use pilot_common::llm::FakeReasoning;
use pilot_common::metrics::PilotMetrics;
use pilot_common::state::QueueStatus;
use pilotd::diagnostic::DiagnosticChecker;
use pilotd::executor::ActionExecutor;
use pilotd::handler::AutonomousHandler;
use pilotd::researcher::ProspectResearcher;
use pilotd::rpc_server::{handle_request, DaemonHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

fn daemon(f: &BrainFixture) -> DaemonHandle {
    let researcher = Arc::new(ProspectResearcher::new(
        f.store.clone(),
        f.leads.clone(),
        f.services.clone(),
    ));
    let executor = Arc::new(
        ActionExecutor::new(f.store.clone(), f.leads.clone(), f.services.clone(), researcher)
            .with_backoff(Duration::from_millis(1)),
    );
    let checker = Arc::new(DiagnosticChecker::new(
        f.store.clone(),
        f.leads.clone(),
        f.services.clone(),
        500,
    ));
    let handler = Arc::new(AutonomousHandler::new(
        f.store.clone(),
        f.leads.clone(),
        f.services.clone(),
        checker.clone(),
    ));
    DaemonHandle {
        store: f.store.clone(),
        handler,
        checker,
        executor,
        metrics: Arc::new(PilotMetrics::default()),
        cycle_trigger: Arc::new(Notify::new()),
        start_time: Instant::now(),
    }
}

#[tokio::test]
async fn test_status_reports_goals_and_lifecycle() {
    let f = BrainFixture::new();
    f.enable_pilot();
    let handle = daemon(&f);

    let response = handle_request(&handle, Request::new(Method::Status)).await;
    assert!(response.ok);
    let status: StatusData = serde_json::from_value(response.data.unwrap()).unwrap();
    assert_eq!(status.lifecycle, "active");
    assert_eq!(status.leads_to_find, 20);
    assert_eq!(status.pending_confirmations, 0);
}

#[tokio::test]
async fn test_pause_and_resume() {
    let f = BrainFixture::new();
    f.enable_pilot();
    let handle = daemon(&f);

    handle_request(&handle, Request::new(Method::Pause)).await;
    assert!(!f.store.lock().unwrap().state().config.enabled);

    handle_request(&handle, Request::new(Method::Resume)).await;
    assert!(f.store.lock().unwrap().state().config.enabled);
}

#[tokio::test]
async fn test_approve_executes_queued_action() {
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.services.reasoning = Arc::new(FakeReasoning::always("ok"));
    let handle = daemon(&f);

    let id = f.store.lock().unwrap().add_to_queue(Action::SendEmail {
        to: "a@b.com".to_string(),
        subject: Some("Objet".to_string()),
        body: Some("Corps".to_string()),
        generate_first: false,
        research_first: false,
    });

    let response = handle_request(&handle, Request::queue_decision(Method::Approve, &id)).await;
    assert!(response.ok, "{:?}", response.error);

    let store = f.store.lock().unwrap();
    let entry = store.state().action_queue.iter().find(|e| e.id == id).unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);
    assert!(entry.result.as_ref().unwrap().success);
    // And it landed in history as a confirmed (non-auto) execution
    assert!(store.state().action_history.iter().any(|h| !h.auto));
    drop(store);
    assert_eq!(f.mailer.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reject_never_executes() {
    let f = BrainFixture::new();
    f.enable_pilot();
    let handle = daemon(&f);

    let id = f.store.lock().unwrap().add_to_queue(Action::SendEmail {
        to: "a@b.com".to_string(),
        subject: Some("Objet".to_string()),
        body: Some("Corps".to_string()),
        generate_first: false,
        research_first: false,
    });

    let response = handle_request(&handle, Request::queue_decision(Method::Reject, &id)).await;
    assert!(response.ok);

    let store = f.store.lock().unwrap();
    let entry = store.state().action_queue.iter().find(|e| e.id == id).unwrap();
    assert_eq!(entry.status, QueueStatus::Rejected);
    drop(store);
    assert!(f.mailer.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_approve_unknown_id_is_an_error() {
    let f = BrainFixture::new();
    let handle = daemon(&f);
    let response = handle_request(&handle, Request::queue_decision(Method::Approve, "inconnu")).await;
    assert!(!response.ok);
}

#[tokio::test]
async fn test_chat_relays_reply() {
    let mut f = BrainFixture::new();
    f.enable_pilot();
    f.services.reasoning = Arc::new(FakeReasoning::always("Bonjour, 0 lead pour l'instant."));
    let handle = daemon(&f);

    let response = handle_request(&handle, Request::chat("ou en est-on ?")).await;
    assert!(response.ok);
    assert_eq!(
        response.data.unwrap()["reply"].as_str().unwrap(),
        "Bonjour, 0 lead pour l'instant."
    );
}

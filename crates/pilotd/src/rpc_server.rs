//! Control socket server - pilotctl's window into the daemon.
//!
//! Newline-delimited JSON over a unix socket. One task per connection;
//! every request is answered, including malformed ones.

use crate::diagnostic::DiagnosticChecker;
use crate::executor::ActionExecutor;
use crate::handler::AutonomousHandler;
use pilot_common::ipc::{Method, Request, Response, StatusData};
use pilot_common::metrics::PilotMetrics;
use pilot_common::state::QueueStatus;
use pilot_common::store::PilotStore;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tracing::{info, warn};

/// Shared daemon state the RPC methods operate on.
pub struct DaemonHandle {
    pub store: Arc<Mutex<PilotStore>>,
    pub handler: Arc<AutonomousHandler>,
    pub checker: Arc<DiagnosticChecker>,
    pub executor: Arc<ActionExecutor>,
    pub metrics: Arc<PilotMetrics>,
    /// Wakes the brain scheduler for an out-of-schedule cycle.
    pub cycle_trigger: Arc<Notify>,
    pub start_time: Instant,
}

pub async fn start_server(handle: Arc<DaemonHandle>, socket_path: PathBuf) -> anyhow::Result<()> {
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await.context("Failed to create socket directory")?;
    }
    let _ = tokio::fs::remove_file(&socket_path).await;

    let listener = UnixListener::bind(&socket_path).context("Failed to bind control socket")?;
    info!("Control socket listening on {}", socket_path.display());

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(handle, stream).await {
                        warn!("Control connection error: {}", e);
                    }
                });
            }
            Err(e) => warn!("Control socket accept failed: {}", e),
        }
    }
}

async fn serve_connection(handle: Arc<DaemonHandle>, stream: UnixStream) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => handle_request(&handle, request).await,
            Err(e) => Response::err(format!("requete invalide: {}", e)),
        };
        let mut payload = serde_json::to_string(&response)?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await?;
    }
    Ok(())
}

pub async fn handle_request(handle: &DaemonHandle, request: Request) -> Response {
    match request.method {
        Method::Status => Response::ok(
            serde_json::to_value(status_data(handle)).unwrap_or(serde_json::Value::Null),
        ),
        Method::Chat => {
            let Some(message) = request.params.get("message").and_then(|m| m.as_str()) else {
                return Response::err("champ message manquant");
            };
            let reply = handle.handler.handle_message(message, "pilotctl").await;
            if reply.trigger_brain_cycle {
                handle.cycle_trigger.notify_one();
            }
            Response::ok(serde_json::json!({ "reply": reply.content }))
        }
        Method::Pause => {
            handle.store.lock().unwrap().set_enabled(false);
            Response::ok(serde_json::json!({ "enabled": false }))
        }
        Method::Resume => {
            handle.store.lock().unwrap().set_enabled(true);
            Response::ok(serde_json::json!({ "enabled": true }))
        }
        Method::Diagnostic => {
            let open = handle.checker.run_full().await;
            let items: Vec<serde_json::Value> = open
                .iter()
                .map(|d| {
                    serde_json::json!({
                        "priority": d.priority,
                        "category": d.category,
                        "message": d.message,
                        "suggestion": d.suggestion,
                    })
                })
                .collect();
            Response::ok(serde_json::json!({ "open": items }))
        }
        Method::Cycle => {
            handle.cycle_trigger.notify_one();
            Response::ok(serde_json::json!({ "triggered": true }))
        }
        Method::Approve => approve_action(handle, &request).await,
        Method::Reject => {
            let Some(id) = request.params.get("action_id").and_then(|v| v.as_str()) else {
                return Response::err("champ action_id manquant");
            };
            let updated =
                handle.store.lock().unwrap().update_queue_entry(id, QueueStatus::Rejected, None);
            if updated {
                Response::ok(serde_json::json!({ "rejected": id }))
            } else {
                Response::err(format!("action inconnue: {}", id))
            }
        }
    }
}

/// Confirm a pending queue entry, execute it, and record the outcome both
/// on the entry and in the action history.
async fn approve_action(handle: &DaemonHandle, request: &Request) -> Response {
    let Some(id) = request.params.get("action_id").and_then(|v| v.as_str()) else {
        return Response::err("champ action_id manquant");
    };

    let action = {
        let mut store = handle.store.lock().unwrap();
        let Some(entry) = store.pending_queue_entries().into_iter().find(|e| e.id == id) else {
            return Response::err(format!("aucune action en attente avec l'id {}", id));
        };
        store.update_queue_entry(id, QueueStatus::Confirmed, None);
        entry.action
    };

    let (outcome, attempts) = handle.executor.execute_with_retry(&action).await;
    {
        let mut store = handle.store.lock().unwrap();
        store.update_queue_entry(id, QueueStatus::Completed, Some(outcome.clone()));
        store.record_action(action, false, attempts, outcome.clone());
    }

    if outcome.is_settled() {
        Response::ok(serde_json::json!({
            "executed": id,
            "summary": outcome.summary,
        }))
    } else {
        Response::err(outcome.error.unwrap_or_else(|| "echec de l'action".to_string()))
    }
}

fn status_data(handle: &DaemonHandle) -> StatusData {
    let store = handle.store.lock().unwrap();
    let state = store.state();
    StatusData {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: handle.start_time.elapsed().as_secs(),
        lifecycle: state.lifecycle().as_str().to_string(),
        autonomy: state.config.autonomy_level.as_str().to_string(),
        leads_found_this_week: state.progress.leads_found_this_week,
        leads_to_find: state.goals.weekly.leads_to_find,
        emails_sent_this_week: state.progress.emails_sent_this_week,
        emails_to_send: state.goals.weekly.emails_to_send,
        open_diagnostics: state.open_diagnostics().len(),
        pending_confirmations: state.pending_confirmations(),
        total_brain_cycles: state.stats.total_brain_cycles,
        last_brain_cycle_at: state.stats.last_brain_cycle_at.map(|t| t.to_rfc3339()),
        session: handle.metrics.snapshot(),
    }
}

/// Remove the socket file on shutdown.
pub fn cleanup_socket(socket_path: &Path) {
    let _ = std::fs::remove_file(socket_path);
}

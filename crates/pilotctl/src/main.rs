//! Pilot Control - CLI client for the sales pilot daemon.

mod client;

use anyhow::Result;
use clap::{Parser, Subcommand};
use client::PilotClient;
use owo_colors::OwoColorize;
use pilot_common::ipc::{Method, Request, StatusData};

#[derive(Parser)]
#[command(name = "pilotctl")]
#[command(about = "Pilote commercial autonome - controle du daemon", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Etat du pilote (cycle, objectifs, diagnostics)
    Status,

    /// Envoyer un message a l'assistant
    Chat {
        /// Le message, en langage naturel
        message: Vec<String>,
    },

    /// Mettre le pilote en pause
    Pause,

    /// Relancer le pilote
    Resume,

    /// Lancer un diagnostic complet
    Diagnostic,

    /// Declencher un cycle de reflexion immediatement
    Cycle,

    /// Confirmer une action en attente
    Approve {
        /// Identifiant de l'action (donne dans la demande de confirmation)
        action_id: String,
    },

    /// Rejeter une action en attente
    Reject {
        action_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "erreur:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut client = PilotClient::connect().await?;

    match cli.command {
        Commands::Status => {
            let response = client.call(Request::new(Method::Status)).await?;
            let data = response.data.unwrap_or_default();
            let status: StatusData = serde_json::from_value(data)?;
            print_status(&status);
        }
        Commands::Chat { message } => {
            let text = message.join(" ");
            if text.trim().is_empty() {
                anyhow::bail!("message vide");
            }
            let response = client.call(Request::chat(&text)).await?;
            match response.data.and_then(|d| d.get("reply").and_then(|r| r.as_str()).map(String::from)) {
                Some(reply) => println!("{}", reply),
                None => println!("{}", response.error.unwrap_or_else(|| "pas de reponse".to_string())),
            }
        }
        Commands::Pause => {
            client.call(Request::new(Method::Pause)).await?;
            println!("{}", "Pilote en pause.".yellow());
        }
        Commands::Resume => {
            client.call(Request::new(Method::Resume)).await?;
            println!("{}", "Pilote relance.".green());
        }
        Commands::Diagnostic => {
            let response = client.call(Request::new(Method::Diagnostic)).await?;
            let open = response
                .data
                .and_then(|d| d.get("open").cloned())
                .and_then(|o| o.as_array().cloned())
                .unwrap_or_default();
            if open.is_empty() {
                println!("{}", "Aucun probleme ouvert.".green());
            } else {
                println!("{} probleme(s) ouverts:", open.len());
                for item in open {
                    let priority = item.get("priority").and_then(|p| p.as_str()).unwrap_or("info");
                    let message = item.get("message").and_then(|m| m.as_str()).unwrap_or("?");
                    let line = format!("  [{}] {}", priority, message);
                    match priority {
                        "critical" => println!("{}", line.red()),
                        "warning" => println!("{}", line.yellow()),
                        _ => println!("{}", line),
                    }
                    if let Some(suggestion) = item.get("suggestion").and_then(|s| s.as_str()) {
                        println!("        -> {}", suggestion.dimmed());
                    }
                }
            }
        }
        Commands::Cycle => {
            client.call(Request::new(Method::Cycle)).await?;
            println!("Cycle de reflexion declenche.");
        }
        Commands::Approve { action_id } => {
            let response = client.call(Request::queue_decision(Method::Approve, &action_id)).await?;
            if response.ok {
                let summary = response
                    .data
                    .and_then(|d| d.get("summary").and_then(|s| s.as_str()).map(String::from));
                println!("{} {}", "Action executee.".green(), summary.unwrap_or_default());
            } else {
                anyhow::bail!(response.error.unwrap_or_else(|| "echec".to_string()));
            }
        }
        Commands::Reject { action_id } => {
            client.call(Request::queue_decision(Method::Reject, &action_id)).await?;
            println!("{}", "Action rejetee.".yellow());
        }
    }
    Ok(())
}

fn print_status(status: &StatusData) {
    println!("{} v{}", "Pilote commercial".bold(), status.version);
    let lifecycle = match status.lifecycle.as_str() {
        "active" => status.lifecycle.green().to_string(),
        "paused" => status.lifecycle.yellow().to_string(),
        other => other.red().to_string(),
    };
    println!("  Etat: {} (autonomie {})", lifecycle, status.autonomy);
    println!("  Uptime: {}s", status.uptime_secs);
    println!(
        "  Semaine: {}/{} leads, {}/{} emails",
        status.leads_found_this_week,
        status.leads_to_find,
        status.emails_sent_this_week,
        status.emails_to_send
    );
    println!(
        "  Cycles de reflexion: {} (dernier: {})",
        status.total_brain_cycles,
        status.last_brain_cycle_at.as_deref().unwrap_or("jamais")
    );
    if status.open_diagnostics > 0 {
        println!("  {}", format!("{} diagnostic(s) ouverts", status.open_diagnostics).yellow());
    }
    if status.pending_confirmations > 0 {
        println!(
            "  {}",
            format!("{} action(s) en attente de confirmation", status.pending_confirmations).yellow()
        );
    }
    if status.session.reasoning_failures > 0 {
        println!(
            "  {}",
            format!(
                "{} appel(s) au service de raisonnement en echec cette session",
                status.session.reasoning_failures
            )
            .red()
        );
    }
}

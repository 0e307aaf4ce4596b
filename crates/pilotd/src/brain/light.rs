//! Light cycle - zero-reasoning-cost heuristics between brain cycles.
//!
//! Two jobs: boost stored leads whose company just triggered a market
//! signal (once per signal/lead pair, with a one-time opportunity note to
//! the operator), and fire a single urgent lead search when the week is
//! half gone with under 30% of the goal reached.

use super::BrainEngine;
use pilot_common::actions::Action;
use pilot_common::metrics::PilotMetrics;
use tracing::info;

/// Progress fraction below which mid-week triggers the urgency search.
const MIDWEEK_MIN_PROGRESS: f32 = 0.30;

/// Score boost per signal kind.
pub fn signal_boost(kind: &str) -> f32 {
    match kind {
        "funding" => 2.0,
        "acquisition" => 2.0,
        "expansion" => 1.5,
        "product_launch" => 1.0,
        "leadership_change" => 1.0,
        "hiring" => 0.5,
        _ => 0.5,
    }
}

#[derive(Debug, Clone, Default)]
pub struct LightReport {
    pub boosted_leads: usize,
    pub signals_matched: usize,
    pub urgency_search: bool,
}

impl BrainEngine {
    pub async fn run_light_cycle(&self) -> anyhow::Result<LightReport> {
        info!("Light cycle starting");
        PilotMetrics::incr(&self.metrics().light_cycles);
        let mut report = LightReport::default();
        let channel = self.admin_channel();

        // Signal-driven score boosts, deduplicated per (signal, lead)
        for signal in self.services().monitor.market_signals() {
            let company_leads = self.leads().lock().unwrap().by_company(&signal.company);
            if company_leads.is_empty() {
                continue;
            }
            let boost = signal_boost(&signal.kind);
            let mut boosted_here = 0;

            for lead in &company_leads {
                let key = lead
                    .email
                    .clone()
                    .unwrap_or_else(|| format!("{}@{}", lead.nom.as_deref().unwrap_or("?"), lead.entreprise));
                let fresh = self.store().lock().unwrap().mark_signal_processed(&signal.id, &key);
                if !fresh {
                    continue;
                }
                if let Some(email) = &lead.email {
                    self.leads().lock().unwrap().boost_score(email, boost);
                }
                boosted_here += 1;
            }

            if boosted_here > 0 {
                report.signals_matched += 1;
                report.boosted_leads += boosted_here;
                self.services()
                    .notifier
                    .send_message(
                        &channel,
                        &format!(
                            "Opportunite detectee: {} - {} ({} lead(s) rehausses de +{})",
                            signal.company, signal.headline, boosted_here, boost
                        ),
                    )
                    .await;
            }
        }

        // Mid-week catch-up
        let (behind, days_in) = {
            let store = self.store().lock().unwrap();
            let state = store.state();
            let goals = &state.goals.weekly;
            let progress = &state.progress;
            let leads_fraction = if goals.leads_to_find > 0 {
                progress.leads_found_this_week as f32 / goals.leads_to_find as f32
            } else {
                1.0
            };
            let emails_fraction = if goals.emails_to_send > 0 {
                progress.emails_sent_this_week as f32 / goals.emails_to_send as f32
            } else {
                1.0
            };
            (
                leads_fraction < MIDWEEK_MIN_PROGRESS || emails_fraction < MIDWEEK_MIN_PROGRESS,
                progress.days_into_week(chrono::Utc::now()),
            )
        };

        if (3..=5).contains(&days_in) && behind {
            info!("Mid-week behind target, launching urgency lead search");
            let action = Action::SearchLeads { criteria: None };
            let (outcome, attempts) = self.executor().execute_with_retry(&action).await;
            self.store().lock().unwrap().record_action(action, true, attempts, outcome);
            report.urgency_search = true;
        }

        self.store().lock().unwrap().record_light_cycle();
        info!(
            "Light cycle done: {} lead(s) boosted over {} signal(s){}",
            report.boosted_leads,
            report.signals_matched,
            if report.urgency_search { ", urgency search fired" } else { "" }
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_boost_table() {
        assert_eq!(signal_boost("funding"), 2.0);
        assert_eq!(signal_boost("acquisition"), 2.0);
        assert_eq!(signal_boost("expansion"), 1.5);
        assert_eq!(signal_boost("product_launch"), 1.0);
        assert_eq!(signal_boost("leadership_change"), 1.0);
        assert_eq!(signal_boost("hiring"), 0.5);
        assert_eq!(signal_boost("autre_chose"), 0.5);
    }
}

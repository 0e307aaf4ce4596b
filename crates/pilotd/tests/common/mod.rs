//! Shared fixture for brain-engine integration tests.
//!
//! Each test binary uses a different subset of the fixture.
#![allow(dead_code)]

use pilot_common::metrics::PilotMetrics;
use pilot_common::store::PilotStore;
use pilot_common::LeadStore;
use pilotd::brain::BrainEngine;
use pilotd::diagnostic::DiagnosticChecker;
use pilotd::executor::ActionExecutor;
use pilotd::researcher::ProspectResearcher;
use pilotd::services::Services;
use pilotd::testing::{fake_services, InMemoryMailerStore, InMemoryMonitorStore, RecordingNotifier};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub struct BrainFixture {
    pub _temp: TempDir,
    pub store: Arc<Mutex<PilotStore>>,
    pub leads: Arc<Mutex<LeadStore>>,
    pub services: Services,
    pub notifier: Arc<RecordingNotifier>,
    pub mailer: Arc<InMemoryMailerStore>,
    pub monitor: Arc<InMemoryMonitorStore>,
}

impl BrainFixture {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(Mutex::new(PilotStore::open(temp.path())));
        let leads = Arc::new(Mutex::new(LeadStore::open(temp.path())));
        let (services, notifier, mailer, monitor) = fake_services();
        Self { _temp: temp, store, leads, services, notifier, mailer, monitor }
    }

    /// Build the engine after the fixture's services were customized.
    pub fn engine(&self) -> BrainEngine {
        let researcher = Arc::new(ProspectResearcher::new(
            self.store.clone(),
            self.leads.clone(),
            self.services.clone(),
        ));
        let executor = Arc::new(
            ActionExecutor::new(
                self.store.clone(),
                self.leads.clone(),
                self.services.clone(),
                researcher,
            )
            .with_backoff(Duration::from_millis(1)),
        );
        let checker = Arc::new(DiagnosticChecker::new(
            self.store.clone(),
            self.leads.clone(),
            self.services.clone(),
            500,
        ));
        BrainEngine::new(
            self.store.clone(),
            self.leads.clone(),
            self.services.clone(),
            executor,
            checker,
            Arc::new(PilotMetrics::default()),
            500,
        )
    }

    pub fn enable_pilot(&self) {
        self.store.lock().unwrap().update_config(|config| {
            config.business_context = Some("Agence SaaS RH".to_string());
            config.enabled = true;
        });
    }
}

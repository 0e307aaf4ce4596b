//! Shared library for the autonomous sales pilot.
//!
//! Holds everything both the daemon and the control CLI need: configuration,
//! the persisted state documents, the action vocabulary, the reasoning
//! service client, plan parsing and the socket protocol.

pub mod actions;
pub mod config;
pub mod ipc;
pub mod leads;
pub mod llm;
pub mod metrics;
pub mod plan;
pub mod state;
pub mod store;

pub use actions::{Action, ControlAction, ExecutionOutcome};
pub use config::SystemConfig;
pub use leads::{Lead, LeadStore};
pub use llm::{FakeReasoning, HttpReasoning, ReasoningError, ReasoningService};
pub use metrics::PilotMetrics;
pub use plan::{parse_plan, Plan};
pub use state::{AutonomyLevel, PilotState};
pub use store::PilotStore;

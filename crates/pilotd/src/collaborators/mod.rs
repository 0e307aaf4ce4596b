//! Production collaborator clients.
//!
//! Thin HTTP wrappers around the SaaS APIs the pilot delegates to, plus the
//! JSON-file stores of the sibling skills (mailer, monitoring). Each client
//! checks for its API key up front and reports `configured() == false`
//! instead of failing deep inside a call.

pub mod apollo;
pub mod fullenrich;
pub mod hubspot;
pub mod llm_skills;
pub mod mailer;
pub mod monitor;
pub mod resend;
pub mod web;

//! Lead store - scored prospects found by the search collaborator.
//!
//! A sibling JSON document (`leads.json`) with the same atomic-write policy
//! as the pilot state. The brain reads it for the fallback plan and the
//! light cycle's signal boosts; the executor writes into it.

use crate::store::atomic_write_str;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const LEADS_FILE: &str = "leads.json";

/// A prospect. `entreprise` / `titre` / `raison` follow the wire format the
/// collaborators return.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Lead {
    pub nom: Option<String>,
    pub entreprise: String,
    pub email: Option<String>,
    pub titre: Option<String>,
    pub ville: Option<String>,
    pub industrie: Option<String>,
    pub score: f32,
    /// Qualification rationale from the scoring collaborator
    pub raison: Option<String>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub pushed_to_crm: bool,
    pub source: Option<String>,
    pub found_at: Option<DateTime<Utc>>,
    /// Raw organization payload from the search collaborator, kept for the
    /// prospect researcher (no second network call needed)
    pub organization: Option<serde_json::Value>,
}

impl Lead {
    /// Emails go out only to scored leads with a resolved address that were
    /// not already contacted.
    pub fn ready_to_email(&self, min_score: f32) -> bool {
        self.score >= min_score && self.email.is_some() && !self.email_sent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct LeadDocument {
    leads: Vec<Lead>,
}

/// Owns `leads.json`. Same single-owner, mutate-then-save discipline as
/// `PilotStore`.
pub struct LeadStore {
    path: PathBuf,
    doc: LeadDocument,
}

impl LeadStore {
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(LEADS_FILE);
        let doc = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("Corrupt lead store {}: {} - starting empty", path.display(), e);
                LeadDocument::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => LeadDocument::default(),
            Err(e) => {
                warn!("Failed to read {}: {} - starting empty", path.display(), e);
                LeadDocument::default()
            }
        };
        Self { path, doc }
    }

    fn persist(&self) {
        match serde_json::to_string_pretty(&self.doc) {
            Ok(json) => {
                if let Err(e) = atomic_write_str(&self.path, &json) {
                    warn!("Failed to persist lead store: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize lead store: {}", e),
        }
    }

    pub fn all(&self) -> &[Lead] {
        &self.doc.leads
    }

    pub fn len(&self) -> usize {
        self.doc.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.leads.is_empty()
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Lead> {
        let needle = email.to_lowercase();
        self.doc
            .leads
            .iter()
            .find(|l| l.email.as_deref().map(|e| e.to_lowercase()) == Some(needle.clone()))
    }

    /// Upsert by email when present, otherwise by (nom, entreprise).
    pub fn upsert(&mut self, lead: Lead) {
        let existing = self.doc.leads.iter_mut().find(|l| match (&lead.email, &l.email) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => l.nom == lead.nom && l.entreprise == lead.entreprise,
        });
        match existing {
            Some(slot) => {
                // Never lose the sent/pushed flags on re-import
                let email_sent = slot.email_sent || lead.email_sent;
                let email_sent_at = slot.email_sent_at.or(lead.email_sent_at);
                let pushed = slot.pushed_to_crm || lead.pushed_to_crm;
                *slot = lead;
                slot.email_sent = email_sent;
                slot.email_sent_at = email_sent_at;
                slot.pushed_to_crm = pushed;
            }
            None => self.doc.leads.push(lead),
        }
        self.persist();
    }

    /// Leads worth an email right now, best score first, bounded.
    pub fn ready_to_email(&self, min_score: f32, limit: usize) -> Vec<Lead> {
        let mut ready: Vec<Lead> =
            self.doc.leads.iter().filter(|l| l.ready_to_email(min_score)).cloned().collect();
        ready.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ready.truncate(limit);
        ready
    }

    /// Qualifying leads not yet in the CRM, bounded.
    pub fn ready_to_push(&self, min_score: f32, limit: usize) -> Vec<Lead> {
        self.doc
            .leads
            .iter()
            .filter(|l| l.score >= min_score && !l.pushed_to_crm && l.email.is_some())
            .take(limit)
            .cloned()
            .collect()
    }

    /// Contacts emailed at least `days` ago, for follow-up planning.
    pub fn emailed_before(&self, days: i64, limit: usize) -> Vec<Lead> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        self.doc
            .leads
            .iter()
            .filter(|l| l.email_sent && l.email_sent_at.map(|at| at <= cutoff).unwrap_or(false))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn mark_email_sent(&mut self, email: &str) {
        let needle = email.to_lowercase();
        if let Some(lead) = self
            .doc
            .leads
            .iter_mut()
            .find(|l| l.email.as_deref().map(|e| e.to_lowercase()) == Some(needle.clone()))
        {
            lead.email_sent = true;
            lead.email_sent_at = Some(Utc::now());
            self.persist();
        }
    }

    pub fn mark_pushed_to_crm(&mut self, email: &str) {
        let needle = email.to_lowercase();
        if let Some(lead) = self
            .doc
            .leads
            .iter_mut()
            .find(|l| l.email.as_deref().map(|e| e.to_lowercase()) == Some(needle.clone()))
        {
            lead.pushed_to_crm = true;
            self.persist();
        }
    }

    /// Add `delta` to one lead's score, by email.
    pub fn boost_score(&mut self, email: &str, delta: f32) -> bool {
        let needle = email.to_lowercase();
        if let Some(lead) = self
            .doc
            .leads
            .iter_mut()
            .find(|l| l.email.as_deref().map(|e| e.to_lowercase()) == Some(needle.clone()))
        {
            lead.score += delta;
            self.persist();
            true
        } else {
            false
        }
    }

    /// Leads whose company matches, case and whitespace insensitive.
    pub fn by_company(&self, company: &str) -> Vec<Lead> {
        let needle = company.trim().to_lowercase();
        self.doc.leads.iter().filter(|l| l.entreprise.trim().to_lowercase() == needle).cloned().collect()
    }

    /// Add `delta` to the score of every lead whose company matches, case
    /// and whitespace insensitive. Returns the emails of boosted leads.
    pub fn boost_company(&mut self, company: &str, delta: f32) -> Vec<String> {
        let needle = company.trim().to_lowercase();
        let mut boosted = Vec::new();
        for lead in self.doc.leads.iter_mut() {
            if lead.entreprise.trim().to_lowercase() == needle {
                lead.score += delta;
                if let Some(email) = &lead.email {
                    boosted.push(email.clone());
                }
            }
        }
        if !boosted.is_empty() {
            self.persist();
        }
        boosted
    }

    /// Most recent lead discovery, for the stale-activity diagnostic.
    pub fn last_found_at(&self) -> Option<DateTime<Utc>> {
        self.doc.leads.iter().filter_map(|l| l.found_at).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lead(email: &str, score: f32) -> Lead {
        Lead {
            nom: Some("Jean Test".to_string()),
            entreprise: "Acme".to_string(),
            email: Some(email.to_string()),
            score,
            found_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    #[test]
    fn test_upsert_preserves_sent_flag() {
        let temp = TempDir::new().unwrap();
        let mut store = LeadStore::open(temp.path());

        store.upsert(lead("a@b.com", 8.0));
        store.mark_email_sent("a@b.com");

        // Re-import the same lead with a fresh score
        store.upsert(lead("a@b.com", 9.0));
        let l = store.find_by_email("a@b.com").unwrap();
        assert_eq!(l.score, 9.0);
        assert!(l.email_sent);
    }

    #[test]
    fn test_ready_to_email_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        let mut store = LeadStore::open(temp.path());

        store.upsert(lead("low@b.com", 3.0));
        store.upsert(lead("high@b.com", 9.0));
        store.upsert(lead("mid@b.com", 7.5));
        let mut sent = lead("sent@b.com", 9.5);
        sent.email_sent = true;
        store.upsert(sent);

        let ready = store.ready_to_email(7.0, 5);
        let emails: Vec<_> = ready.iter().map(|l| l.email.clone().unwrap()).collect();
        assert_eq!(emails, vec!["high@b.com", "mid@b.com"]);
    }

    #[test]
    fn test_boost_company_matches_loosely() {
        let temp = TempDir::new().unwrap();
        let mut store = LeadStore::open(temp.path());
        store.upsert(lead("a@acme.com", 5.0));

        let boosted = store.boost_company("  ACME ", 2.0);
        assert_eq!(boosted, vec!["a@acme.com"]);
        assert_eq!(store.find_by_email("a@acme.com").unwrap().score, 7.0);

        assert!(store.boost_company("Globex", 2.0).is_empty());
    }

    #[test]
    fn test_survives_reload() {
        let temp = TempDir::new().unwrap();
        {
            let mut store = LeadStore::open(temp.path());
            store.upsert(lead("a@b.com", 8.0));
        }
        let store = LeadStore::open(temp.path());
        assert_eq!(store.len(), 1);
        assert!(store.find_by_email("a@b.com").is_some());
    }
}

//! Mailer skill store - sent emails, opens, follow-up sequences.
//!
//! The mailer skill owns campaign logic and warm-up limits elsewhere; the
//! pilot only needs this store: read sends and opens, record its own sends,
//! register follow-up sequences.

use crate::services::{FollowUpSequence, MailerStore, SentEmail};
use pilot_common::store::atomic_write_str;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

const MAILER_FILE: &str = "mailer.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct MailerDocument {
    sent: Vec<SentEmail>,
    follow_ups: Vec<FollowUpSequence>,
    active_campaigns: usize,
}

pub struct JsonMailerStore {
    path: PathBuf,
    doc: Mutex<MailerDocument>,
}

impl JsonMailerStore {
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(MAILER_FILE);
        let doc = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { path, doc: Mutex::new(doc) }
    }

    fn persist(&self, doc: &MailerDocument) {
        match serde_json::to_string_pretty(doc) {
            Ok(json) => {
                if let Err(e) = atomic_write_str(&self.path, &json) {
                    warn!("Failed to persist mailer store: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize mailer store: {}", e),
        }
    }
}

impl MailerStore for JsonMailerStore {
    fn sent_emails(&self) -> Vec<SentEmail> {
        self.doc.lock().unwrap().sent.clone()
    }

    fn open_rate(&self) -> Option<f32> {
        let doc = self.doc.lock().unwrap();
        if doc.sent.is_empty() {
            return None;
        }
        let opened = doc.sent.iter().filter(|e| e.opened).count();
        Some(opened as f32 / doc.sent.len() as f32)
    }

    fn active_campaigns(&self) -> usize {
        self.doc.lock().unwrap().active_campaigns
    }

    fn record_send(&self, email: SentEmail) {
        let mut doc = self.doc.lock().unwrap();
        doc.sent.push(email);
        self.persist(&doc);
    }

    fn has_follow_up(&self, email: &str) -> bool {
        self.doc
            .lock()
            .unwrap()
            .follow_ups
            .iter()
            .any(|s| s.contact_email.eq_ignore_ascii_case(email))
    }

    fn create_follow_up(&self, sequence: FollowUpSequence) {
        let mut doc = self.doc.lock().unwrap();
        if doc.follow_ups.iter().any(|s| s.contact_email.eq_ignore_ascii_case(&sequence.contact_email)) {
            return;
        }
        doc.follow_ups.push(sequence);
        self.persist(&doc);
    }

    fn hot_leads(&self, min_opens: u32) -> Vec<String> {
        self.doc
            .lock()
            .unwrap()
            .sent
            .iter()
            .filter(|e| e.open_count >= min_opens)
            .map(|e| e.to.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn send(to: &str, opened: bool, open_count: u32) -> SentEmail {
        SentEmail {
            to: to.to_string(),
            subject: "Objet".to_string(),
            sent_at: Utc::now(),
            opened,
            open_count,
            campaign: None,
        }
    }

    #[test]
    fn test_open_rate_and_hot_leads() {
        let temp = TempDir::new().unwrap();
        let store = JsonMailerStore::open(temp.path());
        assert!(store.open_rate().is_none());

        store.record_send(send("a@b.com", true, 4));
        store.record_send(send("c@d.com", false, 0));
        assert_eq!(store.open_rate(), Some(0.5));
        assert_eq!(store.hot_leads(3), vec!["a@b.com"]);
    }

    #[test]
    fn test_follow_up_dedup_and_persistence() {
        let temp = TempDir::new().unwrap();
        {
            let store = JsonMailerStore::open(temp.path());
            let sequence = FollowUpSequence {
                contact_email: "a@b.com".to_string(),
                steps: vec![],
                created_at: Utc::now(),
            };
            store.create_follow_up(sequence.clone());
            store.create_follow_up(sequence);
        }
        let store = JsonMailerStore::open(temp.path());
        assert!(store.has_follow_up("A@B.com"));
        assert_eq!(store.doc.lock().unwrap().follow_ups.len(), 1);
    }
}

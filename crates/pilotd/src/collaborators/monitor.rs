//! Monitoring skill store - articles, trends, market signals, watches.
//!
//! The monitoring skill's collectors write this document; the pilot reads
//! it for its state snapshot and light-cycle signal boosts, and appends
//! watches when criteria or CRM deals reference unmonitored names.

use crate::services::{Article, MarketSignal, MonitorStore, Trend, Watch, WatchKind};
use pilot_common::store::atomic_write_str;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

const MONITOR_FILE: &str = "monitoring.json";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
struct MonitorDocument {
    articles: Vec<Article>,
    trends: Vec<Trend>,
    signals: Vec<MarketSignal>,
    watches: Vec<Watch>,
    competitive_digest: Option<String>,
}

pub struct JsonMonitorStore {
    path: PathBuf,
    doc: Mutex<MonitorDocument>,
}

impl JsonMonitorStore {
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(MONITOR_FILE);
        let doc = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { path, doc: Mutex::new(doc) }
    }

    fn persist(&self, doc: &MonitorDocument) {
        match serde_json::to_string_pretty(doc) {
            Ok(json) => {
                if let Err(e) = atomic_write_str(&self.path, &json) {
                    warn!("Failed to persist monitoring store: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize monitoring store: {}", e),
        }
    }
}

impl MonitorStore for JsonMonitorStore {
    fn recent_articles(&self, min_relevance: f32, limit: usize) -> Vec<Article> {
        self.doc
            .lock()
            .unwrap()
            .articles
            .iter()
            .filter(|a| a.relevance >= min_relevance)
            .take(limit)
            .cloned()
            .collect()
    }

    fn articles_about(&self, company: &str, limit: usize) -> Vec<Article> {
        self.doc
            .lock()
            .unwrap()
            .articles
            .iter()
            .filter(|a| a.company.as_deref().map(|c| c.eq_ignore_ascii_case(company)).unwrap_or(false))
            .take(limit)
            .cloned()
            .collect()
    }

    fn trends(&self) -> Vec<Trend> {
        self.doc.lock().unwrap().trends.clone()
    }

    fn market_signals(&self) -> Vec<MarketSignal> {
        self.doc.lock().unwrap().signals.clone()
    }

    fn competitive_digest(&self) -> Option<String> {
        self.doc.lock().unwrap().competitive_digest.clone()
    }

    fn watches(&self) -> Vec<Watch> {
        self.doc.lock().unwrap().watches.clone()
    }

    fn create_watch(&self, name: &str, kind: WatchKind) {
        let mut doc = self.doc.lock().unwrap();
        if doc.watches.iter().any(|w| w.name.eq_ignore_ascii_case(name)) {
            return;
        }
        doc.watches.push(Watch { name: name.to_string(), kind });
        self.persist(&doc);
    }
}

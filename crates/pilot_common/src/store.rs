//! Persistent store for the pilot state document.
//!
//! One JSON document per pilot instance, atomically rewritten on every
//! mutation (temp file + rename, so a crash mid-write never corrupts it).
//! Loading applies the ordered migration list for older documents, then
//! serde defaults fill any still-missing section; migration is additive,
//! never destructive. A missing or corrupt file resets to defaults and is
//! persisted immediately rather than crashing the daemon.

use crate::actions::{Action, CriteriaUpdate, ExecutionOutcome, GoalsUpdate};
use crate::state::*;
use chrono::Utc;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const STATE_FILE: &str = "pilot_state.json";

/// Write data to a file atomically using temp file + rename.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;

    fs::rename(&temp_path, path)
}

/// Write string data atomically.
pub fn atomic_write_str(path: &Path, data: &str) -> io::Result<()> {
    atomic_write(path, data.as_bytes())
}

/// One additive schema upgrade. Receives the raw document as it was written
/// by version N and must leave it readable as version N+1.
type Migration = fn(&mut Value);

/// Ordered migrations; index 0 upgrades version 1 to 2.
const MIGRATIONS: &[Migration] = &[migrate_v1_to_v2, migrate_v2_to_v3];

/// v2 introduced the per-category learnings layout; older documents kept a
/// single flat list which nothing reads anymore, so it is left in place and
/// the new sections start empty via defaults.
fn migrate_v1_to_v2(doc: &mut Value) {
    if let Some(obj) = doc.as_object_mut() {
        if !obj.contains_key("learnings") {
            obj.insert("learnings".to_string(), serde_json::json!({}));
        }
    }
}

/// v3 introduced the criteria adjustment audit log and the processed-signal
/// set for the light cycle.
fn migrate_v2_to_v3(doc: &mut Value) {
    if let Some(obj) = doc.as_object_mut() {
        obj.entry("criteria_adjustments").or_insert_with(|| serde_json::json!([]));
        obj.entry("processed_signals").or_insert_with(|| serde_json::json!([]));
    }
}

/// Owns the state document and its path. All mutation goes through the
/// accessor methods below; each one is a synchronous
/// read-modify-write-save unit. Share it behind a mutex; the single-owner
/// assumption is per process, not per thread.
pub struct PilotStore {
    path: PathBuf,
    state: PilotState,
}

impl PilotStore {
    /// Open (or create) the store under `data_dir`.
    pub fn open(data_dir: &Path) -> Self {
        let path = data_dir.join(STATE_FILE);
        let state = Self::load_from(&path);
        let mut store = Self { path, state };
        store.apply_invariants();
        // Persist immediately so migrations and defaulting happen once
        store.persist();
        store
    }

    fn load_from(path: &Path) -> PilotState {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Self::fresh_state();
            }
            Err(e) => {
                warn!("Failed to read {}: {} - resetting to defaults", path.display(), e);
                return Self::fresh_state();
            }
        };

        let mut doc: Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                warn!("Corrupt state document {}: {} - resetting to defaults", path.display(), e);
                return Self::fresh_state();
            }
        };

        let version = doc.get("version").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
        if version < STATE_VERSION {
            for (i, migration) in MIGRATIONS.iter().enumerate() {
                let from = i as u32 + 1;
                if version <= from {
                    migration(&mut doc);
                }
            }
            info!("Migrated state document v{} -> v{}", version, STATE_VERSION);
        }

        match serde_json::from_value::<PilotState>(doc) {
            Ok(mut state) => {
                state.version = STATE_VERSION;
                state
            }
            Err(e) => {
                warn!("Unreadable state document after migration: {} - resetting to defaults", e);
                Self::fresh_state()
            }
        }
    }

    fn fresh_state() -> PilotState {
        PilotState { version: STATE_VERSION, ..Default::default() }
    }

    /// Invariants re-established on every load, whatever the document said.
    fn apply_invariants(&mut self) {
        if self.state.config.email_preferences.forbidden_words.is_empty() {
            self.state.config.email_preferences.forbidden_words =
                EmailPreferences::default_forbidden_words();
        }
        if self.state.progress.week_start.is_none() {
            self.state.progress.week_start = Some(week_start_of(Utc::now()));
        }
    }

    /// Write failures are logged and swallowed; in-memory state stays
    /// authoritative for the rest of the process lifetime.
    fn persist(&self) {
        match serde_json::to_string_pretty(&self.state) {
            Ok(json) => {
                if let Err(e) = atomic_write_str(&self.path, &json) {
                    warn!("Failed to persist pilot state: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize pilot state: {}", e),
        }
    }

    pub fn state(&self) -> &PilotState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Config
    // ------------------------------------------------------------------

    /// Apply a closure to the config, logging any lifecycle transition the
    /// table does not allow (forced, never blocked).
    pub fn update_config(&mut self, f: impl FnOnce(&mut PilotConfig)) {
        let before = self.state.lifecycle();
        f(&mut self.state.config);
        let after = self.state.lifecycle();
        if before != after && !Lifecycle::transition_allowed(before, after) {
            warn!("Forced lifecycle transition {} -> {}", before.as_str(), after.as_str());
        }
        self.apply_invariants();
        self.persist();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.update_config(|c| c.enabled = enabled);
    }

    // ------------------------------------------------------------------
    // Goals & criteria
    // ------------------------------------------------------------------

    /// Whitelist-filtered partial update; returns false when nothing applied.
    pub fn update_weekly_goals(&mut self, updates: &GoalsUpdate) -> bool {
        if updates.is_empty() {
            return false;
        }
        let weekly = &mut self.state.goals.weekly;
        if let Some(v) = updates.leads_to_find {
            weekly.leads_to_find = v;
        }
        if let Some(v) = updates.emails_to_send {
            weekly.emails_to_send = v;
        }
        if let Some(v) = updates.responses_target {
            weekly.responses_target = v;
        }
        if let Some(v) = updates.rdv_target {
            weekly.rdv_target = v;
        }
        if let Some(v) = updates.min_open_rate {
            weekly.min_open_rate = v;
        }
        if let Some(v) = updates.min_lead_score {
            weekly.min_lead_score = v;
        }
        if let Some(v) = updates.push_to_crm_above_score {
            weekly.push_to_crm_above_score = v;
        }
        self.persist();
        true
    }

    /// Whitelist-filtered partial update; returns false when nothing applied.
    pub fn update_search_criteria(&mut self, updates: &CriteriaUpdate) -> bool {
        if updates.is_empty() {
            return false;
        }
        let criteria = &mut self.state.goals.search_criteria;
        if let Some(v) = &updates.titles {
            criteria.titles = v.clone();
        }
        if let Some(v) = &updates.locations {
            criteria.locations = v.clone();
        }
        if let Some(v) = &updates.seniorities {
            criteria.seniorities = v.clone();
        }
        if let Some(v) = &updates.industries {
            criteria.industries = v.clone();
        }
        if let Some(v) = &updates.keywords {
            criteria.keywords = Some(v.clone());
        }
        if let Some(v) = &updates.company_size {
            criteria.company_size = v.clone();
        }
        if let Some(v) = updates.limit {
            criteria.limit = Some(v);
        }
        self.persist();
        true
    }

    /// Direct criteria mutation used by the auto-adjustment pass; the caller
    /// is responsible for having recorded the adjustment first.
    pub fn with_criteria(&mut self, f: impl FnOnce(&mut SearchCriteria)) {
        f(&mut self.state.goals.search_criteria);
        self.persist();
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    pub fn increment_progress(&mut self, counter: ProgressCounter, by: u32) {
        let progress = &mut self.state.progress;
        match counter {
            ProgressCounter::LeadsFound => progress.leads_found_this_week += by,
            ProgressCounter::EmailsSent => progress.emails_sent_this_week += by,
            ProgressCounter::Responses => progress.responses_this_week += by,
            ProgressCounter::Rdv => progress.rdv_this_week += by,
        }
        self.persist();
    }

    /// Pin the current week's anchor date. Normal operation derives it from
    /// the clock; state imports and tests need to set it explicitly.
    pub fn set_week_start(&mut self, at: chrono::DateTime<Utc>) {
        self.state.progress.week_start = Some(at);
        self.persist();
    }

    /// Archive the outgoing week into `learnings.weekly_performance`, then
    /// zero every counter. Returns the archived snapshot.
    pub fn reset_weekly_progress(&mut self) -> WeeklySnapshot {
        let snapshot = WeeklySnapshot {
            progress: self.state.progress.clone(),
            goals: self.state.goals.weekly.clone(),
            archived_at: Utc::now(),
        };
        self.state.learnings.weekly_performance.insert(0, snapshot.clone());
        self.state.learnings.weekly_performance.truncate(WEEKLY_PERFORMANCE_CAP);
        self.state.progress = Progress::zeroed(week_start_of(Utc::now()));
        self.state.stats.total_weekly_resets += 1;
        self.persist();
        snapshot
    }

    // ------------------------------------------------------------------
    // Action queue & history
    // ------------------------------------------------------------------

    /// Queue an action for operator confirmation; returns its id.
    pub fn add_to_queue(&mut self, action: Action) -> String {
        let entry = ActionQueueEntry {
            id: uuid::Uuid::new_v4().to_string(),
            preview: action.preview(),
            action,
            status: QueueStatus::Pending,
            created_at: Utc::now(),
            confirmed_at: None,
            executed_at: None,
            result: None,
        };
        let id = entry.id.clone();
        self.state.action_queue.push(entry);
        self.persist();
        id
    }

    /// Move a queue entry to a new status. Terminal entries keep living in
    /// the queue vector but no longer count as pending; the queue itself is
    /// bounded like the history.
    pub fn update_queue_entry(
        &mut self,
        id: &str,
        status: QueueStatus,
        result: Option<ExecutionOutcome>,
    ) -> bool {
        let now = Utc::now();
        let Some(entry) = self.state.action_queue.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        entry.status = status;
        match status {
            QueueStatus::Confirmed => entry.confirmed_at = Some(now),
            QueueStatus::Completed => entry.executed_at = Some(now),
            _ => {}
        }
        if let Some(result) = result {
            entry.result = Some(result);
        }
        // Bound the queue by dropping the oldest terminal entries
        let terminal = self.state.action_queue.iter().filter(|e| e.status.is_terminal()).count();
        if terminal > ACTION_HISTORY_CAP {
            let excess = terminal - ACTION_HISTORY_CAP;
            let mut dropped = 0;
            self.state.action_queue.retain(|e| {
                if dropped < excess && e.status.is_terminal() {
                    dropped += 1;
                    false
                } else {
                    true
                }
            });
        }
        self.persist();
        true
    }

    pub fn pending_queue_entries(&self) -> Vec<ActionQueueEntry> {
        self.state
            .action_queue
            .iter()
            .filter(|e| e.status == QueueStatus::Pending)
            .cloned()
            .collect()
    }

    /// Append to action history, most recent first, capped.
    pub fn record_action(&mut self, action: Action, auto: bool, attempts: u32, result: ExecutionOutcome) {
        let entry = ActionHistoryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            auto,
            attempts,
            result,
            executed_at: Utc::now(),
        };
        self.state.action_history.insert(0, entry);
        self.state.action_history.truncate(ACTION_HISTORY_CAP);
        self.state.stats.total_actions_executed += 1;
        self.persist();
    }

    pub fn recent_actions(&self, count: usize) -> Vec<ActionHistoryEntry> {
        self.state.action_history.iter().take(count).cloned().collect()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Merge a fresh diagnostic run into the open set: new messages are
    /// added, already-open duplicates kept, and open items no longer
    /// reproduced are marked resolved.
    pub fn merge_diagnostics(&mut self, found: Vec<DiagnosticItem>) {
        let now = Utc::now();

        for item in self.state.diagnostics.iter_mut() {
            if item.status == DiagnosticStatus::Open
                && !found.iter().any(|f| f.message == item.message)
            {
                item.status = DiagnosticStatus::Resolved;
                item.resolved_at = Some(now);
            }
        }

        for item in found {
            let already_open = self
                .state
                .diagnostics
                .iter()
                .any(|d| d.status == DiagnosticStatus::Open && d.message == item.message);
            if !already_open {
                self.state.diagnostics.push(item);
            }
        }

        // Resolved items older than the history cap are not worth keeping
        if self.state.diagnostics.len() > ACTION_HISTORY_CAP {
            self.state.diagnostics.retain(|d| d.status == DiagnosticStatus::Open);
        }
        self.persist();
    }

    /// Add a single diagnostic (from the reasoning service's plan),
    /// deduplicated by message against the open set.
    pub fn add_diagnostic_item(&mut self, item: DiagnosticItem) {
        let duplicate = self
            .state
            .diagnostics
            .iter()
            .any(|d| d.status == DiagnosticStatus::Open && d.message == item.message);
        if !duplicate {
            self.state.diagnostics.push(item);
            self.persist();
        }
    }

    // ------------------------------------------------------------------
    // Learnings & experiments
    // ------------------------------------------------------------------

    pub fn add_learning(&mut self, category: LearningCategory, learning: Learning) {
        let list = self.state.learnings.category_mut(category);
        list.insert(0, learning);
        list.truncate(LEARNING_CAP);
        self.persist();
    }

    pub fn add_experiment(&mut self, experiment: Experiment) {
        self.state.experiments.push(experiment);
        self.persist();
    }

    pub fn complete_experiment(&mut self, id: &str, results: Option<String>) -> bool {
        let Some(exp) = self.state.experiments.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        exp.status = ExperimentStatus::Completed;
        if results.is_some() {
            exp.results = results;
        }
        self.persist();
        true
    }

    // ------------------------------------------------------------------
    // Patterns & criteria audit
    // ------------------------------------------------------------------

    /// Patterns are derived state: fully replaced, never merged.
    pub fn save_patterns(&mut self, patterns: Patterns) {
        self.state.patterns = patterns;
        self.persist();
    }

    pub fn add_criteria_adjustment(&mut self, adjustment: CriteriaAdjustment) {
        self.state.criteria_adjustments.insert(0, adjustment);
        self.state.criteria_adjustments.truncate(CRITERIA_ADJUSTMENT_CAP);
        self.persist();
    }

    // ------------------------------------------------------------------
    // Prospect research cache
    // ------------------------------------------------------------------

    /// Fresh (within TTL) cached research for an email, if any.
    pub fn get_prospect_research(&self, email: &str) -> Option<&CachedResearch> {
        let key = email.to_lowercase();
        self.state.prospect_research.get(&key).filter(|cached| {
            (Utc::now() - cached.cached_at).num_days() < RESEARCH_TTL_DAYS
        })
    }

    pub fn save_prospect_research(&mut self, email: &str, research: CachedResearch) {
        let key = email.to_lowercase();
        self.state.prospect_research.insert(key, research);

        // Evict oldest entries beyond the cap, by cache timestamp
        while self.state.prospect_research.len() > RESEARCH_CACHE_CAP {
            let oldest = self
                .state
                .prospect_research
                .iter()
                .min_by_key(|(_, v)| v.cached_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    self.state.prospect_research.remove(&k);
                }
                None => break,
            }
        }
        self.persist();
    }

    // ------------------------------------------------------------------
    // Signals & stats
    // ------------------------------------------------------------------

    /// Returns true the first time a (signal, lead) pair is seen; false on
    /// replays, which callers treat as a no-op.
    pub fn mark_signal_processed(&mut self, signal_id: &str, lead_email: &str) -> bool {
        let key = format!("{}:{}", signal_id, lead_email.to_lowercase());
        let fresh = self.state.processed_signals.insert(key);
        if fresh {
            if self.state.processed_signals.len() > PROCESSED_SIGNAL_CAP {
                // BTreeSet has no age ordering; dropping the smallest keys is
                // acceptable because stale signals stop matching leads anyway
                if let Some(first) = self.state.processed_signals.iter().next().cloned() {
                    self.state.processed_signals.remove(&first);
                }
            }
            self.persist();
        }
        fresh
    }

    pub fn record_brain_cycle(&mut self, fallback: bool) {
        self.state.stats.total_brain_cycles += 1;
        if fallback {
            self.state.stats.total_fallback_plans += 1;
        }
        self.state.stats.last_brain_cycle_at = Some(Utc::now());
        self.persist();
    }

    pub fn record_light_cycle(&mut self) {
        self.state.stats.total_light_cycles += 1;
        self.persist();
    }

    pub fn record_api_call(&mut self) {
        self.state.stats.record_api_call(Utc::now());
        self.persist();
    }
}

//! Criteria auto-adjustment from mined patterns.
//!
//! Gated on full autonomy by the caller. Planning is pure: it looks at the
//! freshly computed patterns and the active criteria and produces a list of
//! adjustments, each carrying a human-readable reason quoting the observed
//! open rate and sample size. Applying them appends every adjustment to the
//! audit log before the criteria document is touched.

use pilot_common::state::{
    AdjustmentKind, CriteriaAdjustment, PatternBucket, Patterns, SearchCriteria,
};
use pilot_common::store::PilotStore;
use tracing::info;

// Policy constants, not invariants: the add/remove thresholds are asymmetric
// on purpose (adding is cheap to undo, removing throws away reach) and are
// first candidates for tuning.
pub const ADD_MIN_SAMPLES: u32 = 5;
pub const ADD_MIN_RATE: f32 = 0.20;
pub const REMOVE_MIN_SAMPLES: u32 = 20;
pub const REMOVE_MAX_RATE: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Title,
    Industry,
    City,
}

impl Dimension {
    fn label(&self) -> &'static str {
        match self {
            Dimension::Title => "titre",
            Dimension::Industry => "industrie",
            Dimension::City => "ville",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannedAdjustment {
    pub dimension: Dimension,
    pub kind: AdjustmentKind,
    pub value: String,
    pub reason: String,
}

/// Loose membership test: either string containing the other
/// (case-insensitive) counts as already present, so "CTO" does not get
/// added next to "CTO / VP Engineering".
fn contains_loosely(list: &[String], value: &str) -> bool {
    let needle = value.to_lowercase();
    list.iter().any(|existing| {
        let existing = existing.to_lowercase();
        existing.contains(&needle) || needle.contains(&existing)
    })
}

fn plan_dimension(
    dimension: Dimension,
    buckets: &[PatternBucket],
    existing: &[String],
    allow_removal: bool,
    out: &mut Vec<PlannedAdjustment>,
) {
    for bucket in buckets {
        if bucket.sends >= ADD_MIN_SAMPLES
            && bucket.open_rate >= ADD_MIN_RATE
            && !contains_loosely(existing, &bucket.value)
        {
            out.push(PlannedAdjustment {
                dimension,
                kind: AdjustmentKind::Added,
                value: bucket.value.clone(),
                reason: format!(
                    "{} \"{}\" ajoute: {}% d'ouverture sur {} envois",
                    dimension.label(),
                    bucket.value,
                    (bucket.open_rate * 100.0).round() as u32,
                    bucket.sends
                ),
            });
        }

        if allow_removal
            && bucket.sends >= REMOVE_MIN_SAMPLES
            && bucket.open_rate < REMOVE_MAX_RATE
            && contains_loosely(existing, &bucket.value)
        {
            out.push(PlannedAdjustment {
                dimension,
                kind: AdjustmentKind::Removed,
                value: bucket.value.clone(),
                reason: format!(
                    "{} \"{}\" retire: {}% d'ouverture sur {} envois",
                    dimension.label(),
                    bucket.value,
                    (bucket.open_rate * 100.0).round() as u32,
                    bucket.sends
                ),
            });
        }
    }
}

/// Compute the adjustments the patterns justify against the active criteria.
pub fn plan_adjustments(patterns: &Patterns, criteria: &SearchCriteria) -> Vec<PlannedAdjustment> {
    let mut out = Vec::new();
    plan_dimension(Dimension::Title, &patterns.titles, &criteria.titles, true, &mut out);
    plan_dimension(Dimension::Industry, &patterns.industries, &criteria.industries, true, &mut out);
    // Cities are only ever added: a low-performing city still buys reach
    plan_dimension(Dimension::City, &patterns.cities, &criteria.locations, false, &mut out);
    out
}

/// Apply planned adjustments: audit entry first, then the mutation.
pub fn apply_adjustments(store: &mut PilotStore, planned: &[PlannedAdjustment]) {
    for adjustment in planned {
        info!("Criteria auto-adjustment: {}", adjustment.reason);
        store.add_criteria_adjustment(CriteriaAdjustment {
            action: adjustment.kind,
            value: adjustment.value.clone(),
            reason: adjustment.reason.clone(),
            adjusted_at: chrono::Utc::now(),
        });

        let value = adjustment.value.clone();
        let kind = adjustment.kind;
        let dimension = adjustment.dimension;
        store.with_criteria(|criteria| {
            let list = match dimension {
                Dimension::Title => &mut criteria.titles,
                Dimension::Industry => &mut criteria.industries,
                Dimension::City => &mut criteria.locations,
            };
            match kind {
                AdjustmentKind::Added => {
                    if !contains_loosely(list, &value) {
                        list.push(value.clone());
                    }
                }
                AdjustmentKind::Removed => {
                    let needle = value.to_lowercase();
                    list.retain(|existing| {
                        let existing = existing.to_lowercase();
                        !(existing.contains(&needle) || needle.contains(&existing))
                    });
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(value: &str, sends: u32, open_rate: f32) -> PatternBucket {
        PatternBucket {
            value: value.to_string(),
            sends,
            opens: (sends as f32 * open_rate).round() as u32,
            open_rate,
        }
    }

    fn patterns_with_titles(titles: Vec<PatternBucket>) -> Patterns {
        Patterns { titles, ..Default::default() }
    }

    #[test]
    fn test_strong_performer_gets_added() {
        let patterns = patterns_with_titles(vec![bucket("CTO", 6, 0.35)]);
        let criteria = SearchCriteria::default();
        let planned = plan_adjustments(&patterns, &criteria);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].kind, AdjustmentKind::Added);
        assert!(planned[0].reason.contains("35%"));
        assert!(planned[0].reason.contains("6 envois"));
    }

    #[test]
    fn test_thresholds_are_exact() {
        // 4 samples: one short of the add threshold
        let planned = plan_adjustments(
            &patterns_with_titles(vec![bucket("CTO", 4, 0.5)]),
            &SearchCriteria::default(),
        );
        assert!(planned.is_empty());

        // 19% open rate: just under
        let planned = plan_adjustments(
            &patterns_with_titles(vec![bucket("CTO", 10, 0.19)]),
            &SearchCriteria::default(),
        );
        assert!(planned.is_empty());

        // Exactly at the thresholds: fires
        let planned = plan_adjustments(
            &patterns_with_titles(vec![bucket("CTO", 5, 0.20)]),
            &SearchCriteria::default(),
        );
        assert_eq!(planned.len(), 1);
    }

    #[test]
    fn test_loose_match_prevents_duplicate_add() {
        let patterns = patterns_with_titles(vec![bucket("CTO", 10, 0.4)]);
        let criteria = SearchCriteria {
            titles: vec!["CTO / VP Engineering".to_string()],
            ..Default::default()
        };
        assert!(plan_adjustments(&patterns, &criteria).is_empty());
    }

    #[test]
    fn test_weak_performer_gets_removed() {
        let patterns = patterns_with_titles(vec![bucket("Office Manager", 25, 0.04)]);
        let criteria = SearchCriteria {
            titles: vec!["Office Manager".to_string(), "CTO".to_string()],
            ..Default::default()
        };
        let planned = plan_adjustments(&patterns, &criteria);
        assert_eq!(planned.len(), 1);
        assert_eq!(planned[0].kind, AdjustmentKind::Removed);

        // 19 samples is not enough evidence to remove
        let patterns = patterns_with_titles(vec![bucket("Office Manager", 19, 0.0)]);
        assert!(plan_adjustments(&patterns, &criteria).is_empty());
    }

    #[test]
    fn test_cities_are_never_removed() {
        let patterns = Patterns {
            cities: vec![bucket("Limoges", 30, 0.0)],
            ..Default::default()
        };
        let criteria =
            SearchCriteria { locations: vec!["Limoges".to_string()], ..Default::default() };
        assert!(plan_adjustments(&patterns, &criteria).is_empty());
    }

    #[test]
    fn test_apply_writes_audit_before_mutation() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut store = PilotStore::open(temp.path());

        let planned = vec![PlannedAdjustment {
            dimension: Dimension::Title,
            kind: AdjustmentKind::Added,
            value: "CTO".to_string(),
            reason: "titre \"CTO\" ajoute: 40% d'ouverture sur 10 envois".to_string(),
        }];
        apply_adjustments(&mut store, &planned);

        assert_eq!(store.state().criteria_adjustments.len(), 1);
        assert!(store.state().criteria_adjustments[0].reason.contains("40%"));
        assert!(store.state().goals.search_criteria.titles.contains(&"CTO".to_string()));
    }

    #[test]
    fn test_apply_removal() {
        let temp = tempfile::TempDir::new().unwrap();
        let mut store = PilotStore::open(temp.path());
        store.with_criteria(|c| c.titles = vec!["Office Manager".to_string(), "CTO".to_string()]);

        apply_adjustments(
            &mut store,
            &[PlannedAdjustment {
                dimension: Dimension::Title,
                kind: AdjustmentKind::Removed,
                value: "Office Manager".to_string(),
                reason: "titre \"Office Manager\" retire: 4% d'ouverture sur 25 envois".to_string(),
            }],
        );

        assert_eq!(store.state().goals.search_criteria.titles, vec!["CTO".to_string()]);
        assert_eq!(store.state().criteria_adjustments.len(), 1);
    }
}

//! Pattern mining over historical sends.
//!
//! Joins every sent email against the enrichment subsystem's stored
//! classification (by recipient, lowercased) and against the mailer's own
//! open flags, then buckets performance by job title, industry, city,
//! subject style and send hour. Buckets need at least two samples before
//! they mean anything; the top bucket per dimension becomes the "best"
//! value the criteria auto-adjustment feeds on.

use crate::services::{Classification, SentEmail};
use chrono::Timelike;
use pilot_common::state::{BestPatterns, PatternBucket, Patterns};
use std::collections::HashMap;

/// Below this many sends there is nothing to mine.
pub const MIN_SENDS: usize = 3;
/// Buckets with fewer samples than this are noise.
pub const MIN_BUCKET_SAMPLES: u32 = 2;

/// Subject style category, derived from the subject line alone.
pub fn subject_style(subject: &str) -> &'static str {
    let trimmed = subject.trim();
    let lower = trimmed.to_lowercase();
    if lower.starts_with("re:") || lower.starts_with("fwd:") || lower.starts_with("tr:") {
        "relance"
    } else if trimmed.contains('?') {
        "question"
    } else if trimmed.chars().any(|c| c.is_ascii_digit()) {
        "chiffres"
    } else if trimmed.chars().count() < 30 {
        "court"
    } else if trimmed.chars().count() > 60 {
        "long"
    } else {
        "standard"
    }
}

struct Tally {
    sends: u32,
    opens: u32,
}

fn bucketize(counts: HashMap<String, Tally>) -> Vec<PatternBucket> {
    let mut buckets: Vec<PatternBucket> = counts
        .into_iter()
        .filter(|(_, tally)| tally.sends >= MIN_BUCKET_SAMPLES)
        .map(|(value, tally)| PatternBucket {
            value,
            sends: tally.sends,
            opens: tally.opens,
            open_rate: tally.opens as f32 / tally.sends as f32,
        })
        .collect();
    buckets.sort_by(|a, b| {
        b.open_rate
            .partial_cmp(&a.open_rate)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.sends.cmp(&a.sends))
    });
    buckets
}

fn tally(counts: &mut HashMap<String, Tally>, key: Option<String>, opened: bool) {
    let Some(key) = key.filter(|k| !k.is_empty()) else {
        return;
    };
    let entry = counts.entry(key).or_insert(Tally { sends: 0, opens: 0 });
    entry.sends += 1;
    if opened {
        entry.opens += 1;
    }
}

/// Mine patterns from sent emails. `classify` looks up the stored
/// classification for a recipient; recipients without one still count for
/// the subject-style and send-hour dimensions.
pub fn analyze_patterns(
    sent: &[SentEmail],
    classify: impl Fn(&str) -> Option<Classification>,
) -> Option<Patterns> {
    if sent.len() < MIN_SENDS {
        return None;
    }

    let mut titles = HashMap::new();
    let mut industries = HashMap::new();
    let mut cities = HashMap::new();
    let mut styles = HashMap::new();
    let mut hours = HashMap::new();

    for email in sent {
        let classification = classify(&email.to.to_lowercase());
        if let Some(c) = &classification {
            tally(&mut titles, c.job_title.clone(), email.opened);
            tally(&mut industries, c.industry.clone(), email.opened);
            tally(&mut cities, c.city.clone(), email.opened);
        }
        tally(&mut styles, Some(subject_style(&email.subject).to_string()), email.opened);
        tally(&mut hours, Some(email.sent_at.hour().to_string()), email.opened);
    }

    let titles = bucketize(titles);
    let industries = bucketize(industries);
    let cities = bucketize(cities);
    let subject_styles = bucketize(styles);
    let send_hours = bucketize(hours);

    let best = BestPatterns {
        title: titles.first().map(|b| b.value.clone()),
        industry: industries.first().map(|b| b.value.clone()),
        city: cities.first().map(|b| b.value.clone()),
        subject_style: subject_styles.first().map(|b| b.value.clone()),
        send_hour: send_hours.first().and_then(|b| b.value.parse().ok()),
    };

    Some(Patterns {
        computed_at: Some(chrono::Utc::now()),
        sample_size: sent.len() as u32,
        titles,
        industries,
        cities,
        subject_styles,
        send_hours,
        best,
    })
}

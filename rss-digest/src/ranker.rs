use crate::rss_utils::time::hours_between;
use crate::types::Item;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Score components of one item at a given instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub time_score: f64,
    pub priority_score: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.time_score + self.priority_score
    }
}

/// 100 at publication, minus 10 per elapsed day, never below 0.
/// Items dated in the future score above 100.
pub fn time_score(published: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let hours = hours_between(published, now);
    (100.0 - (hours / 24.0) * 10.0).max(0.0)
}

pub fn priority_score(priority: u32) -> f64 {
    match priority {
        1 => 50.0,
        2 => 30.0,
        3 => 10.0,
        _ => 0.0,
    }
}

pub fn score(item: &Item, now: DateTime<Utc>) -> ScoreBreakdown {
    ScoreBreakdown {
        time_score: time_score(item.published, now),
        priority_score: priority_score(item.priority),
    }
}

/// Orders the merged items of a run and caps the result.
#[derive(Debug, Clone, Copy)]
pub struct Ranker {
    max_total: usize,
}

impl Ranker {
    pub fn new(max_total: usize) -> Self {
        Self { max_total }
    }

    /// Highest score first; ties go to the newer item, then to the lower
    /// source identifier.
    pub fn rank(&self, items: Vec<Item>, now: DateTime<Utc>) -> Vec<Item> {
        let mut scored: Vec<(f64, Item)> = items
            .into_iter()
            .map(|item| (score(&item, now).total(), item))
            .collect();

        scored.sort_by(|(score_a, a), (score_b, b)| compare(*score_a, a, *score_b, b));
        scored.truncate(self.max_total);
        scored.into_iter().map(|(_, item)| item).collect()
    }
}

fn compare(score_a: f64, a: &Item, score_b: f64, b: &Item) -> Ordering {
    score_b
        .total_cmp(&score_a)
        .then_with(|| b.published.cmp(&a.published))
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.fingerprint.cmp(&b.fingerprint))
}

//! Candidate ranking heuristics. All scores are in 0..1.

use std::collections::HashSet;

const PROVIDER_WEIGHT: f64 = 0.6;
const TITLE_WEIGHT: f64 = 0.3;
const YEAR_WEIGHT: f64 = 0.1;

pub fn normalize_title(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Jaccard overlap of the whitespace-separated token sets
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (normalize_title(a), normalize_title(b));
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: HashSet<&str> = a.split(' ').collect();
    let b: HashSet<&str> = b.split(' ').collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// 1.0 exact, 0.7 one year off, 0.4 two years off, else 0.
/// Unknown (or zero) years score 0.
pub fn year_proximity(target: Option<i32>, candidate: Option<i32>) -> f64 {
    match (target.filter(|y| *y != 0), candidate.filter(|y| *y != 0)) {
        (Some(target), Some(candidate)) => match (target - candidate).abs() {
            0 => 1.0,
            1 => 0.7,
            2 => 0.4,
            _ => 0.0,
        },
        _ => 0.0,
    }
}

pub fn aggregate_score(provider_score: f64, title_score: f64, year_score: f64) -> f64 {
    provider_score * PROVIDER_WEIGHT + title_score * TITLE_WEIGHT + year_score * YEAR_WEIGHT
}

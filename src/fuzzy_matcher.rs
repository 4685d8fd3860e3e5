//! Closest-column suggestion for misspelled column references.
//!
//! Generated scripts routinely misspell column names; attaching the closest
//! real column to the error message gives the repair prompt something
//! concrete to act on.

use strsim::jaro_winkler;

/// Similarity threshold below which no suggestion is offered.
const SUGGESTION_THRESHOLD: f64 = 0.72;

fn normalize(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Best-scoring candidate above the threshold, if any.
pub fn closest_column<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let target = normalize(name);
    let mut best: Option<(f64, &str)> = None;
    for candidate in candidates {
        let score = jaro_winkler(&target, &normalize(candidate));
        if score >= SUGGESTION_THRESHOLD {
            match best {
                Some((best_score, _)) if best_score >= score => {}
                _ => best = Some((score, candidate)),
            }
        }
    }
    best.map(|(_, name)| name.to_string())
}

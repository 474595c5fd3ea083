//! Input validation and intent detection for agent ergonomics.
//!
//! Provides O(1) validation sets and synonym maps so agents can use
//! natural language for sources and table names. Three-tier resolution:
//! exact match → synonym lookup → error with suggestion.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

// ── Valid value sets (O(1) lookups) ──────────────────────────

pub static VALID_SOURCES: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["llm", "mcp", "api"].into_iter().collect());

pub static VALID_TABLES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    [
        "fields",
        "views",
        "objects",
        "applications",
        "themes",
        "decision_tables",
    ]
    .into_iter()
    .collect()
});

// ── Synonym maps (agent typo recovery) ───────────────────────

pub static SOURCE_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("agent", "llm"),
        ("model", "llm"),
        ("assistant", "llm"),
        ("server", "mcp"),
        ("bridge", "mcp"),
        ("rest", "api"),
        ("http", "api"),
        ("manual", "api"),
    ]
    .into_iter()
    .collect()
});

pub static TABLE_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("field", "fields"),
        ("column", "fields"),
        ("view", "views"),
        ("screen", "views"),
        ("page", "views"),
        ("object", "objects"),
        ("workflow", "objects"),
        ("entity", "objects"),
        ("application", "applications"),
        ("app", "applications"),
        ("theme", "themes"),
        ("decision_table", "decision_tables"),
        ("table", "decision_tables"),
        ("rules", "decision_tables"),
    ]
    .into_iter()
    .collect()
});

/// Normalize a checkpoint source string via exact match or synonym lookup.
///
/// Returns the canonical source, or an error with the original input
/// and an optional suggestion.
pub fn normalize_source(input: &str) -> Result<String, (String, Option<String>)> {
    let lower = input.to_lowercase();

    // Tier 1: exact match
    if VALID_SOURCES.contains(lower.as_str()) {
        return Ok(lower);
    }

    // Tier 2: synonym lookup
    if let Some(&canonical) = SOURCE_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    // Tier 3: find closest suggestion
    let suggestion = find_closest_match(&lower, &VALID_SOURCES, &SOURCE_SYNONYMS);
    Err((input.to_string(), suggestion))
}

/// Normalize an entity table name via exact match or synonym lookup.
pub fn normalize_table(input: &str) -> Result<String, (String, Option<String>)> {
    let lower = input.to_lowercase();

    if VALID_TABLES.contains(lower.as_str()) {
        return Ok(lower);
    }

    if let Some(&canonical) = TABLE_SYNONYMS.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }

    let suggestion = find_closest_match(&lower, &VALID_TABLES, &TABLE_SYNONYMS);
    Err((input.to_string(), suggestion))
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;

    for &v in valid.iter().chain(synonyms.keys()) {
        let dist = levenshtein_distance(input, v);
        if dist <= 3 {
            if best.is_none() || dist < best.unwrap().1 {
                // For synonyms, show what it maps to
                if let Some(&canonical) = synonyms.get(v) {
                    best = Some((canonical, dist));
                } else {
                    best = Some((v, dist));
                }
            }
        }
    }

    best.map(|(v, _)| v.to_string())
}

// ── Levenshtein distance ─────────────────────────────────────

/// Compute the Levenshtein edit distance between two strings.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let a_len = a.len();
    let b_len = b.len();

    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    // Use single-row optimization (O(min(m,n)) space)
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for i in 1..=a_len {
        curr[0] = i;
        for j in 1..=b_len {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1) // deletion
                .min(curr[j - 1] + 1) // insertion
                .min(prev[j - 1] + cost); // substitution
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Find existing IDs similar to the searched ID.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| (levenshtein_distance(searched, id), id.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)));

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}

//! Dotted version string comparison.
//!
//! Compares versions like "1.2.0" segment by segment as non-negative
//! integers. Segment counts may differ; missing segments count as 0.
//! Non-numeric segments also count as 0 — that is deliberate policy, not
//! silent failure: a malformed remote version must never brick the update
//! gate, it just weakens the comparison.

use std::cmp::Ordering;

/// Three-way compare of two dotted version strings.
///
/// `compare("1.2.0", "1.10.0") == Ordering::Less`,
/// `compare("1.0", "1.0.0") == Ordering::Equal`.
pub fn compare(a: &str, b: &str) -> Ordering {
    let seg_a: Vec<u64> = a.split('.').map(parse_segment).collect();
    let seg_b: Vec<u64> = b.split('.').map(parse_segment).collect();

    let len = seg_a.len().max(seg_b.len());
    for i in 0..len {
        let x = seg_a.get(i).copied().unwrap_or(0);
        let y = seg_b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Whether `latest` is strictly newer than `current`.
pub fn is_newer(latest: &str, current: &str) -> bool {
    compare(latest, current) == Ordering::Greater
}

fn parse_segment(s: &str) -> u64 {
    s.trim().parse().unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Similar table name detection.
//!
//! Scores pairs of qualified table names with a Ratcliff/Obershelp ratio plus
//! bonuses for shared prefixes, containment and shared words, then groups
//! tables greedily in listing order.

use crate::models::{ObjectRef, SimilarGroup};
use std::collections::HashSet;

pub const DEFAULT_THRESHOLD: f64 = 0.7;
pub const MIN_THRESHOLD: f64 = 0.5;
pub const MAX_THRESHOLD: f64 = 0.9;

/// Clamp a requested threshold into the supported range.
pub fn clamp_threshold(requested: Option<f64>) -> f64 {
    match requested {
        Some(t) if t.is_finite() => t.clamp(MIN_THRESHOLD, MAX_THRESHOLD),
        _ => DEFAULT_THRESHOLD,
    }
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, size)`.
///
/// Ties resolve to the block starting earliest in `a`, then earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // lengths[j + 1] = length of the match ending at a[i], b[j]
    let mut prev = vec![0usize; bhi - blo + 1];
    for i in alo..ahi {
        let mut cur = vec![0usize; bhi - blo + 1];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                cur[j - blo + 1] = k;
                if k > best_size {
                    best_i = i + 1 - k;
                    best_j = j + 1 - k;
                    best_size = k;
                }
            }
        }
        prev = cur;
    }
    (best_i, best_j, best_size)
}

/// Total size of all matching blocks found by recursive longest-match splitting.
fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        if alo >= ahi || blo >= bhi {
            continue;
        }
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        total += k;
        queue.push((alo, i, blo, j));
        queue.push((i + k, ahi, j + k, bhi));
    }
    total
}

/// Ratcliff/Obershelp similarity in `[0, 1]`.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f64 / total as f64
}

fn alphabetic_words(s: &str) -> HashSet<&str> {
    s.split(|c: char| !c.is_ascii_alphabetic())
        .filter(|w| !w.is_empty())
        .collect()
}

/// Score two table names.
pub fn table_similarity(first: &str, second: &str) -> f64 {
    let a = first.trim().to_lowercase();
    let b = second.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let mut score = sequence_ratio(&a, &b);

    let common_prefix = a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count();
    if common_prefix > 3 {
        score += 0.1;
    }

    if a.contains(&b) || b.contains(&a) {
        score += 0.15;
    }

    let words_a = alphabetic_words(&a);
    let words_b = alphabetic_words(&b);
    if !words_a.is_empty() && !words_b.is_empty() {
        let shared = words_a.intersection(&words_b).count();
        let union = words_a.union(&words_b).count();
        if shared as f64 / union as f64 > 0.5 {
            score += 0.1;
        }
    }

    score.min(1.0)
}

/// Group tables whose qualified names score at or above `threshold`.
///
/// Each table joins at most one group, and only groups of two or more are returned.
pub fn group_similar(tables: &[ObjectRef], threshold: f64) -> Vec<SimilarGroup> {
    let names: Vec<String> = tables.iter().map(ObjectRef::qualified).collect();
    let mut taken = vec![false; names.len()];
    let mut groups = Vec::new();

    for i in 0..names.len() {
        if taken[i] {
            continue;
        }
        taken[i] = true;
        let mut group = vec![names[i].clone()];

        for j in i + 1..names.len() {
            if !taken[j] && table_similarity(&names[i], &names[j]) >= threshold {
                taken[j] = true;
                group.push(names[j].clone());
            }
        }

        if group.len() > 1 {
            groups.push(SimilarGroup { tables: group });
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sequence_ratio_matches_reference_values() {
        // difflib.SequenceMatcher(None, "abcd", "bcde").ratio() == 0.75
        assert!(close(sequence_ratio("abcd", "bcde"), 0.75));
        assert!(close(sequence_ratio("abc", "abc"), 1.0));
        assert!(close(sequence_ratio("abc", "xyz"), 0.0));
        assert!(close(sequence_ratio("", ""), 1.0));
    }

    #[test]
    fn test_identical_names_score_one() {
        assert!(close(table_similarity("dbo.Users", "dbo.users"), 1.0));
    }

    #[test]
    fn test_bonuses_raise_close_names() {
        let score = table_similarity("public.customer", "public.customers");
        assert!(score >= 0.9, "score was {score}");
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let score = table_similarity("a.x", "b.orders_archive");
        assert!(score < 0.5, "score was {score}");
    }

    #[test]
    fn test_clamp_threshold() {
        assert!(close(clamp_threshold(None), DEFAULT_THRESHOLD));
        assert!(close(clamp_threshold(Some(0.1)), MIN_THRESHOLD));
        assert!(close(clamp_threshold(Some(2.0)), MAX_THRESHOLD));
        assert!(close(clamp_threshold(Some(f64::NAN)), DEFAULT_THRESHOLD));
        assert!(close(clamp_threshold(Some(0.8)), 0.8));
    }

    #[test]
    fn test_group_similar_is_greedy_and_exclusive() {
        let tables = vec![
            ObjectRef::new("sales", "orders"),
            ObjectRef::new("sales", "orders_2023"),
            ObjectRef::new("hr", "employees"),
            ObjectRef::new("sales", "orders_backup"),
        ];
        let groups = group_similar(&tables, 0.7);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].tables[0], "sales.orders");
        assert!(groups[0].tables.contains(&"sales.orders_2023".to_string()));
        assert!(!groups[0].tables.contains(&"hr.employees".to_string()));
    }

    #[test]
    fn test_group_similar_needs_two_tables() {
        assert!(group_similar(&[ObjectRef::new("s", "t")], 0.7).is_empty());
        assert!(group_similar(&[], 0.7).is_empty());
    }
}

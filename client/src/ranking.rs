// src/ranking.rs

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::attempt::{AttemptResult, RankingEntry};

/// Aggregates graded attempts of one window into a ranking.
///
/// * Cancelled attempts and non-numeric scores are ignored.
/// * Each student keeps only their best attempt (earlier finish wins a tie).
/// * Rows are ordered by score, then finish time, then student id.
/// * Equal scores share a position (1, 2, 2, 4).
pub fn build_ranking(attempts: Vec<AttemptResult>) -> Vec<RankingEntry> {
    let mut best: HashMap<i64, AttemptResult> = HashMap::new();

    for attempt in attempts {
        if attempt.cancelled || !attempt.score.is_finite() {
            continue;
        }
        match best.get(&attempt.student_id) {
            Some(current) if compare(current, &attempt) != Ordering::Greater => {}
            _ => {
                best.insert(attempt.student_id, attempt);
            }
        }
    }

    let mut rows: Vec<AttemptResult> = best.into_values().collect();
    rows.sort_by(compare);

    let mut ranking: Vec<RankingEntry> = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let position = match ranking.last() {
            Some(prev) if prev.score == row.score => prev.position,
            _ => index as u32 + 1,
        };
        ranking.push(RankingEntry {
            position,
            student_id: row.student_id,
            student_name: row.student_name,
            score: row.score,
            finished_at: row.finished_at,
        });
    }
    ranking
}

/// `Less` means `a` ranks above `b`.
fn compare(a: &AttemptResult, b: &AttemptResult) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| match (a.finished_at, b.finished_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.student_id.cmp(&b.student_id))
}

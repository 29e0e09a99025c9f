//! Technical, originality and collaboration inputs derived from stored
//! submission records.

use crate::collaboration::analyze_chat;
use candor_common::types::{QuestionId, SubmissionRecord};
use std::collections::BTreeMap;

/// Best pass ratio per question across every attempt
///
/// Attempts with no tests are ignored; order of attempts does not matter.
pub fn best_ratios(records: &[SubmissionRecord]) -> BTreeMap<QuestionId, f64> {
    let mut best: BTreeMap<QuestionId, f64> = BTreeMap::new();
    for record in records.iter().filter(|r| r.tests_total > 0) {
        let ratio = f64::from(record.tests_passed.min(record.tests_total)) / f64::from(record.tests_total);
        let entry = best.entry(record.question_id).or_insert(0.0);
        if ratio > *entry {
            *entry = ratio;
        }
    }
    best
}

/// Average of per-question best ratios over the expected question set, 0..=100
///
/// A question never attempted contributes 0 rather than being skipped.
pub fn technical_score(records: &[SubmissionRecord], expected: &[QuestionId]) -> u32 {
    if expected.is_empty() {
        return 0;
    }
    let best = best_ratios(records);
    let total: f64 = expected
        .iter()
        .map(|id| best.get(id).copied().unwrap_or(0.0) * 100.0)
        .sum();
    (total / expected.len() as f64).round() as u32
}

/// Number of expected questions with at least one fully passing attempt
pub fn passed_questions(records: &[SubmissionRecord], expected: &[QuestionId]) -> u32 {
    expected
        .iter()
        .filter(|id| records.iter().any(|r| r.question_id == **id && r.is_passed))
        .count() as u32
}

/// Typed share of all editor characters, 0..=100; 100 when nothing was recorded
pub fn originality_ratio(records: &[SubmissionRecord]) -> u32 {
    let typed: u64 = records.iter().map(|r| r.char_breakdown.typed).sum();
    let pasted: u64 = records.iter().map(|r| r.char_breakdown.pasted).sum();
    let total = typed + pasted;
    if total == 0 {
        return 100;
    }
    (typed as f64 / total as f64 * 100.0).round() as u32
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collaboration {
    pub chat_response: Option<String>,
    pub teamwork_score: u32,
}

/// Teamwork signal from the first submission carrying a chat reply
pub fn collaboration(records: &[SubmissionRecord]) -> Collaboration {
    records
        .iter()
        .find_map(|r| {
            let reply = r.chat_response.as_deref().filter(|c| !c.trim().is_empty())?;
            let teamwork_score = r
                .teamwork_score
                .unwrap_or_else(|| analyze_chat(reply).teamwork_score);
            Some(Collaboration {
                chat_response: Some(reply.to_string()),
                teamwork_score,
            })
        })
        .unwrap_or_default()
}

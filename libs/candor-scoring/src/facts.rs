use crate::integrity::IntegritySummary;
use crate::technical::{collaboration, originality_ratio, passed_questions, technical_score};
use candor_common::types::{CandidateId, IntegrityEvent, QuestionId, ResumeFacts, SubmissionRecord};
use serde::{Deserialize, Serialize};

/// Raw per-candidate inputs as they come out of storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentInput {
    pub candidate_id: CandidateId,
    #[serde(default)]
    pub submissions: Vec<SubmissionRecord>,
    #[serde(default)]
    pub events: Vec<IntegrityEvent>,
    #[serde(default)]
    pub resume: ResumeFacts,
    /// Psychometric/behavioral score; absent or 0 means not completed
    #[serde(default)]
    pub behavioral_score: Option<u32>,
}

/// Everything the decision rules, the prompt and the cache hash look at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFacts {
    pub candidate_id: CandidateId,
    pub technical_score: u32,
    pub integrity: IntegritySummary,
    pub originality_ratio: u32,
    pub teamwork_score: u32,
    pub chat_response: Option<String>,
    pub behavioral_score: Option<u32>,
    pub submissions_count: u32,
    pub passed_submissions: u32,
    /// Submissions scored by the unsandboxed fallback backend
    #[serde(default)]
    pub unisolated_submissions: u32,
    pub resume: ResumeFacts,
}

impl CandidateFacts {
    pub fn from_input(input: &AssessmentInput, expected_question_ids: &[QuestionId]) -> Self {
        let collab = collaboration(&input.submissions);
        Self {
            candidate_id: input.candidate_id,
            technical_score: technical_score(&input.submissions, expected_question_ids),
            integrity: IntegritySummary::from_events(&input.events),
            originality_ratio: originality_ratio(&input.submissions),
            teamwork_score: collab.teamwork_score,
            chat_response: collab.chat_response,
            behavioral_score: input.behavioral_score,
            submissions_count: input.submissions.len() as u32,
            passed_submissions: passed_questions(&input.submissions, expected_question_ids),
            unisolated_submissions: input.submissions.iter().filter(|s| s.mock_mode).count() as u32,
            resume: input.resume.clone(),
        }
    }

    pub fn has_behavioral_data(&self) -> bool {
        self.behavioral_score.is_some_and(|score| score > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_facts_from_input() {
        let input: AssessmentInput = serde_json::from_value(json!({
            "candidate_id": 7,
            "submissions": [
                {"question_id": 1, "tests_passed": 2, "tests_total": 5, "is_passed": false,
                 "char_breakdown": {"typed": 30, "pasted": 70}},
                {"question_id": 1, "tests_passed": 5, "tests_total": 5, "is_passed": true,
                 "chat_response": "busy, google it"}
            ],
            "events": [
                {"event_type": "TAB_SWITCH", "severity": "LOW", "timestamp": "2026-03-01T09:00:00Z"},
                {"event_type": "MULTIPLE_FACES", "severity": "HIGH", "timestamp": "2026-03-01T09:05:00Z"}
            ],
            "resume": {"skills": ["Python"], "experience_years": 3}
        }))
        .unwrap();

        let facts = CandidateFacts::from_input(&input, &[1, 2]);

        assert_eq!(facts.technical_score, 50);
        assert_eq!(facts.passed_submissions, 1);
        assert_eq!(facts.submissions_count, 2);
        assert_eq!(facts.originality_ratio, 30);
        assert_eq!(facts.integrity.score, 88);
        assert_eq!(facts.integrity.high_severity_count, 1);
        assert_eq!(facts.teamwork_score, 10);
        assert_eq!(facts.unisolated_submissions, 0);
        assert!(!facts.has_behavioral_data());
    }

    #[test]
    fn test_mock_mode_submissions_are_counted() {
        let input: AssessmentInput = serde_json::from_value(json!({
            "candidate_id": 3,
            "submissions": [
                {"question_id": 1, "tests_passed": 5, "tests_total": 5, "is_passed": true, "mock_mode": true},
                {"question_id": 2, "tests_passed": 1, "tests_total": 5, "is_passed": false, "mock_mode": true},
                {"question_id": 2, "tests_passed": 5, "tests_total": 5, "is_passed": true}
            ]
        }))
        .unwrap();

        let facts = CandidateFacts::from_input(&input, &[1, 2]);
        assert_eq!(facts.unisolated_submissions, 2);
        assert_eq!(facts.submissions_count, 3);
    }

    #[test]
    fn test_zero_behavioral_score_is_missing() {
        let mut input: AssessmentInput = serde_json::from_value(json!({"candidate_id": 1})).unwrap();
        input.behavioral_score = Some(0);
        assert!(!CandidateFacts::from_input(&input, &[1]).has_behavioral_data());

        input.behavioral_score = Some(64);
        assert!(CandidateFacts::from_input(&input, &[1]).has_behavioral_data());
    }
}

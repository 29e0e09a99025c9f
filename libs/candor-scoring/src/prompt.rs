//! Reasoning-service prompt rendering

use crate::decision::ResumeConsistency;
use crate::error::ReasoningError;
use crate::facts::CandidateFacts;
use candor_common::types::EvidenceTag;
use handlebars::{no_escape, Handlebars};
use serde_json::json;

const TEMPLATE: &str = include_str!("../templates/rationale_prompt.hbs");

const MAX_CHAT_CHARS: usize = 400;

fn or_none(value: String) -> String {
    if value.trim().is_empty() {
        "not provided".to_string()
    } else {
        value
    }
}

pub fn render_prompt(
    facts: &CandidateFacts,
    consistency: &ResumeConsistency,
    expected_questions: usize,
) -> Result<String, ReasoningError> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(no_escape);

    let events_by_type = facts
        .integrity
        .by_event_type
        .iter()
        .map(|(event_type, count)| format!("{} x{}", event_type, count))
        .collect::<Vec<_>>()
        .join(", ");
    let chat_response = facts
        .chat_response
        .as_deref()
        .map(|reply| reply.chars().take(MAX_CHAT_CHARS).collect::<String>())
        .unwrap_or_default();
    let behavioral = match facts.behavioral_score {
        Some(score) if score > 0 => format!("{}%", score),
        _ => "not completed".to_string(),
    };
    let experience = facts
        .resume
        .experience_years
        .map(|years| format!("{} years", years))
        .unwrap_or_default();
    let consistency_reasons = if consistency.reasons.is_empty() {
        String::new()
    } else {
        format!(" ({})", consistency.reasons.join(" "))
    };
    let evidence_tags = EvidenceTag::all_variants()
        .iter()
        .map(|tag| tag.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let data = json!({
        "technical_score": facts.technical_score,
        "passed_submissions": facts.passed_submissions,
        "expected_questions": expected_questions,
        "submissions_count": facts.submissions_count,
        "unisolated_submissions": facts.unisolated_submissions,
        "integrity_score": facts.integrity.score,
        "total_events": facts.integrity.total_events,
        "high_count": facts.integrity.high_severity_count,
        "medium_count": facts.integrity.medium_severity_count,
        "low_count": facts.integrity.low_severity_count,
        "events_by_type": or_none(events_by_type),
        "originality_ratio": facts.originality_ratio,
        "teamwork_score": facts.teamwork_score,
        "chat_response": or_none(chat_response),
        "behavioral": behavioral,
        "skills": or_none(facts.resume.skills.join(", ")),
        "experience": or_none(experience),
        "consistency_flag": serde_json::to_value(consistency.flag)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        "consistency_reasons": consistency_reasons,
        "evidence_tags": evidence_tags,
    });

    handlebars
        .render_template(TEMPLATE, &data)
        .map_err(|e| ReasoningError::Prompt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{resume_consistency, Thresholds};
    use crate::integrity::IntegritySummary;
    use candor_common::types::ResumeFacts;

    fn facts() -> CandidateFacts {
        CandidateFacts {
            candidate_id: 3,
            technical_score: 40,
            integrity: IntegritySummary::default(),
            originality_ratio: 95,
            teamwork_score: 55,
            chat_response: Some("Have you tried <b>restarting</b> it?".to_string()),
            behavioral_score: None,
            submissions_count: 2,
            passed_submissions: 0,
            unisolated_submissions: 0,
            resume: ResumeFacts {
                skills: vec!["Python".to_string(), "SQL".to_string()],
                experience_years: Some(7.0),
                raw_text: String::new(),
            },
        }
    }

    #[test]
    fn test_prompt_carries_facts_unescaped() {
        let facts = facts();
        let consistency = resume_consistency(&facts, &Thresholds::default());
        let prompt = render_prompt(&facts, &consistency, 2).unwrap();

        assert!(prompt.contains("Technical score: 40% (0 of 2 questions fully passed, 2 submissions)"));
        assert!(prompt.contains("Teammate chat reply: Have you tried <b>restarting</b> it?"));
        assert!(prompt.contains("Behavioral assessment: not completed"));
        assert!(prompt.contains("Resume skills: Python, SQL"));
        assert!(prompt.contains("Resume consistency: MISMATCH (Experience claim"));
        assert!(prompt.contains("Integrity events by type: not provided"));
        assert!(prompt.contains("resume.skills, resume.experience"));
        assert!(prompt.contains("Unsandboxed submissions: 0 of 2"));
    }

    #[test]
    fn test_prompt_reports_unsandboxed_submissions() {
        let mut facts = facts();
        facts.unisolated_submissions = 2;
        let consistency = resume_consistency(&facts, &Thresholds::default());
        let prompt = render_prompt(&facts, &consistency, 2).unwrap();

        assert!(prompt.contains("Unsandboxed submissions: 2 of 2 (test results were not produced"));
    }
}

//! Deterministic decision rules
//!
//! Rules are evaluated in order and the first match wins:
//!
//! | # | condition                                        | verdict | confidence |
//! |---|--------------------------------------------------|---------|------------|
//! | 1 | HIGH events >= `high_severity_no_hire_count`     | NO_HIRE | 92         |
//! | 2 | technical >= hire min AND integrity >= hire min  | HIRE    | 85         |
//! | 3 | behavioral score missing or 0                    | REVIEW  | 60         |
//! | 4 | technical < `no_hire_max_technical`              | NO_HIRE | 80         |
//! | 5 | otherwise                                        | REVIEW  | 55         |
//!
//! Rule 1 must stay ahead of rule 4: both can hold for the same candidate.

use crate::facts::CandidateFacts;
use crate::narrative::Narrative;
use candor_common::types::{EvidenceTag, Recommendation, Statement};
use serde::{Deserialize, Serialize};

pub const HIGH_SEVERITY_NO_HIRE_COUNT: u32 = 3;
pub const HIRE_MIN_TECHNICAL: u32 = 70;
pub const HIRE_MIN_INTEGRITY: u32 = 80;
pub const NO_HIRE_MAX_TECHNICAL: u32 = 50;
pub const INFLATION_EXPERIENCE_YEARS: f64 = 5.0;
pub const MISMATCH_MAX_TECHNICAL: u32 = 60;
pub const SKILL_MISMATCH_MAX_TECHNICAL: u32 = 50;

pub const MISSING_BEHAVIORAL_CONFIDENCE_CAP: u8 = 70;
pub const MISSING_RESUME_CONFIDENCE_CAP: u8 = 60;
pub const MANY_EVENTS_THRESHOLD: u32 = 5;
pub const MANY_EVENTS_CONFIDENCE_CAP: u8 = 80;
pub const LOW_ORIGINALITY_THRESHOLD: u32 = 30;
pub const LOW_ORIGINALITY_CONFIDENCE_CAP: u8 = 75;
pub const UNISOLATED_CONFIDENCE_CAP: u8 = 75;

/// Skills whose presence on a resume implies the candidate can code
pub const HIGH_SIGNAL_SKILLS: &[&str] = &[
    "python",
    "java",
    "javascript",
    "sql",
    "c++",
    "c#",
    "fastapi",
    "react",
    "node",
    "nodejs",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high_severity_no_hire_count: u32,
    pub hire_min_technical: u32,
    pub hire_min_integrity: u32,
    pub no_hire_max_technical: u32,
    pub inflation_experience_years: f64,
    pub mismatch_max_technical: u32,
    pub skill_mismatch_max_technical: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_severity_no_hire_count: HIGH_SEVERITY_NO_HIRE_COUNT,
            hire_min_technical: HIRE_MIN_TECHNICAL,
            hire_min_integrity: HIRE_MIN_INTEGRITY,
            no_hire_max_technical: NO_HIRE_MAX_TECHNICAL,
            inflation_experience_years: INFLATION_EXPERIENCE_YEARS,
            mismatch_max_technical: MISMATCH_MAX_TECHNICAL,
            skill_mismatch_max_technical: SKILL_MISMATCH_MAX_TECHNICAL,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    HighSeverityViolations,
    StrongCandidate,
    MissingBehavioralData,
    LowTechnical,
    MixedSignals,
}

impl Rule {
    pub fn recommendation(self) -> Recommendation {
        match self {
            Rule::HighSeverityViolations | Rule::LowTechnical => Recommendation::NoHire,
            Rule::StrongCandidate => Recommendation::Hire,
            Rule::MissingBehavioralData | Rule::MixedSignals => Recommendation::Review,
        }
    }

    pub fn confidence(self) -> u8 {
        match self {
            Rule::HighSeverityViolations => 92,
            Rule::StrongCandidate => 85,
            Rule::MissingBehavioralData => 60,
            Rule::LowTechnical => 80,
            Rule::MixedSignals => 55,
        }
    }
}

/// First matching rule, in priority order
pub fn decide(facts: &CandidateFacts, thresholds: &Thresholds) -> Rule {
    if facts.integrity.high_severity_count >= thresholds.high_severity_no_hire_count {
        Rule::HighSeverityViolations
    } else if facts.technical_score >= thresholds.hire_min_technical
        && facts.integrity.score >= thresholds.hire_min_integrity
    {
        Rule::StrongCandidate
    } else if !facts.has_behavioral_data() {
        Rule::MissingBehavioralData
    } else if facts.technical_score < thresholds.no_hire_max_technical {
        Rule::LowTechnical
    } else {
        Rule::MixedSignals
    }
}

/// Lower confidence when inputs are incomplete or risky
///
/// Returns the capped value and one note per cap that applied.
pub fn apply_confidence_caps(confidence: u8, facts: &CandidateFacts) -> (u8, Vec<&'static str>) {
    let caps = [
        (
            !facts.has_behavioral_data(),
            MISSING_BEHAVIORAL_CONFIDENCE_CAP,
            "confidence capped due to missing behavioral data",
        ),
        (
            facts.resume.is_empty(),
            MISSING_RESUME_CONFIDENCE_CAP,
            "confidence capped due to missing resume data",
        ),
        (
            facts.integrity.total_events > MANY_EVENTS_THRESHOLD,
            MANY_EVENTS_CONFIDENCE_CAP,
            "confidence capped due to high integrity flags",
        ),
        (
            facts.originality_ratio < LOW_ORIGINALITY_THRESHOLD,
            LOW_ORIGINALITY_CONFIDENCE_CAP,
            "confidence capped due to low originality ratio",
        ),
        (
            facts.unisolated_submissions > 0,
            UNISOLATED_CONFIDENCE_CAP,
            "confidence capped due to unsandboxed test execution",
        ),
    ];

    let mut capped = confidence.min(100);
    let mut notes = Vec::new();
    for (applies, cap, note) in caps {
        if applies {
            capped = capped.min(cap);
            notes.push(note);
        }
    }
    (capped, notes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyFlag {
    Aligned,
    Mismatch,
}

/// Resume claims checked against assessment performance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeConsistency {
    pub flag: ConsistencyFlag,
    pub reasons: Vec<String>,
}

impl ResumeConsistency {
    pub fn is_mismatch(&self) -> bool {
        self.flag == ConsistencyFlag::Mismatch
    }
}

pub fn resume_consistency(facts: &CandidateFacts, thresholds: &Thresholds) -> ResumeConsistency {
    let weak_or_none_passed = |max_technical: u32| {
        facts.technical_score < max_technical || facts.passed_submissions == 0
    };
    let mut reasons = Vec::new();

    if facts
        .resume
        .experience_years
        .is_some_and(|years| years >= thresholds.inflation_experience_years)
        && weak_or_none_passed(thresholds.mismatch_max_technical)
    {
        reasons.push(format!(
            "Experience claim ({}+ years) does not align with low coding performance.",
            thresholds.inflation_experience_years
        ));
    }

    let lists_core_skill = facts
        .resume
        .skills
        .iter()
        .any(|skill| HIGH_SIGNAL_SKILLS.contains(&skill.trim().to_lowercase().as_str()));
    if lists_core_skill && weak_or_none_passed(thresholds.skill_mismatch_max_technical) {
        reasons.push("Resume lists core technical skills, but assessment performance is weak.".to_string());
    }

    ResumeConsistency {
        flag: if reasons.is_empty() {
            ConsistencyFlag::Aligned
        } else {
            ConsistencyFlag::Mismatch
        },
        reasons,
    }
}

/// True when a risk line already covers the resume consistency finding
pub fn mentions_consistency_risk(risks: &[Statement]) -> bool {
    risks.iter().any(|risk| {
        let text = risk.text.to_lowercase();
        text.contains("resume consistency") || text.contains("resume inflation")
    })
}

pub fn consistency_risk(consistency: &ResumeConsistency) -> Option<Statement> {
    consistency.reasons.first().map(|reason| {
        Statement::new(
            format!("Resume consistency concern: {}", reason),
            Some(EvidenceTag::ResumeExperience),
        )
    })
}

const MAX_LISTED: usize = 3;

/// Rule-based narrative with the same five-section shape as a generated one
///
/// Confidence is the rule's base value; caps are applied by the caller so
/// generated and fallback narratives are treated identically.
pub fn fallback_narrative(
    facts: &CandidateFacts,
    consistency: &ResumeConsistency,
    thresholds: &Thresholds,
) -> Narrative {
    let rule = decide(facts, thresholds);
    let recommendation = rule.recommendation();

    let mut strengths = Vec::new();
    if !facts.resume.skills.is_empty() {
        let listed: Vec<&str> = facts.resume.skills.iter().take(6).map(String::as_str).collect();
        strengths.push(Statement::new(
            format!("Resume skills include {}.", listed.join(", ")),
            Some(EvidenceTag::ResumeSkills),
        ));
    }
    strengths.push(Statement::new(
        format!(
            "Technical score of {}% with {} passed submissions.",
            facts.technical_score, facts.passed_submissions
        ),
        Some(EvidenceTag::SubmissionsTests),
    ));
    if let Some(years) = facts.resume.experience_years {
        strengths.push(Statement::new(
            format!("Estimated {} years of experience.", years),
            Some(EvidenceTag::ResumeExperience),
        ));
    }
    if facts.chat_response.is_some() && facts.teamwork_score >= 60 {
        strengths.push(Statement::new(
            format!("Helpful teammate response (teamwork score {}%).", facts.teamwork_score),
            Some(EvidenceTag::TeamworkResponse),
        ));
    }
    strengths.truncate(MAX_LISTED);

    let mut risks = Vec::new();
    if facts.unisolated_submissions > 0 {
        risks.push(Statement::new(
            format!(
                "{} of {} submissions ran without sandbox isolation; test results are less trustworthy.",
                facts.unisolated_submissions, facts.submissions_count
            ),
            Some(EvidenceTag::SubmissionsTests),
        ));
    }
    if facts.integrity.total_events > 2 {
        risks.push(Statement::new(
            format!(
                "{} integrity flags recorded ({} high severity).",
                facts.integrity.total_events, facts.integrity.high_severity_count
            ),
            Some(EvidenceTag::IntegrityFlags),
        ));
    }
    if facts.originality_ratio < LOW_ORIGINALITY_THRESHOLD {
        risks.push(Statement::new(
            format!(
                "Low originality ratio ({}%) suggests heavy copy-paste.",
                facts.originality_ratio
            ),
            Some(EvidenceTag::OriginalityRatio),
        ));
    }
    if let Some(risk) = consistency_risk(consistency) {
        risks.push(risk);
    }
    if !facts.has_behavioral_data() {
        risks.push(Statement::new(
            "Behavioral assessment was not completed.",
            Some(EvidenceTag::BehavioralScore),
        ));
    }
    if facts.chat_response.is_some() && facts.teamwork_score < 30 {
        risks.push(Statement::new(
            "Poor teamwork response.",
            Some(EvidenceTag::TeamworkResponse),
        ));
    }
    risks.truncate(MAX_LISTED);
    let no_real_risks = risks.is_empty();
    if no_real_risks {
        risks.push(Statement::new("No major risks detected.", Some(EvidenceTag::IntegrityFlags)));
    }

    let alignment = if consistency.is_mismatch() {
        "Resume claims show potential inconsistencies with assessment results."
    } else if facts.resume.is_empty() {
        "Resume data was not available for cross-checking."
    } else {
        "Resume claims appear consistent with assessment results."
    };
    let suffix = if recommendation == Recommendation::Hire && no_real_risks {
        "recommendation aligns with the observed evidence."
    } else {
        "pending review of highlighted risks."
    };
    let summary = Statement::plain(format!(
        "Overall technical performance is {}%, with integrity score {}%. {} Recommendation: {} {}",
        facts.technical_score, facts.integrity.score, alignment, recommendation, suffix
    ));

    Narrative {
        recommendation,
        confidence: rule.confidence(),
        strengths,
        risks,
        summary: Some(summary),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::IntegritySummary;
    use candor_common::types::ResumeFacts;

    fn facts(technical: u32, integrity: u32, high: u32) -> CandidateFacts {
        CandidateFacts {
            candidate_id: 1,
            technical_score: technical,
            integrity: IntegritySummary {
                score: integrity,
                total_events: high,
                high_severity_count: high,
                ..Default::default()
            },
            originality_ratio: 100,
            teamwork_score: 0,
            chat_response: None,
            behavioral_score: Some(70),
            submissions_count: 2,
            passed_submissions: 1,
            unisolated_submissions: 0,
            resume: ResumeFacts {
                skills: vec!["Go".to_string()],
                experience_years: Some(2.0),
                raw_text: "Backend engineer".to_string(),
            },
        }
    }

    #[test]
    fn test_strong_candidate_is_hire() {
        let rule = decide(&facts(85, 90, 0), &Thresholds::default());
        assert_eq!(rule, Rule::StrongCandidate);
        assert_eq!(rule.recommendation(), Recommendation::Hire);
        assert_eq!(rule.confidence(), 85);
    }

    #[test]
    fn test_strong_scores_win_over_missing_behavioral_data() {
        let mut candidate = facts(85, 90, 0);
        candidate.behavioral_score = None;
        assert_eq!(decide(&candidate, &Thresholds::default()), Rule::StrongCandidate);
    }

    #[test]
    fn test_high_severity_takes_precedence_over_low_technical() {
        let candidate = facts(20, 70, 3);
        assert_eq!(decide(&candidate, &Thresholds::default()), Rule::HighSeverityViolations);
        assert_eq!(
            decide(&candidate, &Thresholds::default()).recommendation(),
            Recommendation::NoHire
        );
    }

    #[test]
    fn test_high_severity_beats_strong_scores() {
        assert_eq!(
            decide(&facts(95, 100, 3), &Thresholds::default()),
            Rule::HighSeverityViolations
        );
    }

    #[test]
    fn test_missing_behavioral_before_low_technical() {
        let mut candidate = facts(20, 100, 0);
        candidate.behavioral_score = Some(0);
        assert_eq!(decide(&candidate, &Thresholds::default()), Rule::MissingBehavioralData);
    }

    #[test]
    fn test_low_technical_is_no_hire() {
        assert_eq!(decide(&facts(49, 100, 0), &Thresholds::default()), Rule::LowTechnical);
        assert_eq!(decide(&facts(50, 60, 0), &Thresholds::default()), Rule::MixedSignals);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let strict = Thresholds {
            hire_min_technical: 90,
            ..Thresholds::default()
        };
        assert_eq!(decide(&facts(85, 90, 0), &strict), Rule::MixedSignals);
    }

    #[test]
    fn test_confidence_caps() {
        let mut candidate = facts(85, 90, 0);
        assert_eq!(apply_confidence_caps(85, &candidate), (85, vec![]));

        candidate.behavioral_score = None;
        candidate.originality_ratio = 10;
        let (capped, notes) = apply_confidence_caps(85, &candidate);
        assert_eq!(capped, 70);
        assert_eq!(notes.len(), 2);

        candidate.resume = ResumeFacts::default();
        assert_eq!(apply_confidence_caps(85, &candidate).0, 60);

        let mut noisy = facts(85, 50, 0);
        noisy.integrity.total_events = 6;
        assert_eq!(
            apply_confidence_caps(92, &noisy),
            (80, vec!["confidence capped due to high integrity flags"])
        );
    }

    #[test]
    fn test_unsandboxed_submissions_cap_confidence() {
        let mut candidate = facts(85, 90, 0);
        candidate.unisolated_submissions = 1;
        assert_eq!(
            apply_confidence_caps(85, &candidate),
            (75, vec!["confidence capped due to unsandboxed test execution"])
        );
    }

    #[test]
    fn test_fallback_narrative_flags_unsandboxed_submissions() {
        let mut candidate = facts(85, 90, 0);
        candidate.unisolated_submissions = 1;
        candidate.integrity.total_events = 4;
        candidate.originality_ratio = 10;
        candidate.behavioral_score = None;
        let consistency = resume_consistency(&candidate, &Thresholds::default());
        let narrative = fallback_narrative(&candidate, &consistency, &Thresholds::default());

        assert_eq!(narrative.risks.len(), 3);
        assert_eq!(
            narrative.risks[0],
            Statement::new(
                "1 of 2 submissions ran without sandbox isolation; test results are less trustworthy.",
                Some(EvidenceTag::SubmissionsTests)
            )
        );
    }

    #[test]
    fn test_resume_consistency_experience_inflation() {
        let mut candidate = facts(55, 100, 0);
        candidate.resume.experience_years = Some(5.0);
        let consistency = resume_consistency(&candidate, &Thresholds::default());

        assert_eq!(consistency.flag, ConsistencyFlag::Mismatch);
        assert_eq!(consistency.reasons.len(), 1);
        assert!(consistency.reasons[0].starts_with("Experience claim"));
    }

    #[test]
    fn test_resume_consistency_skills_with_nothing_passed() {
        let mut candidate = facts(75, 100, 0);
        candidate.resume.skills = vec!["Python ".to_string()];
        candidate.passed_submissions = 0;
        let consistency = resume_consistency(&candidate, &Thresholds::default());

        assert!(consistency.is_mismatch());
        assert!(consistency.reasons[0].contains("core technical skills"));
    }

    #[test]
    fn test_resume_consistency_aligned() {
        let mut candidate = facts(75, 100, 0);
        candidate.resume.skills = vec!["SQL".to_string()];
        candidate.resume.experience_years = Some(8.0);
        let consistency = resume_consistency(&candidate, &Thresholds::default());

        assert_eq!(consistency.flag, ConsistencyFlag::Aligned);
        assert!(consistency.reasons.is_empty());
    }

    #[test]
    fn test_fallback_narrative_shape() {
        let candidate = facts(85, 90, 0);
        let consistency = resume_consistency(&candidate, &Thresholds::default());
        let narrative = fallback_narrative(&candidate, &consistency, &Thresholds::default());

        assert_eq!(narrative.recommendation, Recommendation::Hire);
        assert_eq!(narrative.confidence, 85);
        assert!(!narrative.strengths.is_empty() && narrative.strengths.len() <= 3);
        assert_eq!(narrative.risks, vec![Statement::new("No major risks detected.", Some(EvidenceTag::IntegrityFlags))]);
        assert!(narrative
            .summary
            .unwrap()
            .text
            .ends_with("Recommendation: HIRE recommendation aligns with the observed evidence."));
    }

    #[test]
    fn test_fallback_narrative_lists_consistency_risk() {
        let mut candidate = facts(30, 100, 0);
        candidate.resume.experience_years = Some(10.0);
        let consistency = resume_consistency(&candidate, &Thresholds::default());
        let narrative = fallback_narrative(&candidate, &consistency, &Thresholds::default());

        assert_eq!(narrative.recommendation, Recommendation::NoHire);
        assert!(mentions_consistency_risk(&narrative.risks));
    }
}

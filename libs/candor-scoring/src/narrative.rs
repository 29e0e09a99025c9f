//! Five-section rationale grammar
//!
//! ```text
//! [VERDICT]: HIRE | NO_HIRE | REVIEW
//! [CONFIDENCE]: 0-100
//! [STRENGTHS]:
//! - statement EVIDENCE: resume.skills
//! [RISKS]:
//! - statement EVIDENCE: integrity.flags
//! [SUMMARY]:
//! free text
//! ```
//!
//! VERDICT and CONFIDENCE are mandatory; a response without them is
//! rejected. Prose sections may be missing and receive placeholder text.
//! Unknown sections (e.g. `[META]`) are ignored. The deterministic
//! fallback renders through the same `render` so consumers never need to
//! know which path produced a narrative.

use crate::error::NarrativeError;
use candor_common::types::{EvidenceTag, Recommendation, Statement, Verdict};
use lazy_static::lazy_static;
use regex::Regex;

pub const NO_STRENGTHS: &str = "No notable strengths identified.";
pub const NO_RISKS: &str = "No major risks identified.";
pub const NO_SUMMARY: &str = "No summary provided.";

lazy_static! {
    static ref HEADER: Regex =
        Regex::new(r"^\s*\[(?P<name>[A-Za-z_ ]+)\]\s*:\s*(?P<inline>.*)$").expect("valid regex");
    static ref BULLET: Regex =
        Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+(?P<body>.*\S)\s*$").expect("valid regex");
    static ref EVIDENCE: Regex =
        Regex::new(r"(?i)\s*\(?\bEVIDENCE:\s*(?P<tag>[a-z_]+\.[a-z_]+)\)?\s*\.?\s*$").expect("valid regex");
    static ref VERDICT_VALUE: Regex =
        Regex::new(r"(?i)^\s*\**\s*(?P<value>NO[_ ]HIRE|HIRE|REVIEW)\b").expect("valid regex");
    static ref CONFIDENCE_VALUE: Regex = Regex::new(r"^\s*\**\s*(?P<value>\d{1,3})\b").expect("valid regex");
}

/// Parsed rationale before placeholders are applied
#[derive(Debug, Clone, PartialEq)]
pub struct Narrative {
    pub recommendation: Recommendation,
    pub confidence: u8,
    pub strengths: Vec<Statement>,
    pub risks: Vec<Statement>,
    pub summary: Option<Statement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Verdict,
    Confidence,
    Strengths,
    Risks,
    Summary,
    Ignored,
}

impl Section {
    fn from_header(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "VERDICT" | "RECOMMENDATION" => Section::Verdict,
            "CONFIDENCE" => Section::Confidence,
            "STRENGTHS" => Section::Strengths,
            "RISKS" => Section::Risks,
            "SUMMARY" => Section::Summary,
            _ => Section::Ignored,
        }
    }
}

/// Split a trailing `EVIDENCE: tag` citation off a statement
pub fn split_evidence(body: &str) -> Statement {
    match EVIDENCE.captures(body) {
        Some(caps) => {
            let start = caps.get(0).map_or(body.len(), |m| m.start());
            let evidence = caps
                .name("tag")
                .and_then(|tag| tag.as_str().parse::<EvidenceTag>().ok());
            Statement::new(body[..start].trim(), evidence)
        }
        None => Statement::plain(body.trim()),
    }
}

pub fn parse(text: &str) -> Result<Narrative, NarrativeError> {
    let mut verdict: Option<String> = None;
    let mut confidence: Option<String> = None;
    let mut strengths = Vec::new();
    let mut risks = Vec::new();
    let mut summary_lines: Vec<&str> = Vec::new();
    let mut section = Section::Ignored;

    for line in text.lines() {
        let content = match HEADER.captures(line) {
            Some(caps) => {
                section = Section::from_header(&caps["name"]);
                caps.name("inline").map_or("", |m| m.as_str())
            }
            None => line,
        };
        let content = content.trim();
        if content.is_empty() {
            continue;
        }

        match section {
            Section::Verdict if verdict.is_none() => verdict = Some(content.to_string()),
            Section::Confidence if confidence.is_none() => confidence = Some(content.to_string()),
            Section::Strengths | Section::Risks => {
                let Some(caps) = BULLET.captures(content) else {
                    continue;
                };
                let statement = split_evidence(&caps["body"]);
                if statement.text.is_empty() {
                    continue;
                }
                if section == Section::Strengths {
                    strengths.push(statement);
                } else {
                    risks.push(statement);
                }
            }
            Section::Summary => summary_lines.push(content),
            _ => {}
        }
    }

    let verdict = verdict.ok_or(NarrativeError::MissingVerdict)?;
    let recommendation = VERDICT_VALUE
        .captures(&verdict)
        .and_then(|caps| caps["value"].replace(' ', "_").parse::<Recommendation>().ok())
        .ok_or_else(|| NarrativeError::InvalidVerdict(verdict.clone()))?;

    let confidence = confidence.ok_or(NarrativeError::MissingConfidence)?;
    let confidence = CONFIDENCE_VALUE
        .captures(&confidence)
        .and_then(|caps| caps["value"].parse::<u32>().ok())
        .map(|value| value.min(100) as u8)
        .ok_or_else(|| NarrativeError::InvalidConfidence(confidence.clone()))?;

    let summary = (!summary_lines.is_empty())
        .then(|| split_evidence(&summary_lines.join("\n")))
        .filter(|statement| !statement.text.is_empty());

    Ok(Narrative {
        recommendation,
        confidence,
        strengths,
        risks,
        summary,
    })
}

fn render_statement(statement: &Statement) -> String {
    let text = statement.text.replace('\n', " ");
    match statement.evidence {
        Some(tag) => format!("{} EVIDENCE: {}", text, tag),
        None => text,
    }
}

fn render_sections(
    recommendation: Recommendation,
    confidence: u8,
    strengths: &[Statement],
    risks: &[Statement],
    summary: Option<&Statement>,
) -> String {
    let mut lines = vec![
        format!("[VERDICT]: {}", recommendation),
        format!("[CONFIDENCE]: {}", confidence),
        "[STRENGTHS]:".to_string(),
    ];
    lines.extend(strengths.iter().map(|s| format!("- {}", render_statement(s))));
    lines.push("[RISKS]:".to_string());
    lines.extend(risks.iter().map(|s| format!("- {}", render_statement(s))));
    lines.push("[SUMMARY]:".to_string());
    if let Some(summary) = summary {
        let text = match summary.evidence {
            Some(tag) => format!("{} EVIDENCE: {}", summary.text, tag),
            None => summary.text.clone(),
        };
        lines.push(text);
    }
    lines.join("\n")
}

pub fn render(narrative: &Narrative) -> String {
    render_sections(
        narrative.recommendation,
        narrative.confidence,
        &narrative.strengths,
        &narrative.risks,
        narrative.summary.as_ref(),
    )
}

pub fn render_verdict(verdict: &Verdict) -> String {
    render_sections(
        verdict.recommendation,
        verdict.confidence,
        &verdict.strengths,
        &verdict.risks,
        Some(&verdict.summary),
    )
}

impl Narrative {
    /// Fill missing prose sections with placeholder text
    pub fn into_verdict(self) -> Verdict {
        let or_placeholder = |items: Vec<Statement>, placeholder: &str| {
            if items.is_empty() {
                vec![Statement::plain(placeholder)]
            } else {
                items
            }
        };
        Verdict {
            recommendation: self.recommendation,
            confidence: self.confidence,
            strengths: or_placeholder(self.strengths, NO_STRENGTHS),
            risks: or_placeholder(self.risks, NO_RISKS),
            summary: self.summary.unwrap_or_else(|| Statement::plain(NO_SUMMARY)),
        }
    }
}

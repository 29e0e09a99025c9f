//! Deterministic teamwork scoring for the simulated teammate chat

use serde::{Deserialize, Serialize};

const BASE_SCORE: i32 = 50;
const MIN_MEANINGFUL_CHARS: usize = 5;

const POSITIVE_KEYWORDS: &[&str] = &[
    "happy to help",
    "glad to",
    "sure",
    "of course",
    "let me",
    "try this",
    "you could",
    "maybe try",
    "have you tried",
    "good luck",
    "hope this helps",
    "let me know",
    "feel free",
    "no problem",
    "absolutely",
    "definitely",
];

const EMPATHY_KEYWORDS: &[&str] = &[
    "understand",
    "tough",
    "tricky",
    "frustrating",
    "been there",
    "i know",
    "that can be",
    "sorry to hear",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "busy",
    "can't help",
    "don't know",
    "not my problem",
    "figure it out",
    "google it",
    "leave me alone",
    "later",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnalysis {
    pub teamwork_score: u32,
    pub analysis: String,
}

/// Score a reply to the teammate's request for help, 0..=100
pub fn analyze_chat(response: &str) -> ChatAnalysis {
    let trimmed = response.trim();
    if trimmed.chars().count() < MIN_MEANINGFUL_CHARS {
        return ChatAnalysis {
            teamwork_score: 0,
            analysis: "No meaningful response provided to teammate.".to_string(),
        };
    }

    let lower = response.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|k| lower.contains(*k)).count() as i32;

    let mut score = BASE_SCORE;
    score += 8 * hits(POSITIVE_KEYWORDS);
    score += 10 * hits(EMPATHY_KEYWORDS);
    score -= 15 * hits(NEGATIVE_KEYWORDS);

    // Longer replies show effort
    let length = response.chars().count();
    if length > 100 {
        score += 10;
    } else if length > 50 {
        score += 5;
    } else if length < 20 {
        score -= 10;
    }

    let teamwork_score = score.clamp(0, 100) as u32;
    let analysis = match teamwork_score {
        70.. => "Response demonstrates strong collaboration and helpfulness.",
        50..=69 => "Response shows basic willingness to help teammate.",
        30..=49 => "Response lacks empathy or specific guidance.",
        _ => "Response indicates poor teamwork attitude.",
    };

    ChatAnalysis {
        teamwork_score,
        analysis: analysis.to_string(),
    }
}

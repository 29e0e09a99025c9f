//! Integrity Aggregator
//!
//! A pure fold over the (already deduplicated) event log of one session.
//! Nothing here keeps state between calls; the same events always produce
//! the same score, counts, rationale strings and trend.

use candor_common::types::{IntegrityEvent, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_INTEGRITY_SCORE: u32 = 100;

/// `max(0, 100 - Σ weight)` and the number of HIGH events
pub fn compute_integrity_score(events: &[IntegrityEvent]) -> (u32, u32) {
    let penalty: u32 = events.iter().map(|e| e.severity.weight()).sum();
    let high = events.iter().filter(|e| e.severity == Severity::High).count() as u32;
    (MAX_INTEGRITY_SCORE.saturating_sub(penalty), high)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub score: u32,
    pub total_events: u32,
    pub high_severity_count: u32,
    pub medium_severity_count: u32,
    pub low_severity_count: u32,
    pub by_event_type: BTreeMap<String, u32>,
}

impl IntegritySummary {
    pub fn from_events(events: &[IntegrityEvent]) -> Self {
        let (score, high_severity_count) = compute_integrity_score(events);
        let count = |severity: Severity| events.iter().filter(|e| e.severity == severity).count() as u32;

        let mut by_event_type = BTreeMap::new();
        for event in events {
            *by_event_type.entry(normalize_event_type(&event.event_type)).or_insert(0) += 1;
        }

        Self {
            score,
            total_events: events.len() as u32,
            high_severity_count,
            medium_severity_count: count(Severity::Medium),
            low_severity_count: count(Severity::Low),
            by_event_type,
        }
    }
}

fn normalize_event_type(event_type: &str) -> String {
    event_type.trim().to_uppercase()
}

fn describe_event(event_type: &str) -> String {
    match event_type {
        "TAB_SWITCH" => "Candidate switched browser tabs".to_string(),
        "BROWSER_UNFOCUSED" => "Browser window lost focus".to_string(),
        "COPY_PASTE_DETECTED" => "Copy/paste action detected".to_string(),
        "FACE_NOT_DETECTED" => "No face detected in webcam".to_string(),
        "MULTIPLE_FACES" => "More than one face detected".to_string(),
        "SCREEN_SHARE_STOPPED" => "Screen sharing was stopped".to_string(),
        "WEBCAM_DISABLED" => "Webcam was turned off".to_string(),
        "AUDIO_DETECTED" => "Background audio or voices detected".to_string(),
        "SUSPICIOUS_BEHAVIOR" => "Suspicious behavior flagged".to_string(),
        "SESSION_START" => "Session started".to_string(),
        "SESSION_END" => "Session ended".to_string(),
        other => {
            let words = other.replace('_', " ").to_lowercase();
            format!("{} recorded", words.trim())
        }
    }
}

/// Human-readable explanation for one event, derived from type and severity only
pub fn event_rationale(event_type: &str, severity: Severity) -> String {
    let event_type = normalize_event_type(event_type);
    let switching = matches!(event_type.as_str(), "TAB_SWITCH" | "BROWSER_UNFOCUSED");
    let qualifier = match severity {
        Severity::Low => "minor concern",
        Severity::Medium => "moderate concern",
        Severity::High if switching => "repeated switches escalate severity",
        Severity::High => "serious concern",
    };
    format!(
        "{}; {} (-{})",
        describe_event(&event_type),
        qualifier,
        severity.weight()
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub event_type: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub rationale: String,
    /// Integrity score after this event
    pub running_score: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityTrend {
    Steady,
    Escalating,
    Easing,
}

/// Compare the mean severity weight of the second half of the session
/// against the first half
pub fn severity_trend(events: &[IntegrityEvent]) -> SeverityTrend {
    if events.len() < 2 {
        return SeverityTrend::Steady;
    }
    let (first, second) = events.split_at(events.len() / 2);
    let weight = |half: &[IntegrityEvent]| -> u64 { half.iter().map(|e| u64::from(e.severity.weight())).sum() };

    // Cross-multiplied means, halves can differ in length
    let early = weight(first) * second.len() as u64;
    let late = weight(second) * first.len() as u64;
    match late.cmp(&early) {
        std::cmp::Ordering::Greater => SeverityTrend::Escalating,
        std::cmp::Ordering::Less => SeverityTrend::Easing,
        std::cmp::Ordering::Equal => SeverityTrend::Steady,
    }
}

pub fn timeline(events: &[IntegrityEvent]) -> Vec<TimelineEntry> {
    let mut penalty = 0u32;
    events
        .iter()
        .map(|event| {
            penalty += event.severity.weight();
            TimelineEntry {
                event_type: event.event_type.clone(),
                severity: event.severity,
                timestamp: event.timestamp,
                rationale: event_rationale(&event.event_type, event.severity),
                running_score: MAX_INTEGRITY_SCORE.saturating_sub(penalty),
            }
        })
        .collect()
}

/// Everything the reporting layer shows about a session's integrity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub summary: IntegritySummary,
    pub trend: SeverityTrend,
    pub timeline: Vec<TimelineEntry>,
}

pub fn assess(events: &[IntegrityEvent]) -> IntegrityReport {
    IntegrityReport {
        summary: IntegritySummary::from_events(events),
        trend: severity_trend(events),
        timeline: timeline(events),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn events(severities: &[Severity]) -> Vec<IntegrityEvent> {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        severities
            .iter()
            .enumerate()
            .map(|(i, severity)| IntegrityEvent {
                event_type: "TAB_SWITCH".to_string(),
                severity: *severity,
                timestamp: start + Duration::seconds(30 * i as i64),
            })
            .collect()
    }

    #[test]
    fn test_low_low_high_scores_86() {
        let (score, high) = compute_integrity_score(&events(&[Severity::Low, Severity::Low, Severity::High]));
        assert_eq!(score, 86);
        assert_eq!(high, 1);
    }

    #[test]
    fn test_no_events_is_perfect() {
        assert_eq!(compute_integrity_score(&[]), (100, 0));
    }

    #[test]
    fn test_score_floors_at_zero() {
        let (score, high) = compute_integrity_score(&events(&[Severity::High; 12]));
        assert_eq!(score, 0);
        assert_eq!(high, 12);
    }

    #[test]
    fn test_score_is_monotonic_as_events_append() {
        let all = events(&[
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Low,
            Severity::High,
            Severity::High,
            Severity::Medium,
            Severity::High,
            Severity::High,
            Severity::High,
            Severity::High,
            Severity::High,
        ]);
        let mut previous = MAX_INTEGRITY_SCORE;
        for n in 0..=all.len() {
            let (score, _) = compute_integrity_score(&all[..n]);
            assert!(score <= previous);
            assert!(score <= 100);
            previous = score;
        }
    }

    #[test]
    fn test_summary_counts() {
        let mut log = events(&[Severity::Low, Severity::Medium, Severity::High, Severity::High]);
        log[1].event_type = "face_not_detected".to_string();
        let summary = IntegritySummary::from_events(&log);

        assert_eq!(summary.score, 100 - 2 - 5 - 10 - 10);
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.high_severity_count, 2);
        assert_eq!(summary.medium_severity_count, 1);
        assert_eq!(summary.low_severity_count, 1);
        assert_eq!(summary.by_event_type["TAB_SWITCH"], 3);
        assert_eq!(summary.by_event_type["FACE_NOT_DETECTED"], 1);
    }

    #[test]
    fn test_event_rationale_is_deterministic() {
        assert_eq!(
            event_rationale("TAB_SWITCH", Severity::High),
            "Candidate switched browser tabs; repeated switches escalate severity (-10)"
        );
        assert_eq!(
            event_rationale("multiple_faces", Severity::High),
            "More than one face detected; serious concern (-10)"
        );
        assert_eq!(
            event_rationale("DEVTOOLS_OPENED", Severity::Low),
            "devtools opened recorded; minor concern (-2)"
        );
        assert_eq!(
            event_rationale("TAB_SWITCH", Severity::Medium),
            event_rationale("tab_switch", Severity::Medium)
        );
    }

    #[test]
    fn test_timeline_running_score() {
        let entries = timeline(&events(&[Severity::Low, Severity::Low, Severity::High]));
        let running: Vec<u32> = entries.iter().map(|e| e.running_score).collect();
        assert_eq!(running, vec![98, 96, 86]);
    }

    #[test]
    fn test_trend() {
        assert_eq!(severity_trend(&events(&[Severity::Low])), SeverityTrend::Steady);
        assert_eq!(
            severity_trend(&events(&[Severity::Low, Severity::Low, Severity::High, Severity::High])),
            SeverityTrend::Escalating
        );
        assert_eq!(
            severity_trend(&events(&[Severity::High, Severity::Medium, Severity::Low])),
            SeverityTrend::Easing
        );
        assert_eq!(
            severity_trend(&events(&[Severity::Medium, Severity::Medium])),
            SeverityTrend::Steady
        );
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub type CandidateId = u64;
pub type QuestionId = u32;

/// Function invoked when a test case does not name one
pub const DEFAULT_FUNCTION: &str = "solution";

fn default_function() -> String {
    DEFAULT_FUNCTION.to_string()
}

/// Call convention for a test case input
///
/// - `Scalar` is passed as the single argument: `f(input)`
/// - `Tuple` is spread as positional arguments: `f(*input)`
#[derive(Debug, Clone, PartialEq)]
pub enum TestInput {
    Scalar(Value),
    Tuple(Vec<Value>),
}

impl TestInput {
    /// Positional arguments for the target function
    pub fn call_args(&self) -> Vec<Value> {
        match self {
            TestInput::Scalar(value) => vec![value.clone()],
            TestInput::Tuple(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestCaseError {
    #[error("unpack=true requires an array input, got {0}")]
    UnpackNonArray(&'static str),
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Test Case Definition (Immutable Input)
/// Owned by question configuration; the wire form carries an `unpack`
/// flag which is resolved into a `TestInput` variant at the boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTestCase", into = "RawTestCase")]
pub struct TestCase {
    pub input: TestInput,
    pub expected: Value,
    pub function: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawTestCase {
    input: Value,
    expected: Value,
    #[serde(default = "default_function")]
    function: String,
    #[serde(default)]
    unpack: bool,
}

impl TryFrom<RawTestCase> for TestCase {
    type Error = TestCaseError;

    fn try_from(raw: RawTestCase) -> Result<Self, Self::Error> {
        let input = if raw.unpack {
            match raw.input {
                Value::Array(values) => TestInput::Tuple(values),
                other => return Err(TestCaseError::UnpackNonArray(value_kind(&other))),
            }
        } else {
            TestInput::Scalar(raw.input)
        };

        Ok(TestCase {
            input,
            expected: raw.expected,
            function: raw.function,
        })
    }
}

impl From<TestCase> for RawTestCase {
    fn from(case: TestCase) -> Self {
        let (input, unpack) = match case.input {
            TestInput::Scalar(value) => (value, false),
            TestInput::Tuple(values) => (Value::Array(values), true),
        };
        RawTestCase {
            input,
            expected: case.expected,
            function: case.function,
            unpack,
        }
    }
}

impl TestCase {
    pub fn scalar(input: Value, expected: Value) -> Self {
        Self {
            input: TestInput::Scalar(input),
            expected,
            function: default_function(),
        }
    }

    pub fn tuple(args: Vec<Value>, expected: Value) -> Self {
        Self {
            input: TestInput::Tuple(args),
            expected,
            function: default_function(),
        }
    }
}

/// Typed vs pasted character counts captured by the editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharBreakdown {
    #[serde(default)]
    pub typed: u64,
    #[serde(default)]
    pub pasted: u64,
}

/// One candidate's code for one question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub candidate_id: CandidateId,
    pub question_id: QuestionId,
    pub source_code: String,
    #[serde(default)]
    pub char_breakdown: CharBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_response: Option<String>,
    /// Session time limit; in-flight execution is cancelled once it passes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

/// Queue payload: a submission plus the question's test-case set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteRequest {
    pub submission: Submission,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Error,
}

/// Why a test ended in `error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Validation,
    Compile,
    Runtime,
    Timeout,
    Resource,
    Cancelled,
    Backend,
}

/// Per-test outcome, appended once and never mutated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// 1-based position in the suite
    pub index: u32,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub execution_time_ms: u64,
}

impl TestResult {
    pub fn errored(index: u32, fault: FaultKind, message: impl Into<String>) -> Self {
        Self {
            index,
            status: TestStatus::Error,
            message: Some(message.into()),
            fault: Some(fault),
            expected: None,
            actual: None,
            execution_time_ms: 0,
        }
    }
}

/// Whether results came from an isolated backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    Sandboxed,
    FallbackMock,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sandboxed => write!(f, "sandboxed"),
            ExecutionMode::FallbackMock => write!(f, "fallback-mock"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Partial,
    Error,
}

/// Aggregate over all TestResults of one submission
///
/// ## Invariants
/// - `tests_passed <= tests_total`
/// - `is_passed == (tests_passed == tests_total && tests_total > 0)`
/// - `execution_time_ms` is the slowest single test, not the sum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub submission_id: Uuid,
    pub status: ReportStatus,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub is_passed: bool,
    pub execution_time_ms: u64,
    pub mode: ExecutionMode,
    pub mock_mode: bool,
    /// False when the suite was cancelled before every test ran
    pub complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub results: Vec<TestResult>,
}

impl ExecutionReport {
    /// Build a report from ordered results; counts are always derived
    pub fn assemble(
        submission_id: Uuid,
        results: Vec<TestResult>,
        mode: ExecutionMode,
        complete: bool,
        error_message: Option<String>,
    ) -> Self {
        let tests_total = results.len() as u32;
        let tests_passed = results
            .iter()
            .filter(|r| r.status == TestStatus::Passed)
            .count() as u32;
        let execution_time_ms = results
            .iter()
            .map(|r| r.execution_time_ms)
            .max()
            .unwrap_or(0);
        let is_passed = tests_total > 0 && tests_passed == tests_total;

        let status = if error_message.is_some() {
            ReportStatus::Error
        } else if is_passed {
            ReportStatus::Success
        } else {
            ReportStatus::Partial
        };

        Self {
            submission_id,
            status,
            tests_passed,
            tests_total,
            is_passed,
            execution_time_ms,
            mode,
            mock_mode: mode == ExecutionMode::FallbackMock,
            complete,
            error_message,
            results,
        }
    }

    /// Pass ratio in [0, 1]; `None` for an empty suite
    pub fn ratio(&self) -> Option<f64> {
        if self.tests_total == 0 {
            None
        } else {
            Some(f64::from(self.tests_passed) / f64::from(self.tests_total))
        }
    }
}

/// Persisted view of a submission read by the scoring layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub question_id: QuestionId,
    pub tests_passed: u32,
    pub tests_total: u32,
    pub is_passed: bool,
    #[serde(default)]
    pub mock_mode: bool,
    #[serde(default)]
    pub char_breakdown: CharBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teamwork_score: Option<u32>,
}

impl SubmissionRecord {
    pub fn from_report(
        submission: &Submission,
        report: &ExecutionReport,
        teamwork_score: Option<u32>,
    ) -> Self {
        Self {
            question_id: submission.question_id,
            tests_passed: report.tests_passed,
            tests_total: report.tests_total,
            is_passed: report.is_passed,
            mock_mode: report.mock_mode,
            char_breakdown: submission.char_breakdown,
            chat_response: submission.chat_response.clone(),
            teamwork_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[serde(alias = "MED")]
    Medium,
    High,
}

impl Severity {
    /// Points deducted from the integrity score per event
    pub fn weight(self) -> u32 {
        match self {
            Severity::Low => 2,
            Severity::Medium => 5,
            Severity::High => 10,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" | "MED" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// One observed behavioral signal from the telemetry collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityEvent {
    pub event_type: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

/// Resume/profile facts read at scoring time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeFacts {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub raw_text: String,
}

impl ResumeFacts {
    pub fn is_empty(&self) -> bool {
        self.skills.is_empty() && self.experience_years.is_none() && self.raw_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    Hire,
    NoHire,
    Review,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::Hire => write!(f, "HIRE"),
            Recommendation::NoHire => write!(f, "NO_HIRE"),
            Recommendation::Review => write!(f, "REVIEW"),
        }
    }
}

impl FromStr for Recommendation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "HIRE" => Ok(Recommendation::Hire),
            "NO_HIRE" => Ok(Recommendation::NoHire),
            "REVIEW" => Ok(Recommendation::Review),
            other => Err(format!("unknown recommendation: {}", other)),
        }
    }
}

/// Data field that justifies a narrative statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvidenceTag {
    #[serde(rename = "resume.skills")]
    ResumeSkills,
    #[serde(rename = "resume.experience")]
    ResumeExperience,
    #[serde(rename = "submissions.tests")]
    SubmissionsTests,
    #[serde(rename = "integrity.flags")]
    IntegrityFlags,
    #[serde(rename = "originality.ratio")]
    OriginalityRatio,
    #[serde(rename = "teamwork.response")]
    TeamworkResponse,
    #[serde(rename = "behavioral.score")]
    BehavioralScore,
}

impl EvidenceTag {
    pub fn all_variants() -> &'static [EvidenceTag] {
        &[
            EvidenceTag::ResumeSkills,
            EvidenceTag::ResumeExperience,
            EvidenceTag::SubmissionsTests,
            EvidenceTag::IntegrityFlags,
            EvidenceTag::OriginalityRatio,
            EvidenceTag::TeamworkResponse,
            EvidenceTag::BehavioralScore,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceTag::ResumeSkills => "resume.skills",
            EvidenceTag::ResumeExperience => "resume.experience",
            EvidenceTag::SubmissionsTests => "submissions.tests",
            EvidenceTag::IntegrityFlags => "integrity.flags",
            EvidenceTag::OriginalityRatio => "originality.ratio",
            EvidenceTag::TeamworkResponse => "teamwork.response",
            EvidenceTag::BehavioralScore => "behavioral.score",
        }
    }
}

impl fmt::Display for EvidenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        // psychometric.score is the older spelling of the same field
        if wanted == "psychometric.score" {
            return Ok(EvidenceTag::BehavioralScore);
        }
        EvidenceTag::all_variants()
            .iter()
            .copied()
            .find(|tag| tag.as_str() == wanted)
            .ok_or_else(|| format!("unknown evidence tag: {}", s))
    }
}

/// One narrative statement with an optional evidence citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceTag>,
}

impl Statement {
    pub fn new(text: impl Into<String>, evidence: Option<EvidenceTag>) -> Self {
        Self {
            text: text.into(),
            evidence,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, None)
    }
}

/// Final hiring recommendation plus its structured justification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub recommendation: Recommendation,
    /// 0..=100
    pub confidence: u8,
    pub strengths: Vec<Statement>,
    pub risks: Vec<Statement>,
    pub summary: Statement,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(index: u32, status: TestStatus, ms: u64) -> TestResult {
        TestResult {
            index,
            status,
            message: None,
            fault: None,
            expected: None,
            actual: None,
            execution_time_ms: ms,
        }
    }

    #[test]
    fn test_test_case_unpack_becomes_tuple() {
        let case: TestCase =
            serde_json::from_value(json!({"input": [[1, 2, 3], -1], "expected": 2, "unpack": true}))
                .unwrap();

        assert_eq!(case.input, TestInput::Tuple(vec![json!([1, 2, 3]), json!(-1)]));
        assert_eq!(case.input.call_args(), vec![json!([1, 2, 3]), json!(-1)]);
        assert_eq!(case.function, "solution");
    }

    #[test]
    fn test_test_case_without_unpack_is_single_argument() {
        let case: TestCase =
            serde_json::from_value(json!({"input": [[1, 2, 3], -1], "expected": 2})).unwrap();

        assert_eq!(case.input.call_args(), vec![json!([[1, 2, 3], -1])]);
    }

    #[test]
    fn test_test_case_unpack_rejects_scalar_input() {
        let err = serde_json::from_value::<TestCase>(
            json!({"input": "hello", "expected": "olleh", "unpack": true}),
        )
        .unwrap_err();

        assert!(err.to_string().contains("requires an array input"));
    }

    #[test]
    fn test_test_case_wire_form_keeps_unpack_flag() {
        let case = TestCase::tuple(vec![json!(2), json!(3)], json!(5));
        let wire = serde_json::to_value(&case).unwrap();

        assert_eq!(wire["unpack"], json!(true));
        assert_eq!(wire["input"], json!([2, 3]));
    }

    #[test]
    fn test_report_counts_and_max_time() {
        let report = ExecutionReport::assemble(
            Uuid::new_v4(),
            vec![
                result(1, TestStatus::Passed, 12),
                result(2, TestStatus::Failed, 40),
                result(3, TestStatus::Passed, 7),
            ],
            ExecutionMode::Sandboxed,
            true,
            None,
        );

        assert_eq!(report.tests_passed, 2);
        assert_eq!(report.tests_total, 3);
        assert!(!report.is_passed);
        assert_eq!(report.execution_time_ms, 40);
        assert_eq!(report.status, ReportStatus::Partial);
        assert!(!report.mock_mode);
    }

    #[test]
    fn test_report_empty_suite_is_not_passed() {
        let report = ExecutionReport::assemble(
            Uuid::new_v4(),
            vec![],
            ExecutionMode::FallbackMock,
            true,
            Some("No test cases provided".to_string()),
        );

        assert_eq!(report.tests_total, 0);
        assert!(!report.is_passed);
        assert!(report.mock_mode);
        assert_eq!(report.status, ReportStatus::Error);
        assert_eq!(report.ratio(), None);
    }

    #[test]
    fn test_report_all_passed() {
        let report = ExecutionReport::assemble(
            Uuid::new_v4(),
            vec![result(1, TestStatus::Passed, 3)],
            ExecutionMode::Sandboxed,
            true,
            None,
        );

        assert!(report.is_passed);
        assert_eq!(report.status, ReportStatus::Success);
        assert_eq!(report.ratio(), Some(1.0));
    }

    #[test]
    fn test_execution_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&ExecutionMode::FallbackMock).unwrap(),
            "\"fallback-mock\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionMode::Sandboxed).unwrap(),
            "\"sandboxed\""
        );
    }

    #[test]
    fn test_severity_weights_and_aliases() {
        assert_eq!(Severity::Low.weight(), 2);
        assert_eq!(Severity::Medium.weight(), 5);
        assert_eq!(Severity::High.weight(), 10);

        let med: Severity = serde_json::from_str("\"MED\"").unwrap();
        assert_eq!(med, Severity::Medium);
        assert_eq!("high".parse::<Severity>(), Ok(Severity::High));
    }

    #[test]
    fn test_recommendation_round_trip_strings() {
        assert_eq!(serde_json::to_string(&Recommendation::NoHire).unwrap(), "\"NO_HIRE\"");
        assert_eq!("no_hire".parse::<Recommendation>(), Ok(Recommendation::NoHire));
        assert!("MAYBE".parse::<Recommendation>().is_err());
    }

    #[test]
    fn test_evidence_tag_parsing() {
        assert_eq!("resume.skills".parse::<EvidenceTag>(), Ok(EvidenceTag::ResumeSkills));
        assert_eq!(
            "psychometric.score".parse::<EvidenceTag>(),
            Ok(EvidenceTag::BehavioralScore)
        );
        assert!("resume.name".parse::<EvidenceTag>().is_err());
    }
}

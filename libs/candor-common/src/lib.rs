pub mod config;
pub mod redis;
pub mod types;

// Re-export commonly used types for convenience
pub use config::{Config, ReasoningConfig, SandboxConfig};
pub use types::{
    CandidateId, ExecutionMode, ExecutionReport, IntegrityEvent, QuestionId, Recommendation,
    ResumeFacts, Severity, Submission, SubmissionRecord, SuiteRequest, TestCase, TestInput,
    TestResult, TestStatus, Verdict,
};

//! Test Harness
//!
//! Runs a submission against its whole test-case suite and folds the
//! per-test outcomes into one ExecutionReport.
//!
//! ## Rules
//! - Validation failures (no code, oversized code) mark every test `error`
//!   without touching the engine
//! - One pre-flight load of the submission; if it fails to compile or load,
//!   every test gets the same `error` and nothing else is executed
//! - Tests run through a bounded pool, results are kept in input order
//! - Cancellation stops new tests from starting, kills in-flight workers and
//!   leaves the report marked incomplete

use crate::cancel::CancelToken;
use crate::engine::{ExecutionEngine, Invocation, SandboxFault};
use crate::evaluator::evaluate_test;
use candor_common::config::SandboxConfig;
use candor_common::types::{ExecutionReport, FaultKind, Submission, TestCase, TestResult};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

const NOT_STARTED: &str = "cancelled before execution";

/// Per-suite execution limits
#[derive(Debug, Clone, Copy)]
pub struct SuiteLimits {
    pub timeout_ms: u64,
    pub max_source_bytes: usize,
    pub max_parallel: usize,
}

impl SuiteLimits {
    pub fn from_config(config: &SandboxConfig, requested_timeout_ms: Option<u64>) -> Self {
        Self {
            timeout_ms: config.effective_timeout_ms(requested_timeout_ms),
            max_source_bytes: config.max_source_bytes,
            max_parallel: config.max_parallel_tests.max(1),
        }
    }
}

fn all_errored(count: usize, fault: FaultKind, message: &str) -> Vec<TestResult> {
    (1..=count as u32)
        .map(|index| TestResult::errored(index, fault, message))
        .collect()
}

/// Run every test case and aggregate into a report
///
/// Never fails: every execution problem is expressed inside the report.
pub async fn run_test_suite(
    engine: &dyn ExecutionEngine,
    submission: &Submission,
    test_cases: &[TestCase],
    limits: &SuiteLimits,
    cancel: &CancelToken,
) -> ExecutionReport {
    let mode = engine.mode();
    let short_circuit = |fault: FaultKind, message: String, complete: bool| {
        ExecutionReport::assemble(
            submission.id,
            all_errored(test_cases.len(), fault, &message),
            mode,
            complete,
            Some(message),
        )
    };

    info!(
        submission_id = %submission.id,
        question_id = submission.question_id,
        tests = test_cases.len(),
        %mode,
        timeout_ms = limits.timeout_ms,
        "Running test suite"
    );

    if test_cases.is_empty() {
        return ExecutionReport::assemble(
            submission.id,
            Vec::new(),
            mode,
            true,
            Some("No test cases provided".to_string()),
        );
    }
    if submission.source_code.trim().is_empty() {
        return short_circuit(FaultKind::Validation, "No code provided".to_string(), true);
    }
    if submission.source_code.len() > limits.max_source_bytes {
        return short_circuit(
            FaultKind::Validation,
            format!(
                "Source code is {} bytes; the limit is {} bytes",
                submission.source_code.len(),
                limits.max_source_bytes
            ),
            true,
        );
    }
    if cancel.is_cancelled() {
        return short_circuit(FaultKind::Cancelled, NOT_STARTED.to_string(), false);
    }

    // Load once: a submission that cannot even compile fails every test the same way
    let check = engine
        .execute(&Invocation::check(&submission.source_code, limits.timeout_ms), cancel)
        .await;
    if let Err(fault) = check.outcome {
        warn!(submission_id = %submission.id, error = %fault, "Submission failed to load; skipping tests");
        let complete = fault != SandboxFault::Cancelled;
        return short_circuit(fault.kind(), fault.to_string(), complete);
    }

    let source = submission.source_code.as_str();
    let results: Vec<TestResult> = stream::iter(test_cases.iter().enumerate())
        .map(|(position, case)| async move {
            let index = position as u32 + 1;
            if cancel.is_cancelled() {
                return TestResult::errored(index, FaultKind::Cancelled, NOT_STARTED);
            }

            let invocation = Invocation::call(source, &case.function, case.input.call_args(), limits.timeout_ms);
            let mut output = engine.execute(&invocation, cancel).await;
            output.index = index;

            let result = evaluate_test(case, output);
            debug!(
                submission_id = %submission.id,
                test_index = index,
                status = ?result.status,
                execution_time_ms = result.execution_time_ms,
                "Test finished"
            );
            result
        })
        .buffered(limits.max_parallel.max(1))
        .collect()
        .await;

    let complete = !results.iter().any(|r| r.fault == Some(FaultKind::Cancelled));
    let report = ExecutionReport::assemble(submission.id, results, mode, complete, None);

    info!(
        submission_id = %submission.id,
        passed = report.tests_passed,
        total = report.tests_total,
        execution_time_ms = report.execution_time_ms,
        complete = report.complete,
        "Test suite finished"
    );
    report
}

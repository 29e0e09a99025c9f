//! Test Evaluator - Expected vs Actual
//!
//! **Core Responsibility:**
//! Compare the value a submission returned against the expected output and
//! classify the test as passed, failed or error.
//!
//! **Critical Properties:**
//! - Knows nothing about Docker
//! - Knows nothing about interpreter processes
//! - Pure function: (test case, execution output) → TestResult

use crate::engine::SandboxFault;
use candor_common::types::{TestCase, TestResult, TestStatus};
use serde_json::Value;
use std::time::Duration;

/// Raw execution output for a single invocation
/// Produced by ExecutionEngine, consumed by Evaluator
#[derive(Debug, Clone)]
pub struct TestExecutionOutput {
    /// 1-based; set by the executor
    pub index: u32,
    pub execution_time_ms: u64,
    pub outcome: Result<Value, SandboxFault>,
}

impl TestExecutionOutput {
    pub fn new(elapsed: Duration, outcome: Result<Value, SandboxFault>) -> Self {
        Self {
            index: 0,
            execution_time_ms: elapsed.as_millis() as u64,
            outcome,
        }
    }
}

/// Structural equality with numeric comparison across int/float
///
/// Mirrors the interpreter's `==` for JSON-representable values, so a
/// function returning `6.0` satisfies an expected `6` and `True` satisfies
/// an expected `1`.
pub fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Bool(flag), Value::Number(n)) | (Value::Number(n), Value::Bool(flag)) => {
            n.as_f64() == Some(if *flag { 1.0 } else { 0.0 })
        }
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
                return x == y;
            }
            if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
                return x == y;
            }
            match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => expected == actual,
    }
}

/// Evaluate one execution output against its test case
pub fn evaluate_test(case: &TestCase, output: TestExecutionOutput) -> TestResult {
    match output.outcome {
        Ok(actual) => {
            let passed = values_equal(&case.expected, &actual);
            TestResult {
                index: output.index,
                status: if passed { TestStatus::Passed } else { TestStatus::Failed },
                message: (!passed).then(|| "Output mismatch".to_string()),
                fault: None,
                expected: Some(case.expected.clone()),
                actual: Some(actual),
                execution_time_ms: output.execution_time_ms,
            }
        }
        Err(fault) => TestResult {
            index: output.index,
            status: TestStatus::Error,
            message: Some(fault.to_string()),
            fault: Some(fault.kind()),
            expected: Some(case.expected.clone()),
            actual: None,
            execution_time_ms: output.execution_time_ms,
        },
    }
}

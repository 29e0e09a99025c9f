// Processing of one queued suite: execution, cancellation and storage

use crate::metrics;
use anyhow::Context;
use candor_common::redis::{append_submission, is_cancel_requested, store_report};
use candor_common::types::{ExecutionReport, SubmissionRecord, SuiteRequest};
use candor_common::SandboxConfig;
use candor_sandbox::{cancel_pair, run_test_suite, CancelToken, ExecutionEngine, SuiteLimits};
use candor_scoring::analyze_chat;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

const CANCEL_POLL: Duration = Duration::from_millis(500);

/// Time left before a session deadline; zero once it has passed
pub fn remaining(deadline: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (deadline - now).to_std().unwrap_or(Duration::ZERO)
}

/// Stored view of a finished suite, teamwork scored from the chat reply
pub fn submission_record(request: &SuiteRequest, report: &ExecutionReport) -> SubmissionRecord {
    let teamwork_score = request
        .submission
        .chat_response
        .as_deref()
        .filter(|reply| !reply.trim().is_empty())
        .map(|reply| analyze_chat(reply).teamwork_score);
    SubmissionRecord::from_report(&request.submission, report, teamwork_score)
}

/// Resolves once the session deadline passes or the worker starts shutting down
async fn stop_signal(deadline: Option<DateTime<Utc>>, shutdown: &CancelToken) -> &'static str {
    let deadline_passed = async {
        match deadline {
            Some(deadline) => tokio::time::sleep(remaining(deadline, Utc::now())).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        _ = deadline_passed => "session deadline passed",
        _ = shutdown.cancelled() => "worker shutting down",
    }
}

/// Resolves on an explicit cancel request, the deadline or shutdown
async fn stop_requested(
    mut conn: ConnectionManager,
    submission_id: Uuid,
    deadline: Option<DateTime<Utc>>,
    shutdown: &CancelToken,
) {
    let stopped = stop_signal(deadline, shutdown);
    tokio::pin!(stopped);
    let mut poll = tokio::time::interval(CANCEL_POLL);

    loop {
        tokio::select! {
            reason = &mut stopped => {
                info!(submission_id = %submission_id, reason, "Cancelling suite");
                return;
            }
            _ = poll.tick() => {
                match is_cancel_requested(&mut conn, &submission_id).await {
                    Ok(true) => {
                        info!(submission_id = %submission_id, "Cancellation requested");
                        return;
                    }
                    Ok(false) => {}
                    Err(e) => warn!(submission_id = %submission_id, error = %e, "Cancel check failed"),
                }
            }
        }
    }
}

/// Run a suite to completion, cancelling in-flight tests once `stop` resolves
///
/// Always yields a report; a stopped suite comes back marked incomplete.
pub async fn run_until_stopped(
    engine: &dyn ExecutionEngine,
    sandbox: &SandboxConfig,
    request: &SuiteRequest,
    stop: impl Future<Output = ()>,
) -> ExecutionReport {
    let limits = SuiteLimits::from_config(sandbox, request.timeout_ms);
    let (handle, token) = cancel_pair();
    let suite = run_test_suite(engine, &request.submission, &request.test_cases, &limits, &token);
    tokio::pin!(suite);

    tokio::select! {
        report = &mut suite => return report,
        _ = stop => handle.cancel(),
    }
    // Engines kill and reap their workers before returning
    suite.await
}

pub async fn process(
    engine: &dyn ExecutionEngine,
    conn: &mut ConnectionManager,
    sandbox: &SandboxConfig,
    request: &SuiteRequest,
    shutdown: &CancelToken,
) -> anyhow::Result<ExecutionReport> {
    let submission = &request.submission;
    let stop = stop_requested(conn.clone(), submission.id, submission.deadline, shutdown);
    let report = run_until_stopped(engine, sandbox, request, stop).await;
    metrics::record_report(&report);

    let stored = async {
        store_report(conn, &report).await.context("Failed to store execution report")?;
        append_submission(conn, submission.candidate_id, &submission_record(request, &report))
            .await
            .context("Failed to append submission record")
    };
    if let Err(e) = stored.await {
        metrics::record_storage_failure();
        error!(submission_id = %submission.id, error = %e, "Result storage failed");
        return Err(e);
    }

    info!(
        submission_id = %submission.id,
        candidate_id = submission.candidate_id,
        passed = report.tests_passed,
        total = report.tests_total,
        mode = %report.mode,
        complete = report.complete,
        "Suite stored"
    );
    Ok(report)
}

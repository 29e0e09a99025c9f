use crate::types::{CandidateId, ExecutionReport, SubmissionRecord, SuiteRequest};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use uuid::Uuid;

/// Redis key semantics shared by worker, CLI and scoring
/// Keys are deterministic so every process agrees on where state lives

pub const SUITE_QUEUE: &str = "candor:queue:submissions";
pub const REPORT_PREFIX: &str = "candor:report";
pub const CANCEL_PREFIX: &str = "candor:cancel";
pub const SUBMISSIONS_PREFIX: &str = "candor:submissions";
pub const RATIONALE_PREFIX: &str = "candor:rationale";

/// Cancellation markers expire on their own
pub const CANCEL_TTL_SECS: u64 = 3600;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
}

pub fn report_key(submission_id: &Uuid) -> String {
    format!("{}:{}", REPORT_PREFIX, submission_id)
}

pub fn cancel_key(submission_id: &Uuid) -> String {
    format!("{}:{}", CANCEL_PREFIX, submission_id)
}

pub fn submissions_key(candidate_id: CandidateId) -> String {
    format!("{}:{}", SUBMISSIONS_PREFIX, candidate_id)
}

pub fn rationale_key(candidate_id: CandidateId) -> String {
    format!("{}:{}", RATIONALE_PREFIX, candidate_id)
}

pub async fn push_suite(conn: &mut ConnectionManager, request: &SuiteRequest) -> Result<(), StoreError> {
    let payload = serde_json::to_string(request)?;
    conn.rpush::<_, _, ()>(SUITE_QUEUE, payload).await?;
    Ok(())
}

/// Blocking pop with a timeout so callers can observe shutdown
pub async fn pop_suite(
    conn: &mut ConnectionManager,
    timeout_secs: f64,
) -> Result<Option<SuiteRequest>, StoreError> {
    let popped: Option<(String, String)> = conn.blpop(SUITE_QUEUE, timeout_secs).await?;
    match popped {
        Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
        None => Ok(None),
    }
}

pub async fn store_report(conn: &mut ConnectionManager, report: &ExecutionReport) -> Result<(), StoreError> {
    let payload = serde_json::to_string(report)?;
    conn.set::<_, _, ()>(report_key(&report.submission_id), payload).await?;
    Ok(())
}

pub async fn load_report(
    conn: &mut ConnectionManager,
    submission_id: &Uuid,
) -> Result<Option<ExecutionReport>, StoreError> {
    let payload: Option<String> = conn.get(report_key(submission_id)).await?;
    payload
        .map(|p| serde_json::from_str(&p))
        .transpose()
        .map_err(StoreError::from)
}

pub async fn append_submission(
    conn: &mut ConnectionManager,
    candidate_id: CandidateId,
    record: &SubmissionRecord,
) -> Result<(), StoreError> {
    let payload = serde_json::to_string(record)?;
    conn.rpush::<_, _, ()>(submissions_key(candidate_id), payload).await?;
    Ok(())
}

pub async fn load_submissions(
    conn: &mut ConnectionManager,
    candidate_id: CandidateId,
) -> Result<Vec<SubmissionRecord>, StoreError> {
    let payloads: Vec<String> = conn.lrange(submissions_key(candidate_id), 0, -1).await?;
    payloads
        .iter()
        .map(|p| serde_json::from_str(p).map_err(StoreError::from))
        .collect()
}

pub async fn request_cancel(conn: &mut ConnectionManager, submission_id: &Uuid) -> Result<(), StoreError> {
    redis::cmd("SET")
        .arg(cancel_key(submission_id))
        .arg(1)
        .arg("EX")
        .arg(CANCEL_TTL_SECS)
        .query_async::<_, ()>(conn)
        .await?;
    Ok(())
}

pub async fn is_cancel_requested(
    conn: &mut ConnectionManager,
    submission_id: &Uuid,
) -> Result<bool, StoreError> {
    Ok(conn.exists(cancel_key(submission_id)).await?)
}

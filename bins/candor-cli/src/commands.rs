// CLI commands for operating the Candor engine
use anyhow::{bail, Context, Result};
use candor_common::redis as store;
use candor_common::types::{Submission, SuiteRequest, TestCase};
use candor_common::Config;
use candor_sandbox::{
    resolve_engine, run_test_suite, sandbox_status, CancelToken, ExecutionEngine, LocalEngine, SuiteLimits,
};
use candor_scoring::{
    assess, reasoning_client, AssessmentInput, CandidateFacts, InMemoryCache, RationaleCache, RedisCache,
    VerdictEngine,
};
use redis::aio::ConnectionManager;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

/// Submission files may omit the id; one is generated
pub fn load_submission(path: &Path) -> Result<Submission> {
    let mut raw: Value = read_json(path)?;
    let Some(object) = raw.as_object_mut() else {
        bail!("{} must contain a JSON object", path.display());
    };
    object
        .entry("id")
        .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
    serde_json::from_value(raw).with_context(|| format!("Invalid submission in {}", path.display()))
}

pub fn load_request(submission: &Path, tests: &Path, timeout_ms: Option<u64>) -> Result<SuiteRequest> {
    let test_cases: Vec<TestCase> = read_json(tests)?;
    Ok(SuiteRequest {
        submission: load_submission(submission)?,
        test_cases,
        timeout_ms,
    })
}

async fn connect(config: &Config) -> Result<ConnectionManager> {
    let client = redis::Client::open(config.redis_url.as_str()).context("Invalid REDIS_URL")?;
    ConnectionManager::new(client)
        .await
        .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))
}

async fn engine_for(config: &Config, mock: bool) -> Result<Arc<dyn ExecutionEngine>> {
    if mock {
        return Ok(Arc::new(LocalEngine::new(&config.sandbox)));
    }
    resolve_engine(&config.sandbox)
        .await
        .context("No sandbox backend available")
}

/// RunTestSuite against a local or Docker backend, printing the report
pub async fn run_suite(submission: &Path, tests: &Path, timeout_ms: Option<u64>, mock: bool) -> Result<()> {
    let config = Config::from_env();
    let request = load_request(submission, tests, timeout_ms)?;
    let engine = engine_for(&config, mock).await?;
    let limits = SuiteLimits::from_config(&config.sandbox, request.timeout_ms);

    let report = run_test_suite(
        engine.as_ref(),
        &request.submission,
        &request.test_cases,
        &limits,
        &CancelToken::never(),
    )
    .await;
    print_json(&report)
}

/// Queue a suite for a worker
pub async fn submit(submission: &Path, tests: &Path, timeout_ms: Option<u64>) -> Result<()> {
    let config = Config::from_env();
    let request = load_request(submission, tests, timeout_ms)?;
    let mut conn = connect(&config).await?;
    store::push_suite(&mut conn, &request)
        .await
        .context("Failed to queue suite")?;
    println!("{}", request.submission.id);
    Ok(())
}

pub async fn cancel(submission_id: Uuid) -> Result<()> {
    let config = Config::from_env();
    let mut conn = connect(&config).await?;
    store::request_cancel(&mut conn, &submission_id)
        .await
        .context("Failed to request cancellation")?;
    println!("cancellation requested for {}", submission_id);
    Ok(())
}

pub async fn show_report(submission_id: Uuid) -> Result<()> {
    let config = Config::from_env();
    let mut conn = connect(&config).await?;
    match store::load_report(&mut conn, &submission_id)
        .await
        .context("Failed to load report")?
    {
        Some(report) => print_json(&report),
        None => bail!("no report stored for {}", submission_id),
    }
}

/// ComputeIntegrityScore plus the timeline view
pub fn integrity(events: &Path) -> Result<()> {
    let events = read_json::<Vec<candor_common::IntegrityEvent>>(events)?;
    print_json(&assess(&events))
}

/// GenerateVerdict for one candidate
///
/// With `stored`, submission records come from Redis and the rationale
/// cache is the shared Redis cache; otherwise everything comes from the
/// facts file and the cache lives for this invocation only.
pub async fn verdict(facts_path: &Path, stored: bool) -> Result<()> {
    let config = Config::from_env();
    let mut input: AssessmentInput = read_json(facts_path)?;

    let cache: Arc<dyn RationaleCache> = if stored {
        let mut conn = connect(&config).await?;
        let records = store::load_submissions(&mut conn, input.candidate_id)
            .await
            .context("Failed to load submission records")?;
        input.submissions.extend(records);
        Arc::new(RedisCache::new(conn))
    } else {
        Arc::new(InMemoryCache::new())
    };

    let facts = CandidateFacts::from_input(&input, &config.expected_question_ids);
    let engine = VerdictEngine::new(reasoning_client(&config.reasoning), cache)
        .with_expected_questions(config.expected_question_ids.len());
    print_json(&engine.generate_verdict(&facts).await)
}

/// Resolve the backend exactly as `run` and the worker would
pub async fn show_sandbox_status(local: bool) -> Result<()> {
    let config = Config::from_env();
    let engine = engine_for(&config, local).await?;
    print_json(&sandbox_status(engine.as_ref()))
}

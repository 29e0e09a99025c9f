mod metrics;
mod runner;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use candor_common::redis::pop_suite;
use candor_common::Config;
use candor_sandbox::{cancel_pair, resolve_engine, sandbox_status, CancelToken, ExecutionEngine};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Clone)]
struct AppState {
    engine: Arc<dyn ExecutionEngine>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    info!("Candor worker booting...");

    let config = Config::from_env();
    metrics::init_metrics();

    let engine = resolve_engine(&config.sandbox)
        .await
        .context("No sandbox backend available")?;
    metrics::set_mode(engine.mode());
    info!(mode = %engine.mode(), "Sandbox backend resolved");

    let client = redis::Client::open(config.redis_url.as_str()).context("Invalid REDIS_URL")?;
    let mut redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;
    info!(redis_url = %config.redis_url, "Connected to Redis");

    let state = AppState {
        engine: Arc::clone(&engine),
    };
    let app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .with_state(state);
    let addr = format!("0.0.0.0:{}", config.metrics_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Health and metrics listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Metrics server stopped");
        }
    });

    // Ctrl-C cancels the in-flight suite; its incomplete report is still stored
    let (shutdown_handle, shutdown) = cancel_pair();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, draining in-flight suite");
                shutdown_handle.cancel();
            }
            Err(e) => error!(error = %e, "Failed to install CTRL+C handler"),
        }
    });

    worker_loop(engine.as_ref(), &mut redis_conn, &config, &shutdown).await;

    info!("Worker shutdown complete");
    Ok(())
}

async fn worker_loop(
    engine: &dyn ExecutionEngine,
    redis_conn: &mut ConnectionManager,
    config: &Config,
    shutdown: &CancelToken,
) {
    while !shutdown.is_cancelled() {
        // BLPOP with 5 second timeout so shutdown is observed
        match pop_suite(redis_conn, 5.0).await {
            Ok(Some(request)) => {
                info!(
                    submission_id = %request.submission.id,
                    candidate_id = request.submission.candidate_id,
                    question_id = request.submission.question_id,
                    tests = request.test_cases.len(),
                    source_bytes = request.submission.source_code.len(),
                    "Received suite"
                );
                // Storage failures are logged and counted inside; keep consuming
                let _ = runner::process(engine, redis_conn, &config.sandbox, &request, shutdown).await;
            }
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Queue read failed");
                tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;
            }
        }
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(sandbox_status(state.engine.as_ref())))
}

async fn metrics_handler() -> impl IntoResponse {
    (StatusCode::OK, metrics::render_metrics())
}

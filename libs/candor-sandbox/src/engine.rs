//! Execution Engine - Abstraction for Code Execution
//!
//! **Core Responsibility:**
//! Execute one submission invocation inside an isolated, resource-capped
//! worker and report either the returned value or a classified fault.
//!
//! **Critical Architectural Boundary:**
//! - Engine knows HOW to execute (Docker container, local interpreter)
//! - Engine does NOT know expected outputs
//! - Engine does NOT aggregate results
//!
//! DockerEngine (sandboxed) and LocalEngine (fallback-mock) are
//! interchangeable; the choice is made once at startup by `resolve_engine`
//! and injected wherever execution happens.

use crate::cancel::CancelToken;
use crate::docker::DockerEngine;
use crate::evaluator::TestExecutionOutput;
use crate::local::LocalEngine;
use async_trait::async_trait;
use candor_common::config::SandboxConfig;
use candor_common::types::{ExecutionMode, FaultKind};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Execution faults; all are recoverable at the harness level
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxFault {
    #[error("compile error: {0}")]
    CompileOrSyntax(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("timed out after {0}ms")]
    Timeout(u64),
    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),
    #[error("execution cancelled")]
    Cancelled,
    #[error("sandbox backend error: {0}")]
    Backend(String),
}

impl SandboxFault {
    pub fn kind(&self) -> FaultKind {
        match self {
            SandboxFault::CompileOrSyntax(_) => FaultKind::Compile,
            SandboxFault::Runtime(_) => FaultKind::Runtime,
            SandboxFault::Timeout(_) => FaultKind::Timeout,
            SandboxFault::ResourceExceeded(_) => FaultKind::Resource,
            SandboxFault::Cancelled => FaultKind::Cancelled,
            SandboxFault::Backend(_) => FaultKind::Backend,
        }
    }

    pub(crate) fn backend(err: impl std::fmt::Display) -> Self {
        SandboxFault::Backend(err.to_string())
    }
}

/// What the driver does after loading the submission
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Load only; surfaces compile and import-time faults
    Check,
    Invoke { function: String, args: Vec<Value> },
}

/// A single stateless execution request
#[derive(Debug, Clone)]
pub struct Invocation<'a> {
    pub source_code: &'a str,
    pub call: Call,
    pub timeout_ms: u64,
}

impl<'a> Invocation<'a> {
    pub fn check(source_code: &'a str, timeout_ms: u64) -> Self {
        Self {
            source_code,
            call: Call::Check,
            timeout_ms,
        }
    }

    pub fn call(source_code: &'a str, function: &str, args: Vec<Value>, timeout_ms: u64) -> Self {
        Self {
            source_code,
            call: Call::Invoke {
                function: function.to_string(),
                args,
            },
            timeout_ms,
        }
    }
}

/// Execution engine trait
///
/// Any implementation must guarantee:
/// 1. Each invocation runs in a fresh worker with no state carried over
/// 2. `timeout_ms` is enforced by hard-killing the worker
/// 3. A fired `CancelToken` kills and reaps the worker
/// 4. Faults are returned in the output, never raised
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    fn mode(&self) -> ExecutionMode;

    /// Execute one invocation; `index` on the output is set by the caller
    async fn execute(&self, invocation: &Invocation<'_>, cancel: &CancelToken) -> TestExecutionOutput;
}

/// Which backend is live, for status endpoints and operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SandboxStatus {
    pub mode: ExecutionMode,
    pub docker_available: bool,
    pub message: String,
}

pub fn sandbox_status(engine: &dyn ExecutionEngine) -> SandboxStatus {
    match engine.mode() {
        ExecutionMode::Sandboxed => SandboxStatus {
            mode: ExecutionMode::Sandboxed,
            docker_available: true,
            message: "Docker sandbox is ready for isolated code execution".to_string(),
        },
        ExecutionMode::FallbackMock => SandboxStatus {
            mode: ExecutionMode::FallbackMock,
            docker_available: false,
            message: "Running in fallback-mock mode (Docker not available); results are not isolated"
                .to_string(),
        },
    }
}

/// Resolve the isolation backend once at startup
///
/// Docker is preferred. When it cannot be reached and fallback is allowed,
/// the local interpreter engine is returned and every report it produces
/// is tagged `fallback-mock`.
pub async fn resolve_engine(config: &SandboxConfig) -> Result<Arc<dyn ExecutionEngine>, SandboxFault> {
    match DockerEngine::connect(config).await {
        Ok(engine) => {
            info!(image = %config.image, "Docker sandbox backend ready");
            Ok(Arc::new(engine))
        }
        Err(fault) if config.allow_mock_fallback => {
            warn!(
                error = %fault,
                "Docker unavailable; executing in fallback-mock mode without isolation"
            );
            Ok(Arc::new(LocalEngine::new(config)))
        }
        Err(fault) => Err(fault),
    }
}

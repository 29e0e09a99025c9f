pub mod cancel;
pub mod docker;
pub mod engine;
pub mod evaluator;
pub mod executor;
pub mod local;
pub mod script;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use engine::{resolve_engine, sandbox_status, ExecutionEngine, Invocation, SandboxFault, SandboxStatus};
pub use executor::{run_test_suite, SuiteLimits};
pub use docker::DockerEngine;
pub use local::LocalEngine;

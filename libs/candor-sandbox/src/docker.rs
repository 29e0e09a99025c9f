//! Docker backend (`sandboxed`)
//!
//! One throwaway container per invocation: no network, read-only root,
//! size-capped noexec tmpfs scratch, every capability dropped, unprivileged
//! user, memory/CPU/PID ceilings. The container is force-removed on every
//! exit path, including timeout and cancellation.
//!
//! Containers are labelled with the id of the worker that created them.
//! Several workers share one daemon, so the startup sweep only removes
//! containers that have outlived any possible invocation.

use crate::cancel::CancelToken;
use crate::engine::{ExecutionEngine, Invocation, SandboxFault};
use crate::evaluator::TestExecutionOutput;
use crate::script::{decode_output, driver_args};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use candor_common::config::SandboxConfig;
use candor_common::types::ExecutionMode;
use futures_util::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Label used to find containers orphaned by a crashed worker; the value
/// is the creating worker's instance id
pub const SANDBOX_LABEL: &str = "candor.sandbox";

/// Slack on top of the longest timeout for create, log collection and removal
const ORPHAN_GRACE: Duration = Duration::from_secs(60);

const SANDBOX_USER: &str = "65534:65534";
const SCRATCH_TMPFS: &str = "rw,noexec,nosuid,size=16m";
const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Resource ceilings applied to every container
#[derive(Debug, Clone)]
pub struct ContainerLimits {
    pub image: String,
    pub memory_bytes: i64,
    pub nano_cpus: i64,
    pub pids_limit: i64,
}

impl ContainerLimits {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            image: config.image.clone(),
            memory_bytes: config.memory_limit_bytes() as i64,
            nano_cpus: config.nano_cpus,
            pids_limit: config.pids_limit,
        }
    }
}

/// Container definition for one driver invocation
pub fn container_config(limits: &ContainerLimits, instance: &Uuid, driver_args: Vec<String>) -> Config<String> {
    let mut cmd = Vec::with_capacity(driver_args.len() + 1);
    cmd.push("python3".to_string());
    cmd.extend(driver_args);

    let host_config = HostConfig {
        network_mode: Some("none".to_string()),
        readonly_rootfs: Some(true),
        tmpfs: Some(HashMap::from([("/tmp".to_string(), SCRATCH_TMPFS.to_string())])),
        cap_drop: Some(vec!["ALL".to_string()]),
        security_opt: Some(vec!["no-new-privileges".to_string()]),
        memory: Some(limits.memory_bytes),
        // Equal to memory: no swap headroom
        memory_swap: Some(limits.memory_bytes),
        nano_cpus: Some(limits.nano_cpus),
        pids_limit: Some(limits.pids_limit),
        ..Default::default()
    };

    Config {
        image: Some(limits.image.clone()),
        cmd: Some(cmd),
        user: Some(SANDBOX_USER.to_string()),
        working_dir: Some("/tmp".to_string()),
        env: Some(vec!["PYTHONDONTWRITEBYTECODE=1".to_string()]),
        network_disabled: Some(true),
        attach_stdin: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        labels: Some(HashMap::from([(SANDBOX_LABEL.to_string(), instance.to_string())])),
        host_config: Some(host_config),
        ..Default::default()
    }
}

/// A live worker never keeps a container past its timeout, so anything
/// older than `max_age` was left behind by a crash
pub fn is_orphaned(created_unix_secs: i64, now_unix_secs: i64, max_age: Duration) -> bool {
    let age = now_unix_secs.saturating_sub(created_unix_secs);
    age > 0 && age as u64 > max_age.as_secs()
}

pub struct DockerEngine {
    docker: Docker,
    limits: ContainerLimits,
    instance: Uuid,
    orphan_age: Duration,
}

impl DockerEngine {
    /// Connect, verify the daemon answers, make sure the image exists and
    /// sweep containers left behind by an earlier crash
    pub async fn connect(config: &SandboxConfig) -> Result<Self, SandboxFault> {
        let docker = Docker::connect_with_local_defaults().map_err(SandboxFault::backend)?;
        docker.ping().await.map_err(SandboxFault::backend)?;

        let engine = Self {
            docker,
            limits: ContainerLimits::from_config(config),
            instance: Uuid::new_v4(),
            orphan_age: Duration::from_millis(config.max_timeout_ms) + ORPHAN_GRACE,
        };
        info!(instance = %engine.instance, "Docker sandbox connected");
        engine.ensure_image().await?;
        engine.sweep_orphans().await;
        Ok(engine)
    }

    async fn ensure_image(&self) -> Result<(), SandboxFault> {
        if self.docker.inspect_image(&self.limits.image).await.is_ok() {
            return Ok(());
        }

        info!(image = %self.limits.image, "Pulling sandbox image");
        let mut pull = Box::pin(self.docker.create_image(
            Some(CreateImageOptions {
                from_image: self.limits.image.as_str(),
                ..Default::default()
            }),
            None,
            None,
        ));
        while let Some(progress) = pull.next().await {
            progress.map_err(|e| {
                SandboxFault::Backend(format!("failed to pull {}: {}", self.limits.image, e))
            })?;
        }
        Ok(())
    }

    async fn sweep_orphans(&self) {
        let filters = HashMap::from([("label".to_string(), vec![SANDBOX_LABEL.to_string()])]);
        let containers = match self
            .docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                filters,
                ..Default::default()
            }))
            .await
        {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Could not list orphaned sandbox containers");
                return;
            }
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let orphans = containers.into_iter().filter(|c| {
            c.created
                .is_some_and(|created| is_orphaned(created, now, self.orphan_age))
        });
        for id in orphans.filter_map(|c| c.id) {
            info!(container = %id, "Removing orphaned sandbox container");
            self.reap(&id).await;
        }
    }

    async fn run(&self, invocation: &Invocation<'_>, cancel: &CancelToken) -> Result<Value, SandboxFault> {
        let args = driver_args(invocation, None)?;
        let name = format!("candor-{}", Uuid::new_v4());

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.as_str(),
                    platform: None,
                }),
                container_config(&self.limits, &self.instance, args),
            )
            .await
            .map_err(SandboxFault::backend)?;
        let id = created.id;

        let outcome = tokio::select! {
            result = self.drive(&id) => result,
            _ = tokio::time::sleep(Duration::from_millis(invocation.timeout_ms)) => {
                debug!(container = %id, timeout_ms = invocation.timeout_ms, "Killing timed out container");
                Err(SandboxFault::Timeout(invocation.timeout_ms))
            }
            _ = cancel.cancelled() => {
                debug!(container = %id, "Killing cancelled container");
                Err(SandboxFault::Cancelled)
            }
        };

        self.reap(&id).await;
        outcome
    }

    async fn drive(&self, id: &str) -> Result<Value, SandboxFault> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(SandboxFault::backend)?;

        let exit_code = self.wait_exit(id).await?;
        if self.was_oom_killed(id).await {
            return Err(SandboxFault::ResourceExceeded(format!(
                "memory limit of {} MB exceeded",
                self.limits.memory_bytes / (1024 * 1024)
            )));
        }

        let (stdout, stderr) = self.collect_logs(id).await?;
        decode_output(&stdout, &stderr, Some(exit_code))
    }

    async fn wait_exit(&self, id: &str) -> Result<i64, SandboxFault> {
        let mut wait = Box::pin(
            self.docker
                .wait_container(id, None::<WaitContainerOptions<String>>),
        );
        match wait.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exits are reported as errors by the daemon client
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(SandboxFault::backend(e)),
            None => Err(SandboxFault::Backend("container wait returned no status".to_string())),
        }
    }

    async fn was_oom_killed(&self, id: &str) -> bool {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(e) => {
                warn!(container = %id, error = %e, "Failed to inspect container state");
                false
            }
        }
    }

    async fn collect_logs(&self, id: &str) -> Result<(String, String), SandboxFault> {
        let mut logs = Box::pin(self.docker.logs(
            id,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        ));

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        while let Some(chunk) = logs.next().await {
            let (buffer, message) = match chunk.map_err(SandboxFault::backend)? {
                LogOutput::StdOut { message } => (&mut stdout, message),
                LogOutput::StdErr { message } => (&mut stderr, message),
                _ => continue,
            };
            let room = MAX_CAPTURE_BYTES.saturating_sub(buffer.len());
            buffer.extend_from_slice(&message[..message.len().min(room)]);
        }

        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    async fn reap(&self, id: &str) {
        let removed = self
            .docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = removed {
            warn!(container = %id, error = %e, "Failed to remove sandbox container");
        }
    }
}

#[async_trait]
impl ExecutionEngine for DockerEngine {
    fn mode(&self) -> ExecutionMode {
        ExecutionMode::Sandboxed
    }

    async fn execute(&self, invocation: &Invocation<'_>, cancel: &CancelToken) -> TestExecutionOutput {
        let started = Instant::now();
        let outcome = self.run(invocation, cancel).await;
        TestExecutionOutput::new(started.elapsed(), outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ContainerLimits {
        ContainerLimits {
            image: "python:3.11-alpine".to_string(),
            memory_bytes: 128 * 1024 * 1024,
            nano_cpus: 500_000_000,
            pids_limit: 64,
        }
    }

    #[test]
    fn test_container_is_isolated() {
        let config = container_config(&limits(), &Uuid::new_v4(), vec!["-I".to_string(), "-c".to_string()]);
        let host = config.host_config.clone().unwrap();

        assert_eq!(config.network_disabled, Some(true));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.readonly_rootfs, Some(true));
        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert_eq!(host.security_opt, Some(vec!["no-new-privileges".to_string()]));
        assert_eq!(config.user.as_deref(), Some(SANDBOX_USER));
        assert!(host.tmpfs.unwrap()["/tmp"].contains("noexec"));
    }

    #[test]
    fn test_container_resource_ceilings() {
        let host = container_config(&limits(), &Uuid::new_v4(), vec![]).host_config.unwrap();

        assert_eq!(host.memory, Some(128 * 1024 * 1024));
        assert_eq!(host.memory_swap, host.memory);
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert_eq!(host.pids_limit, Some(64));
    }

    #[test]
    fn test_container_command_and_label() {
        let instance = Uuid::new_v4();
        let config = container_config(
            &limits(),
            &instance,
            vec!["-I".to_string(), "-c".to_string(), "pass".to_string()],
        );

        assert_eq!(
            config.cmd,
            Some(vec!["python3".to_string(), "-I".to_string(), "-c".to_string(), "pass".to_string()])
        );
        assert_eq!(config.labels.unwrap()[SANDBOX_LABEL], instance.to_string());
    }

    #[test]
    fn test_only_stale_containers_are_orphans() {
        let max_age = Duration::from_millis(10_000) + ORPHAN_GRACE;
        let now = 1_760_000_000;

        // A peer's container that is still inside its timeout is left alone
        assert!(!is_orphaned(now - 5, now, max_age));
        assert!(!is_orphaned(now - 70, now, max_age));
        assert!(is_orphaned(now - 71, now, max_age));
        assert!(is_orphaned(now - 3600, now, max_age));
        // Clock skew between daemon and worker
        assert!(!is_orphaned(now + 30, now, max_age));
    }
}

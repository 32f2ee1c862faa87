use std::collections::HashMap;

use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, RemoveContainerOptions,
    WaitContainerOptions,
};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::RunnerError;

/// Outcome of running one plugin/build container to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Success,
    NonZero(i64),
    Killed,
}

/// Create the ambassador/data container: a long-lived container that
/// owns the shared workspace volume and gives the pipeline a stable
/// network endpoint every other step's container links against.
pub async fn create_ambassador(
    docker: &Docker,
    name: &str,
) -> Result<String, RunnerError> {
    let options = CreateContainerOptions {
        name,
        platform: None,
    };
    let config = ContainerConfig {
        image: Some("busybox:latest"),
        cmd: Some(vec!["sleep", "infinity"]),
        host_config: Some(HostConfig {
            network_mode: Some("bridge".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };
    let created = docker.create_container(Some(options), config).await?;
    docker.start_container::<String>(&created.id, None).await?;
    Ok(created.id)
}

pub async fn teardown(docker: &Docker, container_id: &str) {
    let _ = docker
        .remove_container(
            container_id,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await;
}

/// Run one step container to completion, streaming combined
/// stdout/stderr lines to `log_tx` as they arrive. Observes `cancel`
/// at container creation, during the wait, and while reading logs.
pub async fn run_step(
    docker: &Docker,
    name: &str,
    image: &str,
    env: &HashMap<String, String>,
    links: &[String],
    log_tx: &mpsc::UnboundedSender<String>,
    cancel: &CancellationToken,
) -> Result<ExitOutcome, RunnerError> {
    if cancel.is_cancelled() {
        return Ok(ExitOutcome::Killed);
    }

    let env_vec: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let options = CreateContainerOptions {
        name,
        platform: None,
    };
    let config = ContainerConfig {
        image: Some(image),
        env: Some(env_vec.iter().map(|s| s.as_str()).collect()),
        host_config: Some(HostConfig {
            links: Some(links.to_vec()),
            network_mode: Some("bridge".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let created = tokio::select! {
        result = docker.create_container(Some(options), config) => result?,
        _ = cancel.cancelled() => return Ok(ExitOutcome::Killed),
    };

    docker.start_container::<String>(&created.id, None).await?;

    let logs_id = created.id.clone();
    let docker_clone = docker.clone();
    let log_tx = log_tx.clone();
    let log_cancel = cancel.clone();
    let log_task = tokio::spawn(async move {
        let options = bollard::container::LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            ..Default::default()
        };
        let mut stream = docker_clone.logs(&logs_id, Some(options));
        loop {
            tokio::select! {
                next = stream.next() => {
                    match next {
                        Some(Ok(chunk)) => {
                            let _ = log_tx.send(chunk.to_string());
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = log_cancel.cancelled() => break,
            }
        }
    });

    let wait_result = tokio::select! {
        result = docker.wait_container(&created.id, None::<WaitContainerOptions<String>>).next() => result,
        _ = cancel.cancelled() => {
            teardown(docker, &created.id).await;
            log_task.abort();
            return Ok(ExitOutcome::Killed);
        }
    };

    log_task.abort();
    teardown(docker, &created.id).await;

    match wait_result {
        Some(Ok(response)) if response.status_code == 0 => Ok(ExitOutcome::Success),
        Some(Ok(response)) => Ok(ExitOutcome::NonZero(response.status_code)),
        Some(Err(_)) | None => Err(RunnerError::Internal(format!(
            "container {} exited without a wait response",
            created.id
        ))),
    }
}

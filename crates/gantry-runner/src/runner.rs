use std::sync::Arc;

use bollard::Docker;
use gantry_bus::{Bus, Event};
use gantry_config::Step;
use gantry_store::Store;
use gantry_types::Status;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::container::{self, ExitOutcome};
use crate::error::RunnerError;
use crate::state::Phase;
use crate::work::Work;

/// Runs one job end to end: `setup -> clone -> services -> build ->
/// publish -> deploy -> notify -> terminal`. Owned by one worker for
/// the job's full lifetime.
pub struct Runner {
    docker: Docker,
    bus: Bus,
    store: Arc<dyn Store>,
}

impl Runner {
    pub fn new(docker: Docker, bus: Bus, store: Arc<dyn Store>) -> Self {
        Self { docker, bus, store }
    }

    /// Execute `work`, observing `cancel` and the repo's configured
    /// timeout. Always leaves the job in a terminal status, persisted
    /// and published, regardless of how it exits.
    pub async fn run(&self, mut work: Work, cancel: CancellationToken) -> Result<(), RunnerError> {
        let job_id = work.job.id;
        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<String>();

        let bus = self.bus.clone();
        let drain_task = tokio::spawn(async move {
            let mut buffer = Vec::new();
            while let Some(line) = log_rx.recv().await {
                bus.publish(Event::LogAppend {
                    job_id,
                    line: line.clone(),
                });
                buffer.extend_from_slice(line.as_bytes());
                buffer.push(b'\n');
            }
            buffer
        });

        work.job.status = Status::Running;
        work.job.started_at = Some(chrono::Utc::now());
        self.publish_job(&work).await;
        self.rollup_build(&work).await;

        // The timer only requests cancellation; `drive` always runs to
        // completion so containers it has already started get torn down
        // through the same cancel-aware path a manual cancel takes,
        // instead of being abandoned by a dropped future.
        let timed_out = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let timeout_cancel = cancel.clone();
        let timeout_duration = work.timeout;
        let timeout_flag = timed_out.clone();
        let timeout_task = tokio::spawn(async move {
            tokio::time::sleep(timeout_duration).await;
            timeout_flag.store(true, std::sync::atomic::Ordering::SeqCst);
            timeout_cancel.cancel();
        });

        let result = self.drive(&mut work, &log_tx, &cancel).await;
        timeout_task.abort();

        let result = match result {
            Err(RunnerError::Cancelled) if timed_out.load(std::sync::atomic::Ordering::SeqCst) => {
                Err(RunnerError::TimedOut)
            }
            other => other,
        };

        drop(log_tx);
        let mut log_buffer = drain_task.await.unwrap_or_default();

        let final_status = match &result {
            Ok(()) => Status::Success,
            Err(RunnerError::NonZeroExit(_)) => Status::Failure,
            Err(RunnerError::Cancelled) | Err(RunnerError::TimedOut) => Status::Killed,
            Err(_) => Status::Error,
        };

        work.job.status = final_status;
        work.job.finished_at = Some(chrono::Utc::now());
        work.job.exit_code = match &result {
            Ok(()) => Some(0),
            Err(RunnerError::NonZeroExit(code)) => Some(*code as i32),
            Err(_) => Some(255),
        };

        self.finish(&work, &mut log_buffer).await;
        result
    }

    async fn drive(
        &self,
        work: &mut Work,
        log_tx: &mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
    ) -> Result<(), RunnerError> {
        let ambassador_name = format!("gantry-ambassador-{}", work.job.id);
        let ambassador_id = container::create_ambassador(&self.docker, &ambassador_name).await?;
        let links = vec![format!("{ambassador_name}:workspace")];

        let teardown_ambassador = || async {
            container::teardown(&self.docker, &ambassador_id).await;
        };

        let outcome = self.run_pipeline(work, &links, log_tx, cancel).await;
        teardown_ambassador().await;
        outcome
    }

    async fn run_pipeline(
        &self,
        work: &mut Work,
        links: &[String],
        log_tx: &mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
    ) -> Result<(), RunnerError> {
        let mut phase = Phase::Clone;

        if let Some(clone_step) = work.config.clone.clone() {
            let outcome = self
                .run_one(&clone_step, work, links, log_tx, cancel, "clone")
                .await?;
            self.require_success(outcome)?;
        }

        phase = phase.next();
        debug_assert_eq!(phase, Phase::Services);
        for (i, service) in work.config.services.clone().iter().enumerate() {
            let outcome = self
                .run_one(
                    service,
                    work,
                    links,
                    log_tx,
                    cancel,
                    &format!("service-{i}"),
                )
                .await?;
            self.require_success(outcome)?;
        }

        phase = phase.next();
        debug_assert_eq!(phase, Phase::Build);
        let build_step = work.config.build.clone();
        let outcome = self
            .run_one(&build_step, work, links, log_tx, cancel, "build")
            .await?;
        let (build_status, build_exit_code) = match outcome {
            ExitOutcome::Success => (Status::Success, 0),
            ExitOutcome::NonZero(code) => {
                warn!(job_id = %work.job.id, code, "build step failed");
                (Status::Failure, code)
            }
            ExitOutcome::Killed => return Err(RunnerError::Cancelled),
        };

        phase = phase.next();
        debug_assert_eq!(phase, Phase::Publish);
        self.run_when_gated(
            &work.config.publish.clone(),
            work,
            links,
            log_tx,
            cancel,
            build_status,
            "publish",
        )
        .await?;

        phase = phase.next();
        debug_assert_eq!(phase, Phase::Deploy);
        self.run_when_gated(
            &work.config.deploy.clone(),
            work,
            links,
            log_tx,
            cancel,
            build_status,
            "deploy",
        )
        .await?;

        phase = phase.next();
        debug_assert_eq!(phase, Phase::Notify);
        // Notify failures never fail the job.
        if let Err(e) = self
            .run_when_gated(
                &work.config.notify.clone(),
                work,
                links,
                log_tx,
                cancel,
                build_status,
                "notify",
            )
            .await
        {
            warn!(job_id = %work.job.id, error = %e, "notify step failed, ignoring");
        }

        if build_status == Status::Failure {
            return Err(RunnerError::NonZeroExit(build_exit_code));
        }
        Ok(())
    }

    async fn run_when_gated(
        &self,
        steps: &[Step],
        work: &Work,
        links: &[String],
        log_tx: &mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
        build_status: Status,
        label: &str,
    ) -> Result<(), RunnerError> {
        for (i, step) in steps.iter().enumerate() {
            let runs = step.when.as_ref().map_or(true, |filter| {
                filter.matches(build_status.as_str(), &work.build.branch, work.build.event.as_str())
            });
            if !runs {
                continue;
            }
            let outcome = self
                .run_one(step, work, links, log_tx, cancel, &format!("{label}-{i}"))
                .await?;
            self.require_success(outcome)?;
        }
        Ok(())
    }

    async fn run_one(
        &self,
        step: &Step,
        work: &Work,
        links: &[String],
        log_tx: &mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
        label: &str,
    ) -> Result<ExitOutcome, RunnerError> {
        let name = format!("gantry-job-{}-{label}", work.job.id);
        let mut env = work.axis.iter().map(|(k, v)| (k.clone(), v.clone())).collect::<std::collections::HashMap<_, _>>();
        env.extend(work.job.environment.clone());
        container::run_step(&self.docker, &name, &step.image, &env, links, log_tx, cancel).await
    }

    fn require_success(&self, outcome: ExitOutcome) -> Result<(), RunnerError> {
        match outcome {
            ExitOutcome::Success => Ok(()),
            ExitOutcome::NonZero(code) => Err(RunnerError::NonZeroExit(code)),
            ExitOutcome::Killed => Err(RunnerError::Cancelled),
        }
    }

    async fn publish_job(&self, work: &Work) {
        self.bus.publish(Event::JobUpdate {
            repo_id: work.repo.id,
            build_id: work.build.id,
            job: work.job.clone(),
        });
    }

    async fn finish(&self, work: &Work, log_buffer: &mut Vec<u8>) {
        self.publish_job(work).await;
        self.bus.publish(Event::LogClose {
            job_id: work.job.id,
            status: work.job.status,
        });

        if let Err(e) = self.store.update_job(&work.job).await {
            error!(job_id = %work.job.id, error = %e, "failed to persist job status");
        }
        if !log_buffer.is_empty() {
            if let Err(e) = self.store.write_log(work.job.id, log_buffer).await {
                error!(job_id = %work.job.id, error = %e, "failed to persist job log");
            }
            log_buffer.clear();
        }
        info!(job_id = %work.job.id, status = %work.job.status, "job finished");
        self.rollup_build(work).await;
    }

    /// Recompute the build's status from its jobs and persist/publish
    /// the change if it moved. `work.job` may not be reflected in the
    /// store yet (its own update can race this call, or happen after
    /// it), so its current in-memory status overrides whatever is on
    /// record for that one job.
    async fn rollup_build(&self, work: &Work) {
        let jobs = match self.store.list_jobs(work.build.id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(build_id = %work.build.id, error = %e, "failed to list jobs for build rollup");
                return;
            }
        };
        let statuses: Vec<Status> = jobs
            .iter()
            .map(|j| if j.id == work.job.id { work.job.status } else { j.status })
            .collect();
        let rolled = Status::rollup(&statuses);

        let mut build = match self.store.get_build(work.build.id).await {
            Ok(build) => build,
            Err(e) => {
                error!(build_id = %work.build.id, error = %e, "failed to load build for rollup");
                return;
            }
        };
        if build.status == rolled {
            return;
        }

        build.status = rolled;
        let now = chrono::Utc::now();
        if rolled == Status::Running && build.started_at.is_none() {
            build.started_at = Some(now);
        }
        if rolled.is_terminal() && build.finished_at.is_none() {
            build.finished_at = Some(now);
        }

        if let Err(e) = self.store.update_build(&build).await {
            error!(build_id = %build.id, error = %e, "failed to persist build status");
            return;
        }
        self.bus.publish(Event::BuildUpdate {
            repo_id: work.repo.id,
            build,
        });
    }
}


use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "server")]
use async_trait::async_trait;
use bollard::Docker;
use gantry_bus::{Bus, Event};
use gantry_config::Config;
use gantry_driver::Netrc;
use gantry_queue::{Queue, Removed};
use gantry_runner::{Credentials, Runner, Work};
use gantry_store::Store;
use gantry_types::{Build, Job, Repo, Status, User};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Per-build bookkeeping needed to cancel it later: the token every
/// job's runner observes, and the jobs as scheduled so a cancel can
/// excise still-pending ones from the queue and mark them killed even
/// before they're ever pulled by a worker.
struct Tracked {
    repo_id: Uuid,
    build_id: Uuid,
    cancel: CancellationToken,
    jobs: Vec<Job>,
}

/// Schedules jobs onto a fixed worker pool and owns a
/// `(repo_full_name, build_number) -> cancel token` registry so a
/// later cancel request can find the right in-flight build.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    bus: Bus,
    queue: Arc<Queue<Work>>,
    docker: Docker,
    tracked: Mutex<HashMap<(String, i64), Tracked>>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn Store>, bus: Bus, queue: Arc<Queue<Work>>, docker: Docker) -> Self {
        Self {
            store,
            bus,
            queue,
            docker,
            tracked: Mutex::new(HashMap::new()),
        }
    }

    /// Recover from an unclean shutdown by force-killing every
    /// non-terminal build/job, then start `worker_count` workers
    /// pulling from the queue. Must run before any hook is accepted.
    pub async fn boot(self: &Arc<Self>, worker_count: usize) -> Result<(), gantry_store::StoreError> {
        self.store.kill_all_non_terminal().await?;
        for worker_id in 0..worker_count.max(1) {
            let this = self.clone();
            tokio::spawn(async move { this.run_worker(worker_id).await });
        }
        Ok(())
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize) {
        info!(worker_id, "orchestrator worker starting");
        loop {
            let (job_id, work) = self.queue.pull_ack().await;
            let cancel = {
                let tracked = self.tracked.lock().await;
                tracked
                    .get(&(work.repo.full_name.clone(), work.build.number))
                    .map(|t| t.cancel.clone())
                    .unwrap_or_default()
            };
            let runner = Runner::new(self.docker.clone(), self.bus.clone(), self.store.clone());
            if let Err(e) = runner.run(work, cancel).await {
                warn!(worker_id, job_id = %job_id, error = %e, "job finished with an error");
            }
            self.queue.ack(job_id).await;
        }
    }

    /// Build `Work` for every job and enqueue it, registering a fresh
    /// cancel token for `(repo.full_name, build.number)`.
    #[allow(clippy::too_many_arguments)]
    pub async fn schedule(
        &self,
        user: User,
        repo: Repo,
        build: Build,
        jobs: Vec<Job>,
        config: Config,
        netrc: Netrc,
        secret: Option<String>,
    ) {
        self.bus.publish(Event::BuildUpdate {
            repo_id: repo.id,
            build: build.clone(),
        });

        let cancel = CancellationToken::new();
        {
            let mut tracked = self.tracked.lock().await;
            tracked.insert(
                (repo.full_name.clone(), build.number),
                Tracked {
                    repo_id: repo.id,
                    build_id: build.id,
                    cancel: cancel.clone(),
                    jobs: jobs.clone(),
                },
            );
        }

        let credentials = Credentials {
            netrc: Some(format!("machine {} login {} password {}", netrc.machine, netrc.login, netrc.password)),
            deploy_private_key: if repo.deploy_private_key.is_empty() {
                None
            } else {
                Some(repo.deploy_private_key.clone())
            },
        };
        let _ = secret; // plugin secret material is passed through step settings, not used directly here

        for job in jobs {
            self.bus.publish(Event::JobUpdate {
                repo_id: repo.id,
                build_id: build.id,
                job: job.clone(),
            });

            let axis: gantry_config::Axis = job.environment.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            let work = Work {
                user: user.clone(),
                repo: repo.clone(),
                build: build.clone(),
                job: job.clone(),
                config: config.clone(),
                axis,
                credentials: credentials.clone(),
                timeout: std::time::Duration::from_secs(u64::from(repo.timeout_minutes.max(1)) * 60),
            };
            self.queue.publish(job.id, work).await;
        }
    }

    /// Cancel a build: signal its token (tearing down any inflight
    /// containers within ~1s) and excise any jobs still pending from
    /// the queue. A job excised while still pending never reaches a
    /// runner, so nothing else would ever give it a terminal status;
    /// this marks it `killed` directly. A build with no tracked entry
    /// (already terminal, or never scheduled) is a no-op.
    pub async fn cancel(&self, repo_full_name: &str, build_number: i64) -> bool {
        let entry = {
            let tracked = self.tracked.lock().await;
            tracked
                .get(&(repo_full_name.to_string(), build_number))
                .map(|t| (t.repo_id, t.build_id, t.cancel.clone(), t.jobs.clone()))
        };
        let Some((repo_id, build_id, cancel, jobs)) = entry else {
            return false;
        };
        cancel.cancel();
        let mut any_killed = false;
        for mut job in jobs {
            if self.queue.remove(job.id).await != Removed::Pending {
                continue;
            }
            job.status = Status::Killed;
            job.finished_at = Some(chrono::Utc::now());
            if let Err(e) = self.store.update_job(&job).await {
                warn!(job_id = %job.id, error = %e, "failed to persist killed status for cancelled pending job");
                continue;
            }
            any_killed = true;
            self.bus.publish(Event::JobUpdate {
                repo_id,
                build_id,
                job,
            });
        }
        // A build cancelled before any job ever started running has no
        // runner around to roll its status up; do it here so it still
        // reaches a terminal status instead of staying `pending`.
        if any_killed {
            self.rollup_build(repo_id, build_id).await;
        }
        true
    }

    async fn rollup_build(&self, repo_id: Uuid, build_id: Uuid) {
        let jobs = match self.store.list_jobs(build_id).await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "failed to list jobs for build rollup");
                return;
            }
        };
        let statuses: Vec<Status> = jobs.iter().map(|j| j.status).collect();
        let rolled = Status::rollup(&statuses);

        let mut build = match self.store.get_build(build_id).await {
            Ok(build) => build,
            Err(e) => {
                warn!(build_id = %build_id, error = %e, "failed to load build for rollup");
                return;
            }
        };
        if build.status == rolled {
            return;
        }
        build.status = rolled;
        if rolled.is_terminal() && build.finished_at.is_none() {
            build.finished_at = Some(chrono::Utc::now());
        }
        if let Err(e) = self.store.update_build(&build).await {
            warn!(build_id = %build_id, error = %e, "failed to persist build status");
            return;
        }
        self.bus.publish(Event::BuildUpdate { repo_id, build });
    }
}

#[cfg(feature = "server")]
#[async_trait]
impl gantry_web::CancelHandler for Orchestrator {
    async fn cancel_build(&self, repo_full_name: &str, build_number: i64) -> Result<bool, gantry_web::WebError> {
        Ok(self.cancel(repo_full_name, build_number).await)
    }
}

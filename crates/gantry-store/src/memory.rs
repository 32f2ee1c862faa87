use std::collections::HashMap;

use async_trait::async_trait;
use gantry_types::{Build, Job, Repo, Status, User};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::Store;

#[derive(Default)]
struct Inner {
    repos: HashMap<Uuid, Repo>,
    users: HashMap<Uuid, User>,
    builds: HashMap<Uuid, Build>,
    jobs: HashMap<Uuid, Job>,
    logs: HashMap<Uuid, Vec<u8>>,
    build_numbers: HashMap<Uuid, i64>,
}

/// Default `Store` implementation: everything lives in process memory,
/// so a restart loses all history. Used by tests and the in-process
/// demo binary; the `postgres` feature swaps in a durable
/// implementation without changing callers.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub async fn seed_repo(&self, repo: Repo) {
        self.inner.lock().await.repos.insert(repo.id, repo);
    }

    pub async fn seed_user(&self, user: User) {
        self.inner.lock().await.users.insert(user.id, user);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_repo_by_full_name(&self, full_name: &str) -> Result<Repo, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .repos
            .values()
            .find(|r| r.full_name == full_name)
            .cloned()
            .ok_or_else(|| StoreError::RepoNotFound(full_name.to_string()))
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::UserNotFound(id))
    }

    async fn create_build(
        &self,
        mut build: Build,
        mut jobs: Vec<Job>,
    ) -> Result<(Build, Vec<Job>), StoreError> {
        let mut inner = self.inner.lock().await;

        let next_number = inner
            .build_numbers
            .entry(build.repo_id)
            .and_modify(|n| *n += 1)
            .or_insert(1);
        build.number = *next_number;

        for (i, job) in jobs.iter_mut().enumerate() {
            job.build_id = build.id;
            job.number = i as i64 + 1;
        }

        inner.builds.insert(build.id, build.clone());
        for job in &jobs {
            inner.jobs.insert(job.id, job.clone());
        }

        Ok((build, jobs))
    }

    async fn update_build(&self, build: &Build) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.builds.contains_key(&build.id) {
            return Err(StoreError::BuildNotFound(build.id));
        }
        inner.builds.insert(build.id, build.clone());
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job.id) {
            return Err(StoreError::JobNotFound(job.id));
        }
        inner.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_build(&self, id: Uuid) -> Result<Build, StoreError> {
        let inner = self.inner.lock().await;
        inner.builds.get(&id).cloned().ok_or(StoreError::BuildNotFound(id))
    }

    async fn list_jobs(&self, build_id: Uuid) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .jobs
            .values()
            .filter(|j| j.build_id == build_id)
            .cloned()
            .collect())
    }

    async fn get_build_last(
        &self,
        repo_id: Uuid,
        branch: &str,
    ) -> Result<Option<Build>, StoreError> {
        let inner = self.inner.lock().await;
        let build = inner
            .builds
            .values()
            .filter(|b| b.repo_id == repo_id && b.branch == branch)
            .max_by_key(|b| b.number)
            .cloned();
        Ok(build)
    }

    async fn write_log(&self, job_id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.logs.entry(job_id).or_default().extend_from_slice(bytes);
        Ok(())
    }

    async fn read_log(&self, job_id: Uuid) -> Result<Vec<u8>, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .logs
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::LogNotFound(job_id))
    }

    async fn kill_all_non_terminal(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for build in inner.builds.values_mut() {
            if !build.is_terminal() {
                build.status = Status::Killed;
            }
        }
        for job in inner.jobs.values_mut() {
            if !job.is_terminal() {
                job.status = Status::Killed;
            }
        }
        Ok(())
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gantry_types::{AllowFlags, EventKind};
    use std::collections::HashMap as Map;

    fn sample_repo() -> Repo {
        Repo {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            owner: "acme".into(),
            name: "widgets".into(),
            full_name: "acme/widgets".into(),
            clone_url: "git://example.com/acme/widgets".into(),
            default_branch: "main".into(),
            timeout_minutes: 60,
            is_private: false,
            is_trusted: false,
            allow: AllowFlags::default(),
            hash: "secret".into(),
            deploy_public_key: String::new(),
            deploy_private_key: String::new(),
            avatar_url: None,
            link_url: None,
        }
    }

    fn sample_build(repo_id: Uuid, branch: &str) -> Build {
        Build {
            id: Uuid::new_v4(),
            repo_id,
            number: 0,
            event: EventKind::Push,
            commit_sha: "abc123".into(),
            branch: branch.into(),
            git_ref: "refs/heads/main".into(),
            message: "test".into(),
            author: "octocat".into(),
            status: Status::Pending,
            started_at: None,
            finished_at: None,
            created_at: Utc::now(),
        }
    }

    fn sample_job(build_id: Uuid) -> Job {
        Job {
            id: Uuid::new_v4(),
            build_id,
            number: 0,
            status: Status::Pending,
            exit_code: None,
            started_at: None,
            finished_at: None,
            environment: Map::new(),
        }
    }

    #[tokio::test]
    async fn create_build_assigns_dense_numbers_per_repo() {
        let store = MemoryStore::new();
        let repo = sample_repo();

        let b1 = sample_build(repo.id, "main");
        let (b1, _) = store.create_build(b1, vec![]).await.unwrap();
        assert_eq!(b1.number, 1);

        let b2 = sample_build(repo.id, "main");
        let (b2, _) = store.create_build(b2, vec![]).await.unwrap();
        assert_eq!(b2.number, 2);
    }

    #[tokio::test]
    async fn create_build_assigns_dense_job_numbers_from_one() {
        let store = MemoryStore::new();
        let repo = sample_repo();
        let build = sample_build(repo.id, "main");
        let jobs = vec![
            sample_job(Uuid::nil()),
            sample_job(Uuid::nil()),
            sample_job(Uuid::nil()),
        ];

        let (build, jobs) = store.create_build(build, jobs).await.unwrap();
        let numbers: Vec<i64> = jobs.iter().map(|j| j.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(jobs.iter().all(|j| j.build_id == build.id));
    }

    #[tokio::test]
    async fn kill_all_non_terminal_only_touches_unfinished_work() {
        let store = MemoryStore::new();
        let repo = sample_repo();
        let mut build = sample_build(repo.id, "main");
        build.status = Status::Running;
        let (build, _) = store.create_build(build, vec![]).await.unwrap();

        let mut finished = sample_build(repo.id, "main");
        finished.status = Status::Success;
        let (finished, _) = store.create_build(finished, vec![]).await.unwrap();

        store.kill_all_non_terminal().await.unwrap();

        let reloaded = store.get_build_last(repo.id, "main").await.unwrap().unwrap();
        assert_eq!(reloaded.number, finished.number);
        assert_eq!(reloaded.status, Status::Success);

        let _ = build;
    }

    #[tokio::test]
    async fn read_log_returns_written_bytes() {
        let store = MemoryStore::new();
        let job_id = Uuid::new_v4();
        store.write_log(job_id, b"hello ").await.unwrap();
        store.write_log(job_id, b"world").await.unwrap();

        let log = store.read_log(job_id).await.unwrap();
        assert_eq!(log, b"hello world");
    }
}

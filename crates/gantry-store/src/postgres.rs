use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_types::{AllowFlags, Build, EventKind, Job, Repo, Status, User};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Row};
use std::collections::HashMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::StoreError;
use crate::traits::Store;

/// `Store` implementation backed by Postgres, hand-written against
/// `sqlx`'s runtime-checked query API since the schema is created by
/// migrations not present at compile time.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct RepoRow {
    id: Uuid,
    owner_id: Uuid,
    owner: String,
    name: String,
    full_name: String,
    clone_url: String,
    default_branch: String,
    timeout_minutes: i32,
    is_private: bool,
    is_trusted: bool,
    allow_push: bool,
    allow_pull_request: bool,
    allow_tag: bool,
    allow_deploy: bool,
    hash: String,
    deploy_public_key: String,
    deploy_private_key: String,
    avatar_url: Option<String>,
    link_url: Option<String>,
}

impl From<RepoRow> for Repo {
    fn from(r: RepoRow) -> Self {
        Repo {
            id: r.id,
            owner_id: r.owner_id,
            owner: r.owner,
            name: r.name,
            full_name: r.full_name,
            clone_url: r.clone_url,
            default_branch: r.default_branch,
            timeout_minutes: r.timeout_minutes as u32,
            is_private: r.is_private,
            is_trusted: r.is_trusted,
            allow: AllowFlags {
                push: r.allow_push,
                pull_request: r.allow_pull_request,
                tag: r.allow_tag,
                deploy: r.allow_deploy,
            },
            hash: r.hash,
            deploy_public_key: r.deploy_public_key,
            deploy_private_key: r.deploy_private_key,
            avatar_url: r.avatar_url,
            link_url: r.link_url,
        }
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    login: String,
    token: String,
    refresh_token: String,
    token_expiry: DateTime<Utc>,
    admin: bool,
    hash: String,
    email: Option<String>,
    avatar_url: Option<String>,
}

impl From<UserRow> for User {
    fn from(u: UserRow) -> Self {
        User {
            id: u.id,
            login: u.login,
            token: u.token,
            refresh_token: u.refresh_token,
            token_expiry: u.token_expiry,
            admin: u.admin,
            hash: u.hash,
            email: u.email,
            avatar_url: u.avatar_url,
        }
    }
}

#[derive(FromRow)]
struct BuildRow {
    id: Uuid,
    repo_id: Uuid,
    number: i64,
    event: String,
    commit_sha: String,
    branch: String,
    git_ref: String,
    message: String,
    author: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<BuildRow> for Build {
    type Error = StoreError;

    fn try_from(b: BuildRow) -> Result<Self, Self::Error> {
        Ok(Build {
            id: b.id,
            repo_id: b.repo_id,
            number: b.number,
            event: parse_event(&b.event),
            commit_sha: b.commit_sha,
            branch: b.branch,
            git_ref: b.git_ref,
            message: b.message,
            author: b.author,
            status: Status::from_str(&b.status)
                .unwrap_or(Status::Error),
            started_at: b.started_at,
            finished_at: b.finished_at,
            created_at: b.created_at,
        })
    }
}

fn parse_event(s: &str) -> EventKind {
    match s {
        "push" => EventKind::Push,
        "pull_request" => EventKind::PullRequest,
        "tag" => EventKind::Tag,
        "deploy" => EventKind::Deploy,
        _ => EventKind::Push,
    }
}

#[derive(FromRow)]
struct JobRow {
    id: Uuid,
    build_id: Uuid,
    number: i64,
    status: String,
    exit_code: Option<i32>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    environment: Value,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(j: JobRow) -> Result<Self, Self::Error> {
        let environment: HashMap<String, String> =
            serde_json::from_value(j.environment).unwrap_or_default();
        Ok(Job {
            id: j.id,
            build_id: j.build_id,
            number: j.number,
            status: Status::from_str(&j.status).unwrap_or(Status::Error),
            exit_code: j.exit_code,
            started_at: j.started_at,
            finished_at: j.finished_at,
            environment,
        })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_repo_by_full_name(&self, full_name: &str) -> Result<Repo, StoreError> {
        let row: RepoRow = sqlx::query_as(
            r#"SELECT id, owner_id, owner, name, full_name, clone_url, default_branch,
                      timeout_minutes, is_private, is_trusted,
                      allow_push, allow_pull_request, allow_tag, allow_deploy,
                      hash, deploy_public_key, deploy_private_key, avatar_url, link_url
               FROM repos WHERE full_name = $1"#,
        )
        .bind(full_name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::RepoNotFound(full_name.to_string()))?;
        Ok(row.into())
    }

    async fn get_user(&self, id: Uuid) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"SELECT id, login, token, refresh_token, token_expiry, admin, hash, email, avatar_url
               FROM users WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::UserNotFound(id))?;
        Ok(row.into())
    }

    async fn create_build(
        &self,
        mut build: Build,
        mut jobs: Vec<Job>,
    ) -> Result<(Build, Vec<Job>), StoreError> {
        let mut tx = self.pool.begin().await?;

        let number: i64 = sqlx::query_scalar(
            r#"INSERT INTO build_counters (repo_id, last_number)
               VALUES ($1, 1)
               ON CONFLICT (repo_id) DO UPDATE SET last_number = build_counters.last_number + 1
               RETURNING last_number"#,
        )
        .bind(build.repo_id)
        .fetch_one(&mut *tx)
        .await?;
        build.number = number;

        sqlx::query(
            r#"INSERT INTO builds
                (id, repo_id, number, event, commit_sha, branch, git_ref, message, author,
                 status, started_at, finished_at, created_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)"#,
        )
        .bind(build.id)
        .bind(build.repo_id)
        .bind(build.number)
        .bind(build.event.as_str())
        .bind(&build.commit_sha)
        .bind(&build.branch)
        .bind(&build.git_ref)
        .bind(&build.message)
        .bind(&build.author)
        .bind(build.status.as_str())
        .bind(build.started_at)
        .bind(build.finished_at)
        .bind(build.created_at)
        .execute(&mut *tx)
        .await?;

        for (i, job) in jobs.iter_mut().enumerate() {
            job.build_id = build.id;
            job.number = i as i64 + 1;
            let environment = serde_json::to_value(&job.environment).unwrap_or(Value::Null);
            sqlx::query(
                r#"INSERT INTO jobs
                    (id, build_id, number, status, exit_code, started_at, finished_at, environment)
                   VALUES ($1,$2,$3,$4,$5,$6,$7,$8)"#,
            )
            .bind(job.id)
            .bind(job.build_id)
            .bind(job.number)
            .bind(job.status.as_str())
            .bind(job.exit_code)
            .bind(job.started_at)
            .bind(job.finished_at)
            .bind(environment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok((build, jobs))
    }

    async fn update_build(&self, build: &Build) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE builds SET status = $2, started_at = $3, finished_at = $4 WHERE id = $1"#,
        )
        .bind(build.id)
        .bind(build.status.as_str())
        .bind(build.started_at)
        .bind(build.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_job(&self, job: &Job) -> Result<(), StoreError> {
        sqlx::query(
            r#"UPDATE jobs SET status = $2, exit_code = $3, started_at = $4, finished_at = $5
               WHERE id = $1"#,
        )
        .bind(job.id)
        .bind(job.status.as_str())
        .bind(job.exit_code)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_build(&self, id: Uuid) -> Result<Build, StoreError> {
        let row: BuildRow = sqlx::query_as(
            r#"SELECT id, repo_id, number, event, commit_sha, branch, git_ref, message, author,
                      status, started_at, finished_at, created_at
               FROM builds WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::BuildNotFound(id))?;
        Build::try_from(row)
    }

    async fn list_jobs(&self, build_id: Uuid) -> Result<Vec<Job>, StoreError> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"SELECT id, build_id, number, status, exit_code, started_at, finished_at, environment
               FROM jobs WHERE build_id = $1 ORDER BY number"#,
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn get_build_last(
        &self,
        repo_id: Uuid,
        branch: &str,
    ) -> Result<Option<Build>, StoreError> {
        let row: Option<BuildRow> = sqlx::query_as(
            r#"SELECT id, repo_id, number, event, commit_sha, branch, git_ref, message, author,
                      status, started_at, finished_at, created_at
               FROM builds WHERE repo_id = $1 AND branch = $2
               ORDER BY number DESC LIMIT 1"#,
        )
        .bind(repo_id)
        .bind(branch)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Build::try_from).transpose()
    }

    async fn write_log(&self, job_id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        sqlx::query(
            r#"INSERT INTO job_logs (job_id, content) VALUES ($1, $2)
               ON CONFLICT (job_id) DO UPDATE SET content = job_logs.content || EXCLUDED.content"#,
        )
        .bind(job_id)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn read_log(&self, job_id: Uuid) -> Result<Vec<u8>, StoreError> {
        let row = sqlx::query(r#"SELECT content FROM job_logs WHERE job_id = $1"#)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::LogNotFound(job_id))?;
        Ok(row.get::<Vec<u8>, _>("content"))
    }

    async fn kill_all_non_terminal(&self) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"UPDATE builds SET status = 'killed'
               WHERE status IN ('pending', 'running')"#,
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            r#"UPDATE jobs SET status = 'killed'
               WHERE status IN ('pending', 'running')"#,
        )
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(sqlx::Error::Migrate(Box::new(e))))
    }
}

use std::sync::Arc;

use gantry_config::TrustPolicy;
use gantry_driver::Driver;
use gantry_store::Store;
use gantry_types::{Build, Job, Status};
use tracing::{info, warn};

use crate::error::GantryError;
use crate::orchestrator::Orchestrator;

/// Commit messages containing this literal (case sensitive) skip the
/// build entirely.
const SKIP_TOKEN: &str = "[CI SKIP]";

/// Runs the full webhook-to-scheduled-build pipeline:
///
///  1. `driver.parse_hook` — extract a repo hint and build draft, or
///     `None` for an ignorable event.
///  2. skip-token check on the commit message.
///  3. resolve the repo by full name.
///  4. verify the webhook signature against the repo's secret.
///  5. reject a repo with no owner.
///  6. check the repo's per-event allow flags.
///  7. fetch the owning user.
///  8. fetch the build script (and secret) for this commit.
///  9. parse+lint+expand the matrix into per-axis jobs.
/// 10. fetch netrc credentials.
/// 11. check the build's branch against the config's branch filter.
/// 12. atomically create the build and its jobs.
/// 13. best-effort post the commit status.
/// 14. look up the previous build and hand the whole bundle to the
///     orchestrator as background work.
///
/// Returns the created `Build` on success, or `None` for every case
/// that resolves to a no-build response (ignorable event, skip token,
/// disabled event, branch filter miss).
pub async fn process_hook(
    remote: &str,
    driver: &dyn Driver,
    store: &Arc<dyn Store>,
    orchestrator: &Orchestrator,
    trust: &TrustPolicy,
    headers: &http::HeaderMap,
    body: &[u8],
) -> Result<Option<Build>, GantryError> {
    let Some((hint, draft)) = driver.parse_hook(headers, body).await? else {
        info!(remote, "ignoring hook: driver reports a non-build event");
        return Ok(None);
    };

    if draft.message.contains(SKIP_TOKEN) {
        info!(owner = %hint.owner, repo = %hint.name, "ignoring hook: commit message requests skip");
        return Err(GantryError::SkipRequested);
    }

    let full_name = format!("{}/{}", hint.owner, hint.name);
    let repo = store
        .get_repo_by_full_name(&full_name)
        .await
        .map_err(|_| GantryError::UnknownRepo(full_name.clone()))?;

    driver
        .verify_signature(&repo.hash, headers, body)
        .map_err(|_| GantryError::InvalidSignature)?;

    if !repo.allow.allows(draft.event) {
        info!(repo = %repo.full_name, event = %draft.event.as_str(), "ignoring hook: event disabled for this repo");
        return Err(GantryError::EventDisabled);
    }

    let user = store.get_user(repo.owner_id).await.map_err(|_| {
        warn!(repo = %repo.full_name, "ignoring hook: repo has no owner");
        GantryError::NoOwner(repo.full_name.clone())
    })?;
    let draft_build = draft_as_build(&repo, &draft);

    let (script_yaml, secret) = driver.fetch_script(&user, &repo, &draft_build).await?;

    let (config, axes) = gantry_config::load(&script_yaml, trust)?;

    if !config.branches.is_empty()
        && !config
            .branches
            .iter()
            .any(|pattern| branch_matches(pattern, &draft.branch))
    {
        info!(repo = %repo.full_name, branch = %draft.branch, "ignoring hook: branch excluded by build config");
        return Err(GantryError::BranchFiltered(draft.branch.clone()));
    }

    let netrc = driver.fetch_netrc(&user, &repo).await?;

    let build = draft_build;
    let jobs: Vec<Job> = axes
        .iter()
        .map(|axis| Job {
            id: uuid::Uuid::new_v4(),
            build_id: build.id,
            number: 0,
            status: Status::Pending,
            exit_code: None,
            started_at: None,
            finished_at: None,
            environment: axis
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        })
        .collect();

    let (build, jobs) = store.create_build(build, jobs).await?;

    if let Err(e) = driver.post_status(&user, &repo, &build, &format!("/{}/{}", repo.full_name, build.number)).await {
        warn!(repo = %repo.full_name, build = build.number, error = %e, "failed to post commit status, continuing");
    }

    let previous = store
        .get_build_last(repo.id, &build.branch)
        .await
        .unwrap_or(None)
        .filter(|b| b.id != build.id);
    if let Some(prev) = &previous {
        info!(repo = %repo.full_name, build = build.number, previous_build = prev.number, "scheduling with known previous build");
    }

    orchestrator
        .schedule(user, repo, build.clone(), jobs, config, netrc, secret)
        .await;

    Ok(Some(build))
}

fn draft_as_build(repo: &gantry_types::Repo, draft: &gantry_driver::BuildDraft) -> Build {
    Build {
        id: uuid::Uuid::new_v4(),
        repo_id: repo.id,
        number: 0,
        event: draft.event,
        commit_sha: draft.commit_sha.clone(),
        branch: draft.branch.clone(),
        git_ref: draft.git_ref.clone(),
        message: draft.message.clone(),
        author: draft.author.clone(),
        status: Status::Pending,
        started_at: None,
        finished_at: None,
        created_at: draft.created_at,
    }
}

fn branch_matches(pattern: &str, branch: &str) -> bool {
    if pattern == branch {
        return true;
    }
    glob::Pattern::new(pattern)
        .map(|p| p.matches(branch))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_matches_exact_name() {
        assert!(branch_matches("main", "main"));
        assert!(!branch_matches("main", "develop"));
    }

    #[test]
    fn branch_matches_glob_pattern() {
        assert!(branch_matches("release/*", "release/1.0"));
        assert!(!branch_matches("release/*", "main"));
    }

    #[test]
    fn skip_token_is_case_sensitive() {
        assert!("fix: stuff [CI SKIP]".contains(SKIP_TOKEN));
        assert!(!"fix: stuff [ci skip]".contains(SKIP_TOKEN));
    }
}

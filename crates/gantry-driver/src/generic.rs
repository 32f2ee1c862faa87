use async_trait::async_trait;
use chrono::Utc;
use gantry_types::{Build, EventKind, Repo, User};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::DriverError;
use crate::traits::Driver;
use crate::types::{BuildDraft, Netrc, RepoHint};

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_HEADER: &str = "x-gantry-signature";

/// Webhook payload shape this driver accepts. A concrete provider
/// adapter would translate its own payload into this instead; this
/// driver is the one generic, HMAC-signed implementation the crate
/// ships, not a GitHub/GitLab-specific parser.
#[derive(Debug, Deserialize)]
struct HookPayload {
    owner: String,
    repo: String,
    event: String,
    commit_sha: String,
    branch: String,
    #[serde(rename = "ref")]
    git_ref: String,
    message: String,
    author: String,
}

/// One generic `Driver` implementation: verifies an HMAC-SHA256
/// signature over the raw request body using the repo's webhook
/// secret, and talks to a configurable script/status endpoint over
/// plain HTTP. Mirrors `shipper-webhook`'s signing primitives, applied
/// to inbound verification instead of outbound notification.
pub struct GenericDriver {
    http: reqwest::Client,
    script_base_url: String,
    status_base_url: String,
}

impl GenericDriver {
    pub fn new(script_base_url: impl Into<String>, status_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            script_base_url: script_base_url.into(),
            status_base_url: status_base_url.into(),
        }
    }

    /// Verify `body` against a hex-encoded HMAC-SHA256 digest using
    /// `secret`. Exposed standalone so tests can exercise it without a
    /// full `http::HeaderMap`.
    pub fn verify_signature_hex(secret: &str, signature_hex: &str, body: &[u8]) -> Result<(), DriverError> {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| DriverError::InvalidSignature)?;
        mac.update(body);
        let expected = hex::decode(signature_hex).map_err(|_| DriverError::InvalidSignature)?;
        mac.verify_slice(&expected)
            .map_err(|_| DriverError::InvalidSignature)
    }
}

#[async_trait]
impl Driver for GenericDriver {
    async fn parse_hook(
        &self,
        _headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<Option<(RepoHint, BuildDraft)>, DriverError> {
        let payload: HookPayload = serde_json::from_slice(body)
            .map_err(|e| DriverError::UnrecognizedPayload(e.to_string()))?;

        let event = match payload.event.as_str() {
            "push" => EventKind::Push,
            "pull_request" => EventKind::PullRequest,
            "tag" => EventKind::Tag,
            "deploy" => EventKind::Deploy,
            other => return Err(DriverError::UnrecognizedPayload(other.to_string())),
        };

        Ok(Some((
            RepoHint {
                owner: payload.owner,
                name: payload.repo,
            },
            BuildDraft {
                event,
                commit_sha: payload.commit_sha,
                branch: payload.branch,
                git_ref: payload.git_ref,
                message: payload.message,
                author: payload.author,
                created_at: Utc::now(),
            },
        )))
    }

    fn verify_signature(
        &self,
        secret: &str,
        headers: &http::HeaderMap,
        body: &[u8],
    ) -> Result<(), DriverError> {
        let signature_hex = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(DriverError::InvalidSignature)?;
        Self::verify_signature_hex(secret, signature_hex, body)
    }

    async fn fetch_script(
        &self,
        _user: &User,
        repo: &Repo,
        build: &Build,
    ) -> Result<(String, Option<String>), DriverError> {
        let url = format!(
            "{}/{}/script?ref={}",
            self.script_base_url, repo.full_name, build.commit_sha
        );
        let response = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| DriverError::ScriptFetch(e.to_string()))?;
        let yaml = response
            .text()
            .await
            .map_err(|e| DriverError::ScriptFetch(e.to_string()))?;
        Ok((yaml, None))
    }

    async fn fetch_netrc(&self, user: &User, repo: &Repo) -> Result<Netrc, DriverError> {
        Ok(Netrc {
            machine: repo.clone_url.clone(),
            login: user.login.clone(),
            password: user.token.clone(),
        })
    }

    async fn post_status(
        &self,
        _user: &User,
        repo: &Repo,
        build: &Build,
        link: &str,
    ) -> Result<(), DriverError> {
        let url = format!("{}/{}/status", self.status_base_url, repo.full_name);
        self.http
            .post(&url)
            .json(&serde_json::json!({
                "sha": build.commit_sha,
                "status": build.status.as_str(),
                "target_url": link,
            }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| DriverError::StatusPost(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_signature_accepts_matching_hmac() {
        let secret = "repo-secret";
        let body = b"{\"event\":\"push\"}";
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());

        assert!(GenericDriver::verify_signature_hex(secret, &digest, body).is_ok());
    }

    #[test]
    fn verify_signature_rejects_wrong_secret() {
        let body = b"{\"event\":\"push\"}";
        let mut mac = HmacSha256::new_from_slice(b"secret-a").unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());

        assert!(GenericDriver::verify_signature_hex("secret-b", &digest, body).is_err());
    }

    #[test]
    fn verify_signature_trait_method_reads_header() {
        let driver = GenericDriver::new("http://script", "http://status");
        let body = b"{\"event\":\"push\"}";
        let mut mac = HmacSha256::new_from_slice(b"repo-secret").unwrap();
        mac.update(body);
        let digest = hex::encode(mac.finalize().into_bytes());

        let mut headers = http::HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, digest.parse().unwrap());
        assert!(Driver::verify_signature(&driver, "repo-secret", &headers, body).is_ok());

        let mut wrong_headers = http::HeaderMap::new();
        wrong_headers.insert(SIGNATURE_HEADER, digest.parse().unwrap());
        assert!(Driver::verify_signature(&driver, "other-secret", &wrong_headers, body).is_err());
    }

    #[tokio::test]
    async fn parse_hook_rejects_unknown_event() {
        let driver = GenericDriver::new("http://script", "http://status");
        let body = br#"{"owner":"acme","repo":"widgets","event":"smoke_test","commit_sha":"x","branch":"main","ref":"refs/heads/main","message":"m","author":"a"}"#;
        let result = driver.parse_hook(&http::HeaderMap::new(), body).await;
        assert!(matches!(result, Err(DriverError::UnrecognizedPayload(_))));
    }

    #[tokio::test]
    async fn parse_hook_extracts_repo_hint_and_build_draft() {
        let driver = GenericDriver::new("http://script", "http://status");
        let body = br#"{"owner":"acme","repo":"widgets","event":"push","commit_sha":"abc123","branch":"main","ref":"refs/heads/main","message":"fix bug","author":"octocat"}"#;
        let (hint, draft) = driver
            .parse_hook(&http::HeaderMap::new(), body)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hint.owner, "acme");
        assert_eq!(hint.name, "widgets");
        assert_eq!(draft.commit_sha, "abc123");
        assert_eq!(draft.event, EventKind::Push);
    }
}

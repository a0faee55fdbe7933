//! GitHub REST implementation of the repository host seam
//!
//! Talks to the v3 API directly with reqwest; no `gh` CLI and no local git
//! object handling. All mutation goes through branch-ref and contents
//! endpoints so the worker never needs a checkout.

use crate::host::{
    ChangeRequest, FileWriteIntent, HostError, NewChangeRequest, RepoFile, RepoHost,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_API_BASE: &str = "https://api.github.com";
const API_TIMEOUT_SECS: u64 = 60;

/// Maximum length for error body content in error messages
const MAX_ERROR_BODY_LEN: usize = 200;

/// Sanitize an API error body to prevent credential leakage.
/// Truncates long responses and redacts potential secrets.
fn sanitize_error_body(body: &str) -> String {
    // Patterns that might indicate secrets in error responses
    const SECRET_PATTERNS: &[&str] = &[
        "token",
        "secret",
        "password",
        "credential",
        "bearer",
        "ghp_",        // GitHub personal access token prefix
        "gho_",        // GitHub OAuth token prefix
        "github_pat_", // GitHub PAT prefix
    ];

    let truncated = if body.len() > MAX_ERROR_BODY_LEN {
        format!("{}... (truncated)", &body[..MAX_ERROR_BODY_LEN])
    } else {
        body.to_string()
    };

    let lower = truncated.to_lowercase();
    for pattern in SECRET_PATTERNS {
        if lower.contains(pattern) {
            return "(error details redacted - may contain sensitive data)".to_string();
        }
    }

    truncated
}

// ============================================================================
// Repository identity
// ============================================================================

/// An `owner/name` pair identifying the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub owner: String,
    pub name: String,
}

impl RepoSlug {
    /// Parse a repository identity from a bare slug or a GitHub URL.
    ///
    /// Supports:
    /// - owner/repo
    /// - git@github.com:owner/repo.git
    /// - https://github.com/owner/repo.git
    /// - https://github.com/owner/repo
    pub fn parse(raw: &str) -> Option<RepoSlug> {
        let raw = raw.trim();

        // SSH format: git@github.com:owner/repo.git
        if let Some(rest) = raw.strip_prefix("git@github.com:") {
            return Self::from_path(rest);
        }

        // HTTPS format: https://github.com/owner/repo.git
        if raw.contains("github.com") {
            if let Ok(parsed) = url::Url::parse(raw) {
                if parsed.host_str() != Some("github.com") {
                    return None;
                }
                return Self::from_path(parsed.path().trim_start_matches('/'));
            }

            // URLs without a scheme, e.g. github.com/owner/repo
            let path = raw
                .split("github.com")
                .nth(1)?
                .trim_start_matches(['/', ':']);
            return Self::from_path(path);
        }

        // Bare slug: owner/repo
        if raw.contains('/') && !raw.contains("://") {
            return Self::from_path(raw);
        }

        None
    }

    fn from_path(path: &str) -> Option<RepoSlug> {
        let path = path.trim_end_matches(".git");
        let mut parts = path.splitn(2, '/');
        let owner = parts.next()?.trim();
        let name = parts.next()?.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(RepoSlug {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for RepoSlug {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

// ============================================================================
// Wire payloads
// ============================================================================

#[derive(Deserialize)]
struct RepoResponse {
    default_branch: String,
}

#[derive(Deserialize)]
struct GitRefResponse {
    object: GitRefObject,
}

#[derive(Deserialize)]
struct GitRefObject {
    sha: String,
}

#[derive(Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: &'a str,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: &'a str,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PullResponse {
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    head: PullHead,
    html_url: String,
}

#[derive(Deserialize)]
struct PullHead {
    #[serde(rename = "ref")]
    branch: String,
}

#[derive(Serialize)]
struct CreatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
    head: &'a str,
    base: &'a str,
    draft: bool,
}

#[derive(Serialize)]
struct UpdatePullRequest<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

/// Authenticated GitHub API client scoped to one repository.
pub struct GithubClient {
    http: reqwest::Client,
    token: String,
    slug: RepoSlug,
    api_base: String,
}

impl GithubClient {
    pub fn new(token: &str, slug: RepoSlug) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(API_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            token: token.to_string(),
            slug,
            api_base: DEFAULT_API_BASE.to_string(),
        })
    }

    /// Point the client at a different API root (test servers).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.slug.owner, self.slug.name, tail
        )
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("User-Agent", "patchbot")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Turn a non-success response into a `HostError::Api`, preferring the
    /// structured error body when GitHub provides one.
    async fn api_error(response: reqwest::Response) -> HostError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&body) {
            let detail = api_error
                .errors
                .first()
                .and_then(|e| e.message.clone())
                .unwrap_or_default();

            let message = if detail.is_empty() {
                api_error.message
            } else {
                format!("{}: {}", api_error.message, detail)
            };

            return HostError::Api { status, message };
        }

        HostError::Api {
            status,
            message: sanitize_error_body(&body),
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, HostError> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn send_unit(&self, builder: reqwest::RequestBuilder) -> Result<(), HostError> {
        let response = builder.send().await?;
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }
        Ok(())
    }
}

/// Decode the contents API's base64 payload, which embeds newlines.
fn decode_contents(encoded: &str) -> Result<String, HostError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| HostError::Api {
            status: 200,
            message: format!("undecodable contents payload: {}", e),
        })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl From<PullResponse> for ChangeRequest {
    fn from(pull: PullResponse) -> Self {
        ChangeRequest {
            number: pull.number,
            title: pull.title,
            body: pull.body.unwrap_or_default(),
            head_branch: pull.head.branch,
            html_url: pull.html_url,
        }
    }
}

#[async_trait]
impl RepoHost for GithubClient {
    async fn default_branch(&self) -> Result<String, HostError> {
        let url = self.repo_url("");
        let repo: RepoResponse = self
            .send_json(self.request(reqwest::Method::GET, &url))
            .await?;
        Ok(repo.default_branch)
    }

    async fn branch_head(&self, branch: &str) -> Result<String, HostError> {
        let url = self.repo_url(&format!("/git/ref/heads/{}", branch));
        let git_ref: GitRefResponse = self
            .send_json(self.request(reqwest::Method::GET, &url))
            .await?;
        Ok(git_ref.object.sha)
    }

    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), HostError> {
        let url = self.repo_url("/git/refs");
        let request = CreateRefRequest {
            git_ref: format!("refs/heads/{}", name),
            sha: from_sha,
        };
        self.send_unit(self.request(reqwest::Method::POST, &url).json(&request))
            .await
    }

    async fn file(&self, path: &str, reference: &str) -> Result<Option<RepoFile>, HostError> {
        let url = self.repo_url(&format!("/contents/{}", path));
        let response = self
            .request(reqwest::Method::GET, &url)
            .query(&[("ref", reference)])
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let contents: ContentsResponse = response.json().await?;
        let content = match contents.content {
            Some(encoded) => decode_contents(&encoded)?,
            None => String::new(),
        };

        Ok(Some(RepoFile {
            sha: contents.sha,
            content,
        }))
    }

    async fn put_file(&self, intent: &FileWriteIntent) -> Result<(), HostError> {
        let url = self.repo_url(&format!("/contents/{}", intent.path));
        let request = PutContentsRequest {
            message: &intent.message,
            content: &intent.content_base64,
            branch: &intent.branch,
            sha: intent.prior_sha.as_deref(),
        };
        self.send_unit(self.request(reqwest::Method::PUT, &url).json(&request))
            .await
    }

    async fn change_request(&self, number: u64) -> Result<ChangeRequest, HostError> {
        let url = self.repo_url(&format!("/pulls/{}", number));
        let pull: PullResponse = self
            .send_json(self.request(reqwest::Method::GET, &url))
            .await?;
        Ok(pull.into())
    }

    async fn create_change_request(
        &self,
        new: &NewChangeRequest,
    ) -> Result<ChangeRequest, HostError> {
        let url = self.repo_url("/pulls");
        let request = CreatePullRequest {
            title: &new.title,
            body: &new.body,
            head: &new.head,
            base: &new.base,
            draft: new.draft,
        };
        let pull: PullResponse = self
            .send_json(self.request(reqwest::Method::POST, &url).json(&request))
            .await?;
        Ok(pull.into())
    }

    async fn update_change_request(
        &self,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<(), HostError> {
        let url = self.repo_url(&format!("/pulls/{}", number));
        let request = UpdatePullRequest { title, body };
        self.send_unit(self.request(reqwest::Method::PATCH, &url).json(&request))
            .await
    }

    async fn comment(&self, number: u64, body: &str) -> Result<(), HostError> {
        let url = self.repo_url(&format!("/issues/{}/comments", number));
        let request = CommentRequest { body };
        self.send_unit(self.request(reqwest::Method::POST, &url).json(&request))
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Runtime configuration
//!
//! The worker runs headless (typically from CI), so everything comes from
//! the environment and flags; there is no on-disk config file. Credential
//! checks happen here, before any client is built, so a misconfigured run
//! fails without touching the repository.

use crate::github::RepoSlug;
use anyhow::{Context, Result};

const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
const MODEL_KEY_VAR: &str = "OPENROUTER_API_KEY";
const REPOSITORY_VAR: &str = "GITHUB_REPOSITORY";

/// Everything a run needs to know up front.
#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: String,
    pub model_api_key: String,
    pub repo: RepoSlug,
    pub model: String,
    pub trunk_override: Option<String>,
    pub branch_prefix: String,
}

impl Config {
    pub fn resolve(
        repo: Option<&str>,
        model: &str,
        base: Option<&str>,
        branch_prefix: &str,
    ) -> Result<Self> {
        let github_token = require_env(GITHUB_TOKEN_VAR)?;
        let model_api_key = require_env(MODEL_KEY_VAR)?;

        let raw_repo = match repo {
            Some(raw) => raw.to_string(),
            None => require_env(REPOSITORY_VAR)
                .context("Pass --repo or set GITHUB_REPOSITORY to identify the repository")?,
        };
        let repo = RepoSlug::parse(&raw_repo).ok_or_else(|| {
            anyhow::anyhow!("'{}' is not a usable repository identity", raw_repo)
        })?;

        Ok(Self {
            github_token,
            model_api_key,
            repo,
            model: model.to_string(),
            trunk_override: base.map(|b| b.to_string()),
            branch_prefix: branch_prefix.to_string(),
        })
    }
}

/// Read a required environment variable, treating empty values as unset.
fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow::anyhow!("Environment variable {} is not set", name))
}

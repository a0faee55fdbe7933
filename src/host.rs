//! Repository host seam
//!
//! The engine drives the hosting service through this trait so the
//! reconciliation logic can be exercised against an in-memory double
//! as well as the live GitHub API.

use async_trait::async_trait;
use thiserror::Error;

/// Failure at the repository host boundary.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("host API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl HostError {
    /// The "reference already exists" class of failures. GitHub reports a
    /// duplicate ref as 422 with an "already exists" message; 409 covers
    /// other hosts that use a plain conflict status.
    pub fn is_conflict(&self) -> bool {
        match self {
            HostError::Api { status, message } => {
                *status == 409
                    || (*status == 422 && message.to_lowercase().contains("already exists"))
            }
            HostError::Transport(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, HostError::Api { status: 404, .. })
    }
}

/// File content and identity at a given ref. Content is decoded text.
#[derive(Debug, Clone)]
pub struct RepoFile {
    pub sha: String,
    pub content: String,
}

/// A single contents write against a branch.
#[derive(Debug, Clone)]
pub struct FileWriteIntent {
    pub path: String,
    pub content_base64: String,
    pub message: String,
    pub branch: String,
    /// Identity of the blob being replaced. `None` creates a new file.
    pub prior_sha: Option<String>,
}

/// A change request as tracked by the host.
#[derive(Debug, Clone)]
pub struct ChangeRequest {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub html_url: String,
}

/// Fields for opening a new change request.
#[derive(Debug, Clone)]
pub struct NewChangeRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

/// Operations the engine needs from the repository host.
///
/// Everything here maps one-to-one onto a REST call; no method hides
/// retries or fallback behavior.
#[async_trait]
pub trait RepoHost: Send + Sync {
    /// Name of the repository's default (trunk) branch.
    async fn default_branch(&self) -> Result<String, HostError>;

    /// Head commit sha of a branch.
    async fn branch_head(&self, branch: &str) -> Result<String, HostError>;

    /// Create a branch ref pointing at a commit.
    async fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), HostError>;

    /// Read file content and identity at a ref. `Ok(None)` when the path
    /// does not exist there.
    async fn file(&self, path: &str, reference: &str) -> Result<Option<RepoFile>, HostError>;

    /// Create-or-update a file on a branch.
    async fn put_file(&self, intent: &FileWriteIntent) -> Result<(), HostError>;

    /// Fetch a change request by number.
    async fn change_request(&self, number: u64) -> Result<ChangeRequest, HostError>;

    /// Open a new change request.
    async fn create_change_request(
        &self,
        new: &NewChangeRequest,
    ) -> Result<ChangeRequest, HostError>;

    /// Replace a change request's title and body.
    async fn update_change_request(
        &self,
        number: u64,
        title: &str,
        body: &str,
    ) -> Result<(), HostError>;

    /// Post a comment on a numbered reference.
    async fn comment(&self, number: u64, body: &str) -> Result<(), HostError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_on_422_already_exists() {
        let err = HostError::Api {
            status: 422,
            message: "Reference already exists".to_string(),
        };
        assert!(err.is_conflict());
    }

    #[test]
    fn test_conflict_on_409() {
        let err = HostError::Api {
            status: 409,
            message: "Conflict".to_string(),
        };
        assert!(err.is_conflict());
    }

    #[test]
    fn test_generic_422_is_not_conflict() {
        let err = HostError::Api {
            status: 422,
            message: "Validation Failed".to_string(),
        };
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_not_found() {
        let err = HostError::Api {
            status: 404,
            message: "Not Found".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
    }
}

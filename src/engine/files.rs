//! File materialization
//!
//! Writes each proposed file onto the working branch, in proposal order.
//! The create/update distinction is decided by probing for an existing
//! blob: first on the working branch, then on the trunk (a freshly cut
//! branch shares trunk content, but a reused PR branch may have diverged).
//! The identity is looked up, never guessed; writing identical content is
//! a host-side no-op.

use crate::host::{FileWriteIntent, RepoHost};
use crate::proposal::Proposal;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::info;

const DEFAULT_COMMIT_MESSAGE: &str = "Apply proposed changes";

/// Write every proposed file. Returns the number of files written.
///
/// Writes are sequential; the first failure aborts the rest of the run and
/// already-written files stay in place.
pub async fn materialize<H: RepoHost>(
    host: &H,
    proposal: &Proposal,
    branch: &str,
    trunk: &str,
) -> Result<usize> {
    let message = commit_message(&proposal.summary);

    for file in &proposal.files {
        let prior_sha = resolve_prior_sha(host, &file.path, branch, trunk).await?;

        info!(
            "{} '{}' on '{}'",
            if prior_sha.is_some() { "updating" } else { "creating" },
            file.path,
            branch
        );

        let intent = FileWriteIntent {
            path: file.path.clone(),
            content_base64: BASE64.encode(file.content.as_bytes()),
            message: message.clone(),
            branch: branch.to_string(),
            prior_sha,
        };

        host.put_file(&intent)
            .await
            .with_context(|| format!("Failed to write '{}' on branch '{}'", file.path, branch))?;
    }

    Ok(proposal.files.len())
}

/// Probe the working branch, then the trunk, for an existing blob identity.
/// `None` means the file is genuinely new everywhere.
async fn resolve_prior_sha<H: RepoHost>(
    host: &H,
    path: &str,
    branch: &str,
    trunk: &str,
) -> Result<Option<String>> {
    if let Some(existing) = host
        .file(path, branch)
        .await
        .with_context(|| format!("Failed to probe '{}' on branch '{}'", path, branch))?
    {
        return Ok(Some(existing.sha));
    }

    if let Some(upstream) = host
        .file(path, trunk)
        .await
        .with_context(|| format!("Failed to probe '{}' on trunk '{}'", path, trunk))?
    {
        return Ok(Some(upstream.sha));
    }

    Ok(None)
}

fn commit_message(summary: &str) -> String {
    let summary = summary.trim();
    if summary.is_empty() {
        DEFAULT_COMMIT_MESSAGE.to_string()
    } else {
        summary.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_message_uses_summary() {
        assert_eq!(commit_message("add retry step"), "add retry step");
    }

    #[test]
    fn test_commit_message_falls_back_when_blank() {
        assert_eq!(commit_message("   "), DEFAULT_COMMIT_MESSAGE);
        assert_eq!(commit_message(""), DEFAULT_COMMIT_MESSAGE);
    }
}

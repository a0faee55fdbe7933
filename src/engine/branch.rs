//! Branch reconciliation
//!
//! Guarantees a branch exists that is safe to write proposal files onto:
//! either the referenced change request's head branch, or a fresh branch
//! cut from the trunk head. A concurrent run may have created the fresh
//! branch already; that conflict counts as success.

use crate::engine::reference::TargetReference;
use crate::host::RepoHost;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// How the working branch came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    /// Reused the target reference's head branch.
    Reused,
    /// Created fresh from the trunk head.
    Created,
    /// Creation conflicted because the ref was already there.
    AlreadyExisted,
}

/// The branch receiving this run's file writes. Resolved once, never renamed.
#[derive(Debug, Clone)]
pub struct WorkingBranch {
    pub name: String,
    pub outcome: BranchOutcome,
}

/// Millisecond timestamps are monotonic enough across runs to avoid name
/// collisions without any shared counter.
pub fn synthesize_branch_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}/{}", prefix, at.timestamp_millis())
}

/// Resolve the working branch for this run.
pub async fn reconcile<H: RepoHost>(
    host: &H,
    target: Option<&TargetReference>,
    trunk: &str,
    prefix: &str,
) -> Result<WorkingBranch> {
    if let Some(target) = target {
        info!(
            "reusing head branch '{}' of change request #{}",
            target.head_branch, target.number
        );
        return Ok(WorkingBranch {
            name: target.head_branch.clone(),
            outcome: BranchOutcome::Reused,
        });
    }

    let name = synthesize_branch_name(prefix, Utc::now());
    let trunk_sha = host
        .branch_head(trunk)
        .await
        .with_context(|| format!("Failed to read head of trunk branch '{}'", trunk))?;

    match host.create_branch(&name, &trunk_sha).await {
        Ok(()) => {
            info!("created branch '{}' at {}", name, trunk_sha);
            Ok(WorkingBranch {
                name,
                outcome: BranchOutcome::Created,
            })
        }
        Err(err) if err.is_conflict() => {
            // A prior partial run got here first; the ref is usable as-is.
            warn!("branch '{}' already exists, continuing onto it", name);
            Ok(WorkingBranch {
                name,
                outcome: BranchOutcome::AlreadyExisted,
            })
        }
        Err(err) => {
            Err(err).with_context(|| format!("Failed to create branch '{}'", name))
        }
    }
}

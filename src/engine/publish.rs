//! Change-request publishing
//!
//! Turns the run's proposal into a durable record on the host: a fresh
//! draft change request, or an appended section on the referenced one.
//! Bodies are append-only; a run never discards a prior run's section.

use crate::engine::reference::TargetReference;
use crate::host::{NewChangeRequest, RepoHost};
use crate::proposal::Proposal;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

pub const TITLE_PREFIX: &str = "[patchbot] ";

const ATTRIBUTION_HEADER: &str =
    "_This pull request was prepared automatically from a review instruction._";
const SECTION_SEPARATOR: &str = "\n\n---\n\n";
const FALLBACK_TITLE: &str = "Proposed changes";
const MAX_TITLE_CHARS: usize = 72;

/// Where the proposal ended up.
#[derive(Debug, Clone)]
pub struct PublishedChange {
    pub number: u64,
    pub url: String,
    pub updated: bool,
}

/// Render one timestamped log section: the summary plus the serialized
/// proposal, collapsed so repeated runs stay readable.
pub fn render_section(proposal: &Proposal, at: DateTime<Utc>) -> String {
    let serialized = serde_json::to_string_pretty(proposal)
        .unwrap_or_else(|_| "(proposal could not be serialized)".to_string());

    format!(
        "### Proposal at {}\n\n{}\n\n<details>\n<summary>Proposed changes</summary>\n\n```json\n{}\n```\n\n</details>",
        at.format("%Y-%m-%d %H:%M UTC"),
        proposal.summary.trim(),
        serialized
    )
}

/// Create or update the change request for this run.
pub async fn publish<H: RepoHost>(
    host: &H,
    proposal: &Proposal,
    target: Option<&TargetReference>,
    branch: &str,
    trunk: &str,
) -> Result<PublishedChange> {
    let section = render_section(proposal, Utc::now());

    match target {
        Some(target) => append_to_existing(host, target.number, &section).await,
        None => create_fresh(host, proposal, &section, branch, trunk).await,
    }
}

/// Append path: re-fetch the body right before writing so the append lands
/// on the freshest state another editor may have left behind.
async fn append_to_existing<H: RepoHost>(
    host: &H,
    number: u64,
    section: &str,
) -> Result<PublishedChange> {
    let current = host
        .change_request(number)
        .await
        .with_context(|| format!("Failed to re-fetch change request #{} before append", number))?;

    let body = if current.body.trim().is_empty() {
        section.to_string()
    } else {
        format!("{}{}{}", current.body, SECTION_SEPARATOR, section)
    };
    let title = preserve_title(&current.title);

    host.update_change_request(number, &title, &body)
        .await
        .with_context(|| format!("Failed to update change request #{}", number))?;

    info!("appended proposal section to change request #{}", number);
    Ok(PublishedChange {
        number,
        url: current.html_url,
        updated: true,
    })
}

async fn create_fresh<H: RepoHost>(
    host: &H,
    proposal: &Proposal,
    section: &str,
    branch: &str,
    trunk: &str,
) -> Result<PublishedChange> {
    let mut body = String::from(ATTRIBUTION_HEADER);
    let summary = proposal.summary.trim();
    if !summary.is_empty() {
        body.push_str("\n\n");
        body.push_str(summary);
    }
    body.push_str("\n\n");
    body.push_str(section);

    let new = NewChangeRequest {
        title: compose_title(summary),
        body,
        head: branch.to_string(),
        base: trunk.to_string(),
        draft: true,
    };

    let created = host
        .create_change_request(&new)
        .await
        .with_context(|| format!("Failed to open change request for branch '{}'", branch))?;

    info!("opened draft change request #{}", created.number);
    Ok(PublishedChange {
        number: created.number,
        url: created.html_url,
        updated: false,
    })
}

/// Human-review path: no branch, file, or change-request mutation. When a
/// target reference resolved, leave the section as a comment so the
/// decision is still auditable. Returns whether a comment was posted.
pub async fn notify_human_review<H: RepoHost>(
    host: &H,
    proposal: &Proposal,
    target: Option<&TargetReference>,
) -> Result<bool> {
    warn!(
        "proposal requires human attention: {}",
        if proposal.summary.trim().is_empty() {
            "(no summary given)"
        } else {
            proposal.summary.trim()
        }
    );

    let Some(target) = target else {
        return Ok(false);
    };

    let section = render_section(proposal, Utc::now());
    host.comment(target.number, &section)
        .await
        .with_context(|| format!("Failed to comment on change request #{}", target.number))?;

    info!("posted human-review note on change request #{}", target.number);
    Ok(true)
}

/// Title for a fresh change request, derived from the latest summary.
fn compose_title(summary: &str) -> String {
    let summary = summary.trim();
    let descriptive = if summary.is_empty() {
        FALLBACK_TITLE
    } else {
        summary
    };
    format!("{}{}", TITLE_PREFIX, truncate_title(descriptive))
}

/// Title for an updated change request: keep the original descriptive part,
/// only normalize the prefix. Later summaries never overwrite it.
fn preserve_title(current: &str) -> String {
    let descriptive = current.strip_prefix(TITLE_PREFIX).unwrap_or(current).trim();
    if descriptive.is_empty() {
        return format!("{}{}", TITLE_PREFIX, FALLBACK_TITLE);
    }
    format!("{}{}", TITLE_PREFIX, descriptive)
}

fn truncate_title(s: &str) -> String {
    if s.chars().count() <= MAX_TITLE_CHARS {
        return s.to_string();
    }
    let prefix: String = s.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", prefix.trim_end())
}

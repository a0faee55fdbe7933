//! Reference resolution
//!
//! Finds an existing change-request number in the instruction text and
//! fetches its current state. Both a missing marker and an unfetchable
//! reference degrade to branch-creation mode; neither is fatal.

use crate::host::RepoHost;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Result of scanning the instruction for a `#<number>` marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceScan {
    /// No marker anywhere in the instruction.
    Missing,
    /// First marker parsed to a change-request number.
    Found(u64),
    /// A marker was present but its digits don't form a usable number.
    Malformed { token: String },
}

/// An existing change request the run will update instead of creating one.
#[derive(Debug, Clone)]
pub struct TargetReference {
    pub number: u64,
    pub head_branch: String,
    pub title: String,
    pub body: String,
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"#(\d+)").expect("marker pattern is valid"))
}

/// Scan for the first `#<digits>` token. Returns a typed result so callers
/// can tell "no reference present" apart from "marker present but unusable".
pub fn scan_reference(instruction: &str) -> ReferenceScan {
    let Some(captures) = marker_regex().captures(instruction) else {
        return ReferenceScan::Missing;
    };

    let digits = &captures[1];
    match digits.parse::<u64>() {
        Ok(number) => ReferenceScan::Found(number),
        Err(_) => ReferenceScan::Malformed {
            token: format!("#{}", digits),
        },
    }
}

/// Resolve the instruction's reference marker against the host, if any.
///
/// Returns `None` in every non-fatal case: no marker, malformed marker, or
/// a referenced change request that cannot be fetched.
pub async fn resolve_target<H: RepoHost>(host: &H, instruction: &str) -> Option<TargetReference> {
    let number = match scan_reference(instruction) {
        ReferenceScan::Missing => {
            debug!("instruction carries no change-request reference");
            return None;
        }
        ReferenceScan::Malformed { token } => {
            warn!(
                "ignoring malformed change-request reference '{}' in instruction",
                token
            );
            return None;
        }
        ReferenceScan::Found(number) => number,
    };

    match host.change_request(number).await {
        Ok(existing) => {
            debug!(
                "instruction targets change request #{} (head '{}')",
                existing.number, existing.head_branch
            );
            Some(TargetReference {
                number: existing.number,
                head_branch: existing.head_branch,
                title: existing.title,
                body: existing.body,
            })
        }
        Err(err) => {
            warn!(
                "change request #{} could not be fetched ({}); falling back to a new branch",
                number, err
            );
            None
        }
    }
}

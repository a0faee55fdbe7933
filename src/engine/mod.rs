//! Change-reconciliation engine
//!
//! Decides whether a run lands on a fresh branch + new change request or
//! on the branch/request an instruction already references, then writes
//! the proposal's files and records the proposal durably. Resolved
//! identities flow through as plain values; there is no process-wide
//! run state.

pub mod branch;
pub mod files;
pub mod publish;
pub mod reference;

use crate::host::RepoHost;
use crate::proposal::{Proposal, Verdict};
use anyhow::Result;
use tracing::info;

/// Identities fixed before the engine starts mutating.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Trunk branch new work is cut from and merged back into.
    pub trunk: String,
    /// Prefix for synthesized branch names.
    pub branch_prefix: String,
}

/// Terminal state of a run. Both variants are success.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// Files were written and a change request was created or updated.
    Published {
        number: u64,
        url: String,
        branch: String,
        updated: bool,
    },
    /// The proposal asked for human attention; nothing was mutated.
    HumanReview { commented: bool },
}

/// Execute one reconciliation run.
///
/// Steps are strictly sequential: the working branch must exist before
/// files can target it, and each file's prior identity must be resolved
/// before its write. The first fatal error stops the run; already-applied
/// mutations are left in place.
pub async fn run<H: RepoHost>(
    host: &H,
    options: &RunOptions,
    instruction: &str,
    proposal: &Proposal,
) -> Result<RunOutcome> {
    let target = reference::resolve_target(host, instruction).await;

    if proposal.verdict == Verdict::HumanReview {
        let commented = publish::notify_human_review(host, proposal, target.as_ref()).await?;
        return Ok(RunOutcome::HumanReview { commented });
    }

    let working = branch::reconcile(
        host,
        target.as_ref(),
        &options.trunk,
        &options.branch_prefix,
    )
    .await?;

    let written = files::materialize(host, proposal, &working.name, &options.trunk).await?;
    info!("wrote {} file(s) to '{}'", written, working.name);

    let published = publish::publish(
        host,
        proposal,
        target.as_ref(),
        &working.name,
        &options.trunk,
    )
    .await?;

    Ok(RunOutcome::Published {
        number: published.number,
        url: published.url,
        branch: working.name,
        updated: published.updated,
    })
}

// ============================================================================
// Behavior tests against an in-memory host
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{
        ChangeRequest, FileWriteIntent, HostError, NewChangeRequest, RepoFile, RepoHost,
    };
    use crate::proposal::{ProposedFile, Verdict};
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory stand-in for the hosting API. Records every mutation so
    /// tests can assert on exactly what a run did.
    #[derive(Default)]
    struct FakeHost {
        default_branch: String,
        branches: Mutex<HashMap<String, String>>,
        files: Mutex<HashMap<(String, String), RepoFile>>,
        prs: Mutex<HashMap<u64, ChangeRequest>>,
        created_branches: Mutex<Vec<String>>,
        writes: Mutex<Vec<FileWriteIntent>>,
        creates: Mutex<Vec<NewChangeRequest>>,
        comments: Mutex<Vec<(u64, String)>>,
        next_number: Mutex<u64>,
        conflict_on_create: bool,
        fail_writes_from: Option<usize>,
    }

    impl FakeHost {
        fn new() -> Self {
            let host = FakeHost {
                default_branch: "main".to_string(),
                next_number: Mutex::new(1),
                ..Default::default()
            };
            host.branches
                .lock()
                .unwrap()
                .insert("main".to_string(), "trunk-sha".to_string());
            host
        }

        fn with_pr(self, number: u64, head_branch: &str, title: &str, body: &str) -> Self {
            self.branches
                .lock()
                .unwrap()
                .insert(head_branch.to_string(), format!("{}-sha", head_branch));
            self.prs.lock().unwrap().insert(
                number,
                ChangeRequest {
                    number,
                    title: title.to_string(),
                    body: body.to_string(),
                    head_branch: head_branch.to_string(),
                    html_url: format!("https://github.test/octo/widgets/pull/{}", number),
                },
            );
            self
        }

        fn seed_file(&self, branch: &str, path: &str, sha: &str, content: &str) {
            self.files.lock().unwrap().insert(
                (branch.to_string(), path.to_string()),
                RepoFile {
                    sha: sha.to_string(),
                    content: content.to_string(),
                },
            );
        }

        fn pr(&self, number: u64) -> ChangeRequest {
            self.prs.lock().unwrap().get(&number).unwrap().clone()
        }
    }

    #[async_trait]
    impl RepoHost for FakeHost {
        async fn default_branch(&self) -> Result<String, HostError> {
            Ok(self.default_branch.clone())
        }

        async fn branch_head(&self, branch: &str) -> Result<String, HostError> {
            self.branches
                .lock()
                .unwrap()
                .get(branch)
                .cloned()
                .ok_or(HostError::Api {
                    status: 404,
                    message: "Not Found".to_string(),
                })
        }

        async fn create_branch(&self, name: &str, from_sha: &str) -> Result<(), HostError> {
            let mut branches = self.branches.lock().unwrap();
            if self.conflict_on_create || branches.contains_key(name) {
                return Err(HostError::Api {
                    status: 422,
                    message: "Reference already exists".to_string(),
                });
            }
            branches.insert(name.to_string(), from_sha.to_string());
            self.created_branches.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn file(&self, path: &str, reference: &str) -> Result<Option<RepoFile>, HostError> {
            Ok(self
                .files
                .lock()
                .unwrap()
                .get(&(reference.to_string(), path.to_string()))
                .cloned())
        }

        async fn put_file(&self, intent: &FileWriteIntent) -> Result<(), HostError> {
            let mut writes = self.writes.lock().unwrap();
            if let Some(limit) = self.fail_writes_from {
                if writes.len() >= limit {
                    return Err(HostError::Api {
                        status: 500,
                        message: "Internal Server Error".to_string(),
                    });
                }
            }
            writes.push(intent.clone());

            let decoded = BASE64.decode(intent.content_base64.as_bytes()).unwrap();
            self.files.lock().unwrap().insert(
                (intent.branch.clone(), intent.path.clone()),
                RepoFile {
                    sha: format!("sha-{}", writes.len()),
                    content: String::from_utf8(decoded).unwrap(),
                },
            );
            Ok(())
        }

        async fn change_request(&self, number: u64) -> Result<ChangeRequest, HostError> {
            self.prs
                .lock()
                .unwrap()
                .get(&number)
                .cloned()
                .ok_or(HostError::Api {
                    status: 404,
                    message: "Not Found".to_string(),
                })
        }

        async fn create_change_request(
            &self,
            new: &NewChangeRequest,
        ) -> Result<ChangeRequest, HostError> {
            let mut next = self.next_number.lock().unwrap();
            let number = *next;
            *next += 1;

            let created = ChangeRequest {
                number,
                title: new.title.clone(),
                body: new.body.clone(),
                head_branch: new.head.clone(),
                html_url: format!("https://github.test/octo/widgets/pull/{}", number),
            };
            self.prs.lock().unwrap().insert(number, created.clone());
            self.creates.lock().unwrap().push(new.clone());
            Ok(created)
        }

        async fn update_change_request(
            &self,
            number: u64,
            title: &str,
            body: &str,
        ) -> Result<(), HostError> {
            let mut prs = self.prs.lock().unwrap();
            let pr = prs.get_mut(&number).ok_or(HostError::Api {
                status: 404,
                message: "Not Found".to_string(),
            })?;
            pr.title = title.to_string();
            pr.body = body.to_string();
            Ok(())
        }

        async fn comment(&self, number: u64, body: &str) -> Result<(), HostError> {
            self.comments
                .lock()
                .unwrap()
                .push((number, body.to_string()));
            Ok(())
        }
    }

    fn options() -> RunOptions {
        RunOptions {
            trunk: "main".to_string(),
            branch_prefix: "patchbot".to_string(),
        }
    }

    fn patch_proposal(summary: &str, files: &[(&str, &str)]) -> Proposal {
        Proposal {
            verdict: Verdict::Patch,
            files: files
                .iter()
                .map(|(path, content)| ProposedFile {
                    path: path.to_string(),
                    content: content.to_string(),
                })
                .collect(),
            summary: summary.to_string(),
        }
    }

    fn review_proposal(summary: &str) -> Proposal {
        Proposal {
            verdict: Verdict::HumanReview,
            files: Vec::new(),
            summary: summary.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fresh_instruction_creates_branch_and_draft_pr() {
        let host = FakeHost::new();
        let proposal = patch_proposal("add logging", &[("src/log.rs", "fn log() {}")]);

        let outcome = run(&host, &options(), "Add some logging", &proposal)
            .await
            .unwrap();

        let created = host.created_branches.lock().unwrap().clone();
        assert_eq!(created.len(), 1);
        assert!(created[0].starts_with("patchbot/"));

        let writes = host.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].branch, created[0]);
        assert_eq!(writes[0].prior_sha, None);
        assert_eq!(writes[0].message, "add logging");
        let decoded = BASE64.decode(writes[0].content_base64.as_bytes()).unwrap();
        assert_eq!(decoded, b"fn log() {}");

        let creates = host.creates.lock().unwrap().clone();
        assert_eq!(creates.len(), 1);
        assert!(creates[0].draft);
        assert_eq!(creates[0].base, "main");
        assert!(creates[0].body.contains("add logging"));

        match outcome {
            RunOutcome::Published {
                updated, branch, ..
            } => {
                assert!(!updated);
                assert_eq!(branch, created[0]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_prior_identity_found_on_trunk() {
        let host = FakeHost::new();
        host.seed_file("main", ".github/workflows/ci.yml", "ci-sha", "jobs: {}");
        let proposal = patch_proposal(
            "add retry step",
            &[(".github/workflows/ci.yml", "jobs: {retry: {}}")],
        );

        run(&host, &options(), "Improve CI reliability", &proposal)
            .await
            .unwrap();

        let writes = host.writes.lock().unwrap().clone();
        assert_eq!(writes[0].prior_sha, Some("ci-sha".to_string()));
    }

    #[tokio::test]
    async fn test_working_branch_identity_wins_over_trunk() {
        let host = FakeHost::new().with_pr(42, "agentic/111", "[patchbot] improve retries", "intro");
        host.seed_file("main", "src/lib.rs", "trunk-sha-1", "old");
        host.seed_file("agentic/111", "src/lib.rs", "branch-sha-1", "newer");
        let proposal = patch_proposal("tighten retries", &[("src/lib.rs", "newest")]);

        run(&host, &options(), "please fix #42", &proposal)
            .await
            .unwrap();

        let writes = host.writes.lock().unwrap().clone();
        assert_eq!(writes[0].prior_sha, Some("branch-sha-1".to_string()));
    }

    #[tokio::test]
    async fn test_reference_reuses_head_branch_and_appends() {
        let host = FakeHost::new().with_pr(
            42,
            "agentic/111",
            "[patchbot] improve retries",
            "original body",
        );
        let proposal = patch_proposal("different summary", &[("src/lib.rs", "v2")]);

        let outcome = run(&host, &options(), "please fix #42", &proposal)
            .await
            .unwrap();

        // No branch creation on the reuse path.
        assert!(host.created_branches.lock().unwrap().is_empty());
        assert!(host.creates.lock().unwrap().is_empty());

        let writes = host.writes.lock().unwrap().clone();
        assert_eq!(writes[0].branch, "agentic/111");

        let pr = host.pr(42);
        assert!(pr.body.starts_with("original body"));
        assert!(pr.body.contains("different summary"));
        // Original descriptive title survives later summaries.
        assert_eq!(pr.title, "[patchbot] improve retries");

        match outcome {
            RunOutcome::Published {
                number, updated, ..
            } => {
                assert_eq!(number, 42);
                assert!(updated);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_title_gains_prefix_when_updating_unprefixed_request() {
        let host = FakeHost::new().with_pr(7, "feature/x", "hand-written title", "");
        let proposal = patch_proposal("s", &[("a", "b")]);

        run(&host, &options(), "touch up #7", &proposal).await.unwrap();

        assert_eq!(host.pr(7).title, "[patchbot] hand-written title");
    }

    #[tokio::test]
    async fn test_branch_conflict_swallowed() {
        let host = FakeHost {
            conflict_on_create: true,
            ..FakeHost::new()
        };
        let proposal = patch_proposal("add logging", &[("src/log.rs", "fn log() {}")]);

        let outcome = run(&host, &options(), "Add some logging", &proposal)
            .await
            .unwrap();

        // Creation conflicted, yet the run carried on and published.
        assert!(host.created_branches.lock().unwrap().is_empty());
        assert_eq!(host.writes.lock().unwrap().len(), 1);
        assert!(matches!(outcome, RunOutcome::Published { updated: false, .. }));
    }

    #[tokio::test]
    async fn test_unresolvable_reference_degrades_to_creation() {
        let host = FakeHost::new();
        let proposal = patch_proposal("s", &[("a", "b")]);

        let outcome = run(&host, &options(), "please fix #99", &proposal)
            .await
            .unwrap();

        assert_eq!(host.created_branches.lock().unwrap().len(), 1);
        assert_eq!(host.creates.lock().unwrap().len(), 1);
        assert!(matches!(outcome, RunOutcome::Published { updated: false, .. }));
    }

    #[tokio::test]
    async fn test_human_review_performs_no_mutations() {
        let host = FakeHost::new().with_pr(42, "agentic/111", "t", "untouched body");
        let proposal = review_proposal("needs a schema migration");

        let outcome = run(&host, &options(), "please fix #42", &proposal)
            .await
            .unwrap();

        assert!(host.created_branches.lock().unwrap().is_empty());
        assert!(host.writes.lock().unwrap().is_empty());
        assert!(host.creates.lock().unwrap().is_empty());
        assert_eq!(host.pr(42).body, "untouched body");

        let comments = host.comments.lock().unwrap().clone();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 42);
        assert!(comments[0].1.contains("needs a schema migration"));

        assert!(matches!(outcome, RunOutcome::HumanReview { commented: true }));
    }

    #[tokio::test]
    async fn test_human_review_without_reference_posts_nothing() {
        let host = FakeHost::new();
        let proposal = review_proposal("too risky");

        let outcome = run(&host, &options(), "rewrite the auth layer", &proposal)
            .await
            .unwrap();

        assert!(host.comments.lock().unwrap().is_empty());
        assert!(host.writes.lock().unwrap().is_empty());
        assert!(matches!(outcome, RunOutcome::HumanReview { commented: false }));
    }

    #[tokio::test]
    async fn test_repeated_runs_append_sections_in_order() {
        let host = FakeHost::new().with_pr(42, "agentic/111", "[patchbot] first", "intro");

        for summary in ["first pass", "second pass", "third pass"] {
            let proposal = patch_proposal(summary, &[("src/lib.rs", summary)]);
            run(&host, &options(), "please fix #42", &proposal)
                .await
                .unwrap();
        }

        let body = host.pr(42).body;
        let first = body.find("first pass").unwrap();
        let second = body.find("second pass").unwrap();
        let third = body.find("third pass").unwrap();
        assert!(body.starts_with("intro"));
        assert!(first < second && second < third);
    }

    #[tokio::test]
    async fn test_file_write_failure_aborts_run_without_rollback() {
        let host = FakeHost {
            fail_writes_from: Some(1),
            ..FakeHost::new()
        };
        let proposal = patch_proposal("s", &[("one", "1"), ("two", "2")]);

        let err = run(&host, &options(), "write two files", &proposal)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("two"));

        // The first write stays applied; no change request was opened.
        assert_eq!(host.writes.lock().unwrap().len(), 1);
        assert!(host.creates.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_improve_ci_reliability() {
        let host = FakeHost::new();
        let proposal = patch_proposal(
            "add retry step",
            &[(".github/workflows/ci.yml", "jobs: {retry: {}}")],
        );

        let outcome = run(&host, &options(), "Improve CI reliability", &proposal)
            .await
            .unwrap();

        let created = host.created_branches.lock().unwrap().clone();
        assert_eq!(created.len(), 1);

        let writes = host.writes.lock().unwrap().clone();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].prior_sha, None);

        let creates = host.creates.lock().unwrap().clone();
        assert!(creates[0].draft);
        assert!(creates[0].title.contains("add retry step"));
        assert_eq!(creates[0].head, created[0]);
        assert_eq!(creates[0].base, "main");

        assert!(matches!(outcome, RunOutcome::Published { number: 1, .. }));
    }
}

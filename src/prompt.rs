//! Prompt assembly for the proposal request
//!
//! Key principle: give the model EVERYTHING it needs in one shot. The
//! instruction alone is rarely enough, so a handful of well-known
//! repository files are sampled (truncated) into the user message.

use crate::host::RepoHost;
use crate::llm::ChatMessage;
use tracing::warn;

/// Well-known paths probed for prompt context. Missing paths are skipped.
const CONTEXT_CANDIDATES: &[&str] = &[
    "README.md",
    "Cargo.toml",
    "package.json",
    "pyproject.toml",
    "go.mod",
    ".github/workflows/ci.yml",
];

/// Per-file cap on sampled content characters.
const MAX_CONTEXT_CHARS: usize = 6000;

pub const SYSTEM_PROMPT: &str = r#"You are an automated code-change assistant. You receive a maintainer's instruction plus sampled repository files, and you respond with a change proposal.

Your ONLY output is a single JSON object:
{
  "verdict": "PATCH" or "HUMAN_REVIEW_REQUIRED",
  "files": [{"path": "relative/path", "content": "full new file content"}],
  "summary": "one-line description of the change"
}

Rules:
1. Output ONLY the JSON object, no explanations, no markdown fences
2. "files" entries carry COMPLETE replacement content, not diffs
3. Keep the change minimal and focused on the instruction
4. Use "HUMAN_REVIEW_REQUIRED" when the instruction is ambiguous, risky, or cannot be satisfied by editing files; leave "files" empty in that case
5. "summary" should read like a commit subject line"#;

/// A sampled context file: repo-relative path plus truncated content.
pub type ContextFile = (String, String);

/// Read the candidate paths from the trunk branch. Sampling is best-effort;
/// fetch failures only cost context, never the run.
pub async fn sample_context<H: RepoHost>(host: &H, trunk: &str) -> Vec<ContextFile> {
    let mut sampled = Vec::new();

    for path in CONTEXT_CANDIDATES {
        match host.file(path, trunk).await {
            Ok(Some(file)) => {
                sampled.push((
                    path.to_string(),
                    truncate_content(&file.content, MAX_CONTEXT_CHARS),
                ));
            }
            Ok(None) => {}
            Err(err) => {
                warn!("skipping context file {}: {}", path, err);
            }
        }
    }

    sampled
}

/// Assemble the ordered message list for the proposal request.
pub fn build_messages(instruction: &str, context: &[ContextFile]) -> Vec<ChatMessage> {
    let mut user = format!("Instruction:\n{}\n", instruction.trim());

    if !context.is_empty() {
        user.push_str("\nRepository context:\n");
        for (path, content) in context {
            user.push_str(&format!("\n--- {} ---\n{}\n", path, content));
        }
    }

    user.push_str("\nRespond with the JSON object now.");

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Truncate file contents for prompt safety (keep beginning + end)
pub fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let head: String = content.chars().take(max_chars / 2).collect();
        let tail: String = content.chars().rev().take(max_chars / 2).collect::<String>();
        format!(
            "{}\n\n... [truncated] ...\n\n{}",
            head,
            tail.chars().rev().collect::<String>()
        )
    }
}

//! Structured change proposals and their extraction from model output
//!
//! The model is asked for a single JSON object but in practice wraps it in
//! markdown fences, prose, or slightly broken JSON. The parser here peels
//! all of that away and repairs the common damage before deserializing.
//! A response with no parseable object is fatal to the run.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::llm::truncate_str;

/// What the model decided to do with the instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "PATCH", alias = "patch")]
    Patch,
    #[serde(rename = "HUMAN_REVIEW_REQUIRED", alias = "human_review_required")]
    HumanReview,
}

/// One proposed file, full replacement content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedFile {
    pub path: String,
    pub content: String,
}

/// The model's structured suggestion. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub verdict: Verdict,
    #[serde(default)]
    pub files: Vec<ProposedFile>,
    #[serde(default)]
    pub summary: String,
}

impl Proposal {
    /// Extract and validate a proposal from raw model output.
    pub fn parse(response: &str) -> Result<Proposal> {
        let clean = strip_markdown_fences(response);
        let json_str = extract_json_fragment(clean, '{', '}')
            .ok_or_else(|| anyhow::anyhow!("No JSON object found in model response"))?;

        let proposal: Proposal = match serde_json::from_str(json_str) {
            Ok(parsed) => parsed,
            Err(initial_error) => {
                let fixed = fix_json_issues(json_str);
                serde_json::from_str(&fixed).map_err(|_| {
                    anyhow::anyhow!(
                        "Proposal could not be parsed ({}). Response preview: {}",
                        initial_error,
                        truncate_str(json_str, 200)
                    )
                })?
            }
        };

        proposal.validate()?;
        Ok(proposal)
    }

    fn validate(&self) -> Result<()> {
        if self.verdict == Verdict::Patch {
            if self.files.is_empty() {
                anyhow::bail!("Proposal verdict is PATCH but no files were proposed");
            }
            if let Some(file) = self.files.iter().find(|f| f.path.trim().is_empty()) {
                anyhow::bail!(
                    "Proposal contains a file with an empty path (content preview: {})",
                    truncate_str(&file.content, 60)
                );
            }
        }
        Ok(())
    }
}

/// Strip markdown code fences from a response
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if trimmed.starts_with("```json") {
        trimmed.strip_prefix("```json").unwrap_or(trimmed)
    } else if trimmed.starts_with("```") {
        trimmed.strip_prefix("```").unwrap_or(trimmed)
    } else {
        trimmed
    };
    let clean = if clean.ends_with("```") {
        clean.strip_suffix("```").unwrap_or(clean)
    } else {
        clean
    };
    clean.trim()
}

/// Extract a JSON fragment between matching delimiters
fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Try to fix common JSON issues from LLM responses
fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Remove trailing commas before ] or }
    fixed = fixed.replace(",]", "]");
    fixed = fixed.replace(",}", "}");

    // Smart quotes to regular quotes
    fixed = fixed.replace('\u{201C}', "\""); // Left double quote
    fixed = fixed.replace('\u{201D}', "\""); // Right double quote
    fixed = fixed.replace('\u{2018}', "'"); // Left single quote
    fixed = fixed.replace('\u{2019}', "'"); // Right single quote

    // Remove any control characters that might have slipped in
    fixed = fixed
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    fixed
}

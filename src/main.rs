//! patchbot entry point
//!
//! One invocation is one run: read the instruction, ask the model for a
//! proposal, then reconcile the result into a branch, file commits, and a
//! draft pull request (or an update to the pull request the instruction
//! references). A fatal error at any step stops the run; partial mutations
//! are left in place for the next invocation to reconcile.

use anyhow::{Context, Result};
use clap::Parser;
use patchbot::config::Config;
use patchbot::engine::{self, RunOptions, RunOutcome};
use patchbot::github::GithubClient;
use patchbot::host::RepoHost;
use patchbot::llm::ModelClient;
use patchbot::proposal::Proposal;
use patchbot::{logging, prompt};
use std::io::Read;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "patchbot",
    about = "Turns a review instruction into a draft pull request",
    version
)]
struct Args {
    /// Instruction text (reads stdin when omitted)
    instruction: Option<String>,

    /// Read the instruction from a file instead
    #[arg(long, value_name = "PATH", conflicts_with = "instruction")]
    instruction_file: Option<PathBuf>,

    /// Repository (owner/name or GitHub URL); defaults to $GITHUB_REPOSITORY
    #[arg(long)]
    repo: Option<String>,

    /// Base branch override (defaults to the repository's default branch)
    #[arg(long)]
    base: Option<String>,

    /// Prefix for synthesized branch names
    #[arg(long, default_value = "patchbot")]
    branch_prefix: String,

    /// Model id for the proposal request
    #[arg(long, default_value = "anthropic/claude-sonnet-4")]
    model: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let instruction = read_instruction(&args)?;
    let config = Config::resolve(
        args.repo.as_deref(),
        &args.model,
        args.base.as_deref(),
        &args.branch_prefix,
    )?;

    let host = GithubClient::new(&config.github_token, config.repo.clone())?;
    let model = ModelClient::new(&config.model_api_key, &config.model)?;

    let trunk = match &config.trunk_override {
        Some(base) => base.clone(),
        None => host
            .default_branch()
            .await
            .context("Failed to read the repository's default branch")?,
    };
    info!("targeting {} (trunk '{}')", config.repo, trunk);

    let context = prompt::sample_context(&host, &trunk).await;
    let messages = prompt::build_messages(&instruction, &context);
    let response = model.complete(&messages).await?;
    let proposal = Proposal::parse(&response)?;

    let options = RunOptions {
        trunk,
        branch_prefix: config.branch_prefix.clone(),
    };
    let outcome = engine::run(&host, &options, &instruction, &proposal).await?;

    match outcome {
        RunOutcome::Published {
            number,
            url,
            branch,
            updated,
        } => {
            info!(
                "{} change request #{} on '{}'",
                if updated { "updated" } else { "opened" },
                number,
                branch
            );
            println!("{}", url);
        }
        RunOutcome::HumanReview { commented } => {
            println!(
                "Proposal requires human attention{}",
                if commented {
                    " (noted on the referenced change request)"
                } else {
                    ""
                }
            );
        }
    }

    Ok(())
}

fn read_instruction(args: &Args) -> Result<String> {
    let raw = if let Some(path) = &args.instruction_file {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read instruction file {}", path.display()))?
    } else if let Some(text) = &args.instruction {
        text.clone()
    } else {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read instruction from stdin")?;
        buffer
    };

    let trimmed = raw.trim().to_string();
    if trimmed.is_empty() {
        anyhow::bail!("No instruction provided");
    }
    Ok(trimmed)
}

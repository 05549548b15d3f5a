//! Story Runner CLI
//!
//! Compiles a dialog tree and replays one or more story files against it,
//! each story as a fresh user with an in-memory session store.
//!
//! Usage:
//!   cargo run --bin dialog-story -- \
//!     --tree dialog-turn-harness/stories/restaurant.tree.yaml \
//!     --stories dialog-turn-harness/stories/restaurant.stories.yaml
//!
//! Limits come from `DIALOG_MAX_JUMP_DEPTH` / `DIALOG_MAX_DIGRESSION_DEPTH`
//! unless `--config` names an engine config YAML.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;

use dialog_turn_core::authoring::compile_tree_yaml;
use dialog_turn_core::{DialogEngine, EngineConfig, MemorySessionStore, ScriptEvaluator};
use dialog_turn_harness::{load_stories, run_stories, HarnessResult};

/// Replay scripted conversations against a dialog tree
#[derive(Parser, Debug)]
#[command(name = "dialog-story")]
#[command(about = "Replay story files against a dialog tree and diff the bot's lines")]
struct Args {
    /// Dialog tree YAML
    #[arg(long, short = 't')]
    tree: PathBuf,

    /// Story files (can be specified multiple times)
    #[arg(long, short = 's', required = true)]
    stories: Vec<PathBuf>,

    /// Engine config YAML; overrides the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Print every turn, not only failures
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            EngineConfig::from_yaml(&yaml)?
        }
        None => EngineConfig::from_env()?,
    };

    let tree_yaml = std::fs::read_to_string(&args.tree)
        .with_context(|| format!("Failed to read tree {}", args.tree.display()))?;
    let tree = match compile_tree_yaml(&tree_yaml) {
        Ok(tree) => Arc::new(tree),
        Err(e) => {
            eprintln!("{} {}", "ERROR:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let mut results = Vec::with_capacity(args.stories.len());
    for path in &args.stories {
        let file = load_stories(path)?;
        // Fresh store per file so files never share sessions.
        let engine = DialogEngine::new(
            tree.clone(),
            Arc::new(ScriptEvaluator::new()),
            Arc::new(MemorySessionStore::new()),
            config.clone(),
        );
        let result = run_stories(&engine, &file).await;
        if !args.json {
            print_file(path, &result, args.verbose);
        }
        results.push(result);
    }

    let failed: usize = results.iter().map(|r| r.failed).sum();
    let total: usize = results.iter().map(|r| r.total).sum();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("\n{}", "═".repeat(60));
        println!("{}", "SUMMARY".cyan().bold());
        println!("{}", "═".repeat(60));
        println!("Tree:         {}", tree.version().yellow());
        println!("Stories:      {}", total);
        println!("Passed:       {}", (total - failed).to_string().green());
        println!("Failed:       {}", failed.to_string().red());
    }

    if failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn print_file(path: &std::path::Path, result: &HarnessResult, verbose: bool) {
    println!("\n{} {}", "Stories:".cyan().bold(), path.display());
    for story in &result.stories {
        let status = if story.passed {
            "PASS".green()
        } else {
            "FAIL".red()
        };
        println!("  {} {} ({}ms)", status, story.name, story.duration_ms);

        for turn in &story.turns {
            if turn.passed && !verbose {
                continue;
            }
            println!("    {} {}", "turn".dimmed(), turn.index + 1);
            if let Some(error) = &turn.error {
                println!("      Error: {}", error.red());
                continue;
            }
            for line in &turn.expected {
                println!("      {} {}", "expected:".dimmed(), line);
            }
            for line in &turn.actual {
                let line = if turn.passed {
                    line.normal()
                } else {
                    line.yellow()
                };
                println!("      {} {}", "actual:  ".dimmed(), line);
            }
        }
    }
}

mod adapters;
mod config;
mod core;

use crate::adapters::ChatEndpoint;
use crate::config::Config;
use crate::core::{
    DiffMode, DiffParser, GitDiffSource, Orchestrator, ReviewOutcome, ReviewResult, ReviewStatus,
    StaticAnalyzer,
};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "diffgate")]
#[command(about = "LLM-gated code review for git diffs with heuristic fallback", long_about = None)]
#[command(version)]
struct Cli {
    /// Which changes to review.
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Base commit/branch for a range diff (requires --head).
    #[arg(long)]
    base: Option<String>,

    /// Head commit/branch for a range diff (requires --base).
    #[arg(long)]
    head: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Block the commit on warnings as well as critical issues.
    #[arg(long)]
    strict: bool,

    /// Static analysis only, no network.
    #[arg(long)]
    offline: bool,

    /// Send one tiny completion to verify the endpoint answers.
    #[arg(long)]
    test_connection: bool,

    #[arg(long)]
    config_file: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Staged,
    Unstaged,
    All,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let exit_code = run(cli).await.unwrap_or_else(|err| {
        eprintln!("Error: {err:#}");
        4
    });
    std::process::exit(exit_code);
}

async fn run(cli: Cli) -> Result<i32> {
    if cli.offline && cli.test_connection {
        eprintln!("Error: --offline and --test-connection are mutually exclusive.");
        return Ok(4);
    }
    if cli.base.is_some() != cli.head.is_some() {
        eprintln!("Error: --base and --head must be provided together for a range diff.");
        return Ok(2);
    }
    if cli.mode.is_some() && cli.base.is_some() {
        eprintln!("Error: --mode cannot be used together with --base/--head.");
        return Ok(2);
    }

    let config = match &cli.config_file {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    if cli.test_connection {
        let client = Arc::new(ChatEndpoint::new(&config)?);
        let orchestrator = Orchestrator::new(config, client);
        return if orchestrator.test_connection().await {
            println!("Connection to LLM successful");
            Ok(0)
        } else {
            println!("Connection to LLM failed");
            Ok(1)
        };
    }

    let git = GitDiffSource::discover(".")?;
    let mode = match (&cli.base, &cli.head, cli.mode) {
        (Some(base), Some(head), _) => DiffMode::Range {
            base: base.clone(),
            head: head.clone(),
        },
        (_, _, Some(ModeArg::Unstaged)) => DiffMode::Unstaged,
        (_, _, Some(ModeArg::All)) => DiffMode::All,
        _ => DiffMode::Staged,
    };
    let raw_diff = git.diff(&mode, config.output.max_context_lines as u32)?;

    let result = if cli.offline {
        // Offline review always includes the docstring check.
        StaticAnalyzer::analyze(&raw_diff, true)
    } else {
        let files = DiffParser::filter_files(DiffParser::parse(&raw_diff), |path| {
            config.is_file_eligible(path)
        });

        if cli.verbose {
            eprintln!("Analyzing {} file(s)", files.len());
            for file in &files {
                eprintln!("  - {}", file.path);
            }
        }

        let formatted = DiffParser::format_for_llm(&files, config.output.max_context_lines);
        let client = Arc::new(ChatEndpoint::new(&config)?);
        let orchestrator = Orchestrator::new(config, client);
        orchestrator.review_diff(&formatted).await
    };

    match cli.format {
        OutputFormat::Json => println!("{}", render_json(&result, cli.strict)?),
        OutputFormat::Text => println!("{}", render_text(&result, cli.verbose)),
    }

    Ok(result.exit_code(cli.strict))
}

fn render_text(result: &ReviewResult, verbose: bool) -> String {
    let mut lines = Vec::new();

    let banner = match (result.status, result.outcome()) {
        (ReviewStatus::Skipped, _) => "Review Skipped (token limit exceeded)",
        (ReviewStatus::ModelUnavailable, _) => "LLM Model Unavailable",
        (_, ReviewOutcome::Critical) => "Critical Issues Found",
        (_, ReviewOutcome::Warnings) => "Warnings Found",
        (_, ReviewOutcome::Success) => "No Issues Found",
    };
    lines.push(banner.to_string());
    lines.push(String::new());

    if !result.critical_issues.is_empty() {
        lines.push("CRITICAL ISSUES:".to_string());
        for issue in &result.critical_issues {
            lines.push(format!("  - {issue}"));
        }
        lines.push(String::new());
    }

    if !result.warnings.is_empty() {
        lines.push("WARNINGS:".to_string());
        for warning in &result.warnings {
            lines.push(format!("  - {warning}"));
        }
        lines.push(String::new());
    }

    if !result.suggestions.is_empty() {
        lines.push("SUGGESTIONS:".to_string());
        for suggestion in &result.suggestions {
            lines.push(format!("  - {suggestion}"));
        }
        lines.push(String::new());
    }

    if !result.code_suggestions.is_empty() {
        lines.push("CODE SUGGESTIONS:".to_string());
        for cs in &result.code_suggestions {
            lines.push(format!(
                "  - {}:{}-{}: {}",
                cs.file, cs.line_start, cs.line_end, cs.description
            ));
            for code_line in cs.suggested_code.lines() {
                lines.push(format!("      {code_line}"));
            }
        }
        lines.push(String::new());
    }

    if verbose {
        lines.push("Status Information:".to_string());
        let llm_status = match result.status {
            ReviewStatus::Success => "completed",
            ReviewStatus::ModelUnavailable => "model_unavailable",
            ReviewStatus::Error => "error",
            ReviewStatus::Skipped => "skipped",
        };
        lines.push(format!("  - LLM Review: {llm_status}"));
        let outcome = match result.outcome() {
            ReviewOutcome::Critical => "critical",
            ReviewOutcome::Warnings => "warnings",
            ReviewOutcome::Success => "success",
        };
        lines.push(format!("  - Code Review Outcome: {outcome}"));
        if result.fallback_used {
            lines.push("  - Fallback Analysis: Yes".to_string());
        }
        if result.total_chunks > 0 {
            lines.push(format!(
                "  - Chunks Reviewed: {}/{}",
                result.chunks_reviewed, result.total_chunks
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}

fn render_json(result: &ReviewResult, strict: bool) -> Result<String> {
    let mut value = serde_json::to_value(result)?;
    value["review_outcome"] = serde_json::to_value(result.outcome())?;
    value["exit_code"] = json!(result.exit_code(strict));
    Ok(serde_json::to_string_pretty(&value)?)
}

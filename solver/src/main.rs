//! Proposer/Skeptic verification CLI.
//!
//! State lives in a data directory (`.solver/` by default): `config.toml`
//! and one record directory per solved problem under `records/`.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use solver::core::analytics::{AnalyticsReport, aggregate};
use solver::core::script::run_verification_with;
use solver::core::types::FinalStatus;
use solver::exit_codes;
use solver::fallback::CredentialsExhausted;
use solver::io::config::load_config;
use solver::io::credentials::load_credentials;
use solver::io::init::{InitOptions, SolverPaths, init_solver};
use solver::io::llm::HttpCompletionClient;
use solver::io::store::RecordStore;
use solver::logging;
use solver::solve::{SolveOutcome, solve_query};

#[derive(Parser)]
#[command(
    name = "solver",
    version,
    about = "Proposer/Skeptic verification loop for engineering problems"
)]
struct Cli {
    /// Directory holding `config.toml` and saved records.
    #[arg(long, global = true, default_value = ".solver")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the data directory with a default `config.toml`.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Solve a problem through the Proposer/Skeptic loop and save the record.
    Solve {
        /// Problem statement.
        query: String,
        /// Print the full outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Run a verification script (file path or `-` for stdin).
    Verify {
        #[arg(default_value = "-")]
        script: String,
    },
    /// Print a saved problem and its attempts as JSON.
    Show { id: String },
    /// List saved problems.
    List,
    /// Print per-category analytics.
    Report {
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            if err.downcast_ref::<CredentialsExhausted>().is_some() {
                exit_codes::CREDENTIALS_EXHAUSTED
            } else {
                exit_codes::INVALID
            }
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let paths = SolverPaths::new(&cli.data_dir);
    match cli.command {
        Command::Init { force } => cmd_init(&paths, force),
        Command::Solve { query, json } => cmd_solve(&paths, &query, json),
        Command::Verify { script } => cmd_verify(&paths, &script),
        Command::Show { id } => cmd_show(&paths, &id),
        Command::List => cmd_list(&paths),
        Command::Report { json } => cmd_report(&paths, json),
    }
}

fn cmd_init(paths: &SolverPaths, force: bool) -> Result<i32> {
    let paths = init_solver(&paths.data_dir, &InitOptions { force })?;
    println!("initialized {}", paths.data_dir.display());
    Ok(exit_codes::OK)
}

fn cmd_solve(paths: &SolverPaths, query: &str, json: bool) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let credentials = load_credentials(&config.credentials.env_vars)?;
    let store = RecordStore::new(&paths.records_dir);
    let outcome = solve_query(
        &store,
        &config,
        &credentials,
        |credential| Ok(HttpCompletionClient::new(&config.llm, credential.clone())),
        query,
    )?;
    if json {
        print_json(&outcome)?;
    } else {
        print_solve_summary(&outcome);
    }
    Ok(if outcome.final_attempt().final_status.is_pass() {
        exit_codes::OK
    } else {
        exit_codes::UNVERIFIED
    })
}

fn print_solve_summary(outcome: &SolveOutcome) {
    for attempt in outcome.history.attempts() {
        println!(
            "attempt {}: {} ({})",
            attempt.attempt, attempt.final_status, attempt.verification.message
        );
    }
    let last = outcome.final_attempt();
    println!("problem: {}", outcome.problem_id);
    println!("category: {}", outcome.record.category);
    println!("credential: {}", outcome.credential);
    println!("status: {}", last.final_status);
    println!();
    println!("{}", last.proposed_solution.trim());
}

fn cmd_verify(paths: &SolverPaths, script: &str) -> Result<i32> {
    let config = load_config(&paths.config_path)?;
    let code = if script == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("read script from stdin")?;
        buf
    } else {
        fs::read_to_string(script).with_context(|| format!("read {script}"))?
    };
    let outcome = run_verification_with(&code, &config.script);
    print_json(&outcome)?;
    Ok(if outcome.symbolic_passed {
        exit_codes::OK
    } else {
        exit_codes::MISMATCH
    })
}

fn cmd_show(paths: &SolverPaths, id: &str) -> Result<i32> {
    let stored = RecordStore::new(&paths.records_dir).load(id)?;
    print_json(&stored)?;
    Ok(exit_codes::OK)
}

fn cmd_list(paths: &SolverPaths) -> Result<i32> {
    let (records, warnings) = RecordStore::new(&paths.records_dir).list()?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    for record in &records {
        println!(
            "{}\t{}\t{}\t{}",
            record.id,
            record.verification_status,
            record.category,
            first_line(&record.prompt)
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_report(paths: &SolverPaths, json: bool) -> Result<i32> {
    let (records, warnings) = RecordStore::new(&paths.records_dir).list()?;
    for warning in &warnings {
        eprintln!("warning: {warning}");
    }
    let report = aggregate(&records);
    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    Ok(exit_codes::OK)
}

fn print_report(report: &AnalyticsReport) {
    println!("problems: {}", report.total_problems);
    println!("verified: {:.1}%", report.verified_rate);
    for stats in &report.categories {
        println!();
        println!("{} ({} problems)", stats.category, stats.total);
        println!("  avg attempts: {:.2}", stats.avg_attempts);
        println!("  hallucination rate: {:.1}%", stats.hallucination_rate);
        for status in FinalStatus::ALL {
            println!(
                "  {status}: {} ({:.1}%)",
                stats.count(status),
                stats.share(status)
            );
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

/// Print `value` as pretty JSON to stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["solver", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false }));
        assert_eq!(cli.data_dir, PathBuf::from(".solver"));
    }

    #[test]
    fn parse_solve_with_data_dir() {
        let cli = Cli::parse_from(["solver", "solve", "Integrate x", "--data-dir", "/tmp/d"]);
        assert!(matches!(cli.command, Command::Solve { ref query, json: false } if query == "Integrate x"));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/d"));
    }

    #[test]
    fn verify_defaults_to_stdin() {
        let cli = Cli::parse_from(["solver", "verify"]);
        assert!(matches!(cli.command, Command::Verify { ref script } if script == "-"));
    }
}

mod cli;
mod problems;
mod report;
mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "batch", version, about = "Batch driver for the solver HTTP API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the problem list.
    List {
        #[arg(long, default_value = "batch/problems.toml")]
        problems: PathBuf,
    },
    /// Submit every problem to `POST /api/solve`, one at a time.
    Run {
        #[arg(long, default_value = "batch/problems.toml")]
        problems: PathBuf,
        /// Base URL of a running solver-web.
        #[arg(long, default_value = "http://127.0.0.1:3001")]
        url: String,
        /// Pause between requests to stay under upstream rate limits.
        #[arg(long, default_value_t = 4)]
        delay_secs: u64,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value = "batch/results")]
        results_dir: PathBuf,
    },
    /// Summarize a results file.
    Report { file: PathBuf },
}

fn main() -> Result<()> {
    solver::logging::init_with("warn,batch=info");
    let cli = Cli::parse();
    match cli.command {
        Command::List { problems } => cli::list_problems(&problems),
        Command::Run {
            problems,
            url,
            delay_secs,
            limit,
            results_dir,
        } => cli::run_problems(&problems, &results_dir, &url, delay_secs, limit),
        Command::Report { file } => cli::report_results(&file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::parse_from(["batch", "run"]);
        let Command::Run {
            problems,
            url,
            delay_secs,
            limit,
            results_dir,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(problems, PathBuf::from("batch/problems.toml"));
        assert_eq!(url, "http://127.0.0.1:3001");
        assert_eq!(delay_secs, 4);
        assert_eq!(limit, None);
        assert_eq!(results_dir, PathBuf::from("batch/results"));
    }

    #[test]
    fn report_takes_a_file() {
        let cli = Cli::parse_from(["batch", "report", "batch/results/x.jsonl"]);
        assert!(matches!(cli.command, Command::Report { ref file } if file == &PathBuf::from("batch/results/x.jsonl")));
    }
}

//! CLI command implementations.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::info;

use crate::problems::ProblemFile;
use crate::report::aggregate;
use crate::run::{HttpEndpoint, RunOptions, new_run_id, results_path, run_batch};

/// Print every problem in the list.
pub fn list_problems(problems_path: &Path) -> Result<()> {
    let file = ProblemFile::load(problems_path)?;
    for problem in &file.problems {
        println!("{}\t{}\t{}", problem.id, problem.domain, problem.query);
    }
    Ok(())
}

/// Submit the problem list to a running solver-web instance.
pub fn run_problems(
    problems_path: &Path,
    results_dir: &Path,
    url: &str,
    delay_secs: u64,
    limit: Option<usize>,
) -> Result<()> {
    let file = ProblemFile::load(problems_path)?;
    if limit == Some(0) {
        bail!("--limit must be > 0");
    }
    let run_id = new_run_id();
    let results_file = results_path(results_dir, &run_id);
    let total = limit.map_or(file.problems.len(), |n| n.min(file.problems.len()));
    info!(run_id = %run_id, url, total, "starting batch");
    println!("Starting batch {run_id}: {total} problems against {url}");

    let endpoint = HttpEndpoint::new(url);
    let options = RunOptions {
        delay: Duration::from_secs(delay_secs),
        limit,
    };
    let results = run_batch(&endpoint, &file.problems, &options, &results_file)?;
    let succeeded = results.iter().filter(|r| r.succeeded()).count();
    println!(
        "run: id={} succeeded={}/{} results={}",
        run_id,
        succeeded,
        results.len(),
        results_file.display()
    );
    Ok(())
}

/// Summarize a results file.
pub fn report_results(results_file: &Path) -> Result<()> {
    let (summary, warnings) = aggregate(results_file)?;
    println!(
        "report: problems={} http_success={} http_failure={}",
        summary.problems, summary.http_success, summary.http_failure
    );
    if let Some(avg) = summary.avg_duration_secs {
        println!("report: avg_duration_secs={avg:.2}");
    }
    for (status, count) in &summary.statuses {
        println!("report: status {status} {count}");
    }
    for (domain, (succeeded, total)) in &summary.domains {
        println!("report: domain {domain} {succeeded}/{total}");
    }
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

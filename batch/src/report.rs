//! Summaries of batch results files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use solver::core::types::FinalStatus;

use crate::run::BatchResult;

#[derive(Debug, Default, PartialEq)]
pub struct ReportSummary {
    pub problems: usize,
    pub http_success: usize,
    pub http_failure: usize,
    pub statuses: BTreeMap<FinalStatus, usize>,
    pub avg_duration_secs: Option<f64>,
    /// Problems per domain as `(succeeded, total)`.
    pub domains: BTreeMap<String, (usize, usize)>,
}

/// Aggregate a JSONL results file. Unparsable lines become warnings.
pub fn aggregate(results_file: &Path) -> Result<(ReportSummary, Vec<String>)> {
    let contents = fs::read_to_string(results_file)
        .with_context(|| format!("read {}", results_file.display()))?;
    let mut summary = ReportSummary::default();
    let mut warnings = Vec::new();
    let mut total_duration = 0.0;

    for (number, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let result: BatchResult = match serde_json::from_str(line) {
            Ok(result) => result,
            Err(err) => {
                warnings.push(format!("skip line {}: {err}", number + 1));
                continue;
            }
        };
        summary.problems += 1;
        total_duration += result.duration_secs;
        let domain = summary.domains.entry(result.domain.clone()).or_insert((0, 0));
        domain.1 += 1;
        if result.succeeded() {
            summary.http_success += 1;
            domain.0 += 1;
        } else {
            summary.http_failure += 1;
        }
        if let Some(status) = result.final_status {
            *summary.statuses.entry(status).or_insert(0) += 1;
        }
    }

    if summary.problems > 0 {
        summary.avg_duration_secs = Some(total_duration / summary.problems as f64);
    }
    Ok((summary, warnings))
}

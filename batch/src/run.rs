//! Sequential submission of problems to the solve endpoint.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solver::core::types::FinalStatus;
use tracing::{info, instrument, warn};

use crate::problems::Problem;

/// Reply from one solve request.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveReply {
    /// HTTP response with its status and JSON body (`Null` if unparsable).
    Response { status: u16, body: Value },
    /// Connection-level failure.
    Transport(String),
}

pub trait SolveEndpoint {
    fn solve(&self, query: &str) -> SolveReply;
}

/// `POST {base_url}/api/solve` over blocking HTTP.
pub struct HttpEndpoint {
    agent: ureq::Agent,
    url: String,
}

impl HttpEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
            url: format!("{}/api/solve", base_url.trim_end_matches('/')),
        }
    }
}

impl SolveEndpoint for HttpEndpoint {
    fn solve(&self, query: &str) -> SolveReply {
        let response = self
            .agent
            .post(&self.url)
            .send_json(serde_json::json!({ "query": query }));
        match response {
            Ok(response) => SolveReply::Response {
                status: response.status(),
                body: response.into_json().unwrap_or(Value::Null),
            },
            Err(ureq::Error::Status(status, response)) => SolveReply::Response {
                status,
                body: response.into_json().unwrap_or(Value::Null),
            },
            Err(ureq::Error::Transport(err)) => SolveReply::Transport(err.to_string()),
        }
    }
}

/// One line of a results file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub index: usize,
    pub id: String,
    pub domain: String,
    pub http_status: Option<u16>,
    pub problem_id: Option<String>,
    pub final_status: Option<FinalStatus>,
    pub attempts: Option<usize>,
    pub duration_secs: f64,
    pub error: Option<String>,
}

impl BatchResult {
    pub fn succeeded(&self) -> bool {
        self.http_status == Some(200)
    }

    fn from_reply(index: usize, problem: &Problem, reply: SolveReply, elapsed: Duration) -> Self {
        let mut result = BatchResult {
            index,
            id: problem.id.clone(),
            domain: problem.domain.clone(),
            http_status: None,
            problem_id: None,
            final_status: None,
            attempts: None,
            duration_secs: elapsed.as_millis() as f64 / 1000.0,
            error: None,
        };
        match reply {
            SolveReply::Response { status, body } => {
                result.http_status = Some(status);
                if status == 200 {
                    result.problem_id = body["problem_id"].as_str().map(str::to_string);
                    result.final_status =
                        serde_json::from_value(body["final"]["final_status"].clone()).ok();
                    result.attempts = body["history"].as_array().map(Vec::len);
                } else {
                    result.error = Some(
                        body["error"]
                            .as_str()
                            .map_or_else(|| format!("http {status}"), str::to_string),
                    );
                }
            }
            SolveReply::Transport(err) => result.error = Some(err),
        }
        result
    }
}

/// Batch run parameters.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pause between consecutive requests.
    pub delay: Duration,
    pub limit: Option<usize>,
}

pub fn new_run_id() -> String {
    format!("batch-{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

pub fn results_path(results_dir: &Path, run_id: &str) -> PathBuf {
    results_dir.join(format!("{run_id}.jsonl"))
}

/// Submit each problem in order, appending one JSON line per problem to
/// `results_file`. Failed requests are recorded and the run continues.
#[instrument(skip_all, fields(problems = problems.len(), results = %results_file.display()))]
pub fn run_batch(
    endpoint: &impl SolveEndpoint,
    problems: &[Problem],
    options: &RunOptions,
    results_file: &Path,
) -> Result<Vec<BatchResult>> {
    if let Some(parent) = results_file.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(results_file)
        .with_context(|| format!("open {}", results_file.display()))?;

    let selected = &problems[..options.limit.unwrap_or(problems.len()).min(problems.len())];
    let total = selected.len();
    let mut results = Vec::with_capacity(total);
    for (offset, problem) in selected.iter().enumerate() {
        let index = offset + 1;
        println!("[{index}/{total}] Solving: {}...", preview(&problem.query, 40));

        let started = Instant::now();
        let reply = endpoint.solve(&problem.query);
        let result = BatchResult::from_reply(index, problem, reply, started.elapsed());
        match (&result.final_status, &result.error) {
            (Some(status), _) => println!("  ok {status} ({:.2}s)", result.duration_secs),
            (None, Some(err)) => {
                warn!(id = %problem.id, error = %err, "problem failed");
                println!("  failed: {err}");
            }
            (None, None) => println!("  ok ({:.2}s)", result.duration_secs),
        }

        let line = serde_json::to_string(&result).context("serialize result")?;
        writeln!(out, "{line}").with_context(|| format!("write {}", results_file.display()))?;
        results.push(result);

        if index < total && !options.delay.is_zero() {
            std::thread::sleep(options.delay);
        }
    }
    info!(total, "batch finished");
    Ok(results)
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    struct FakeEndpoint {
        replies: RefCell<Vec<SolveReply>>,
        queries: RefCell<Vec<String>>,
    }

    impl FakeEndpoint {
        fn new(mut replies: Vec<SolveReply>) -> Self {
            replies.reverse();
            Self {
                replies: RefCell::new(replies),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl SolveEndpoint for FakeEndpoint {
        fn solve(&self, query: &str) -> SolveReply {
            self.queries.borrow_mut().push(query.to_string());
            self.replies
                .borrow_mut()
                .pop()
                .unwrap_or_else(|| SolveReply::Transport("no reply".to_string()))
        }
    }

    fn problem(id: &str) -> Problem {
        Problem {
            id: id.to_string(),
            domain: "Calculus".to_string(),
            query: format!("query {id}"),
        }
    }

    fn options(limit: Option<usize>) -> RunOptions {
        RunOptions {
            delay: Duration::ZERO,
            limit,
        }
    }

    #[test]
    fn records_success_and_failure_lines() {
        let temp = tempdir().expect("tempdir");
        let file = results_path(&temp.path().join("results"), "batch-test");
        let endpoint = FakeEndpoint::new(vec![
            SolveReply::Response {
                status: 200,
                body: json!({
                    "problem_id": "p-1",
                    "final": {"final_status": "VERIFIED"},
                    "history": [{}]
                }),
            },
            SolveReply::Response {
                status: 502,
                body: json!({"error": "Error processing query: all 3 credential sets failed"}),
            },
            SolveReply::Transport("connection refused".to_string()),
        ]);
        let problems = [problem("a"), problem("b"), problem("c")];

        let results = run_batch(&endpoint, &problems, &options(None), &file).expect("run");
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].final_status, Some(FinalStatus::Verified));
        assert_eq!(results[0].attempts, Some(1));
        assert_eq!(results[0].problem_id.as_deref(), Some("p-1"));
        assert!(results[1].error.as_deref().is_some_and(|e| e.contains("credential sets")));
        assert_eq!(results[2].http_status, None);

        let lines: Vec<BatchResult> = fs::read_to_string(&file)
            .expect("read")
            .lines()
            .map(|line| serde_json::from_str(line).expect("line"))
            .collect();
        assert_eq!(lines, results);
    }

    #[test]
    fn limit_caps_submissions() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("out.jsonl");
        let endpoint = FakeEndpoint::new(Vec::new());
        let problems = [problem("a"), problem("b"), problem("c")];

        let results = run_batch(&endpoint, &problems, &options(Some(2)), &file).expect("run");
        assert_eq!(results.len(), 2);
        assert_eq!(*endpoint.queries.borrow(), ["query a", "query b"]);
    }

    #[test]
    fn run_id_format() {
        let id = new_run_id();
        assert!(id.starts_with("batch-"));
        assert_eq!(
            results_path(Path::new("/tmp/r"), &id),
            PathBuf::from(format!("/tmp/r/{id}.jsonl"))
        );
    }
}

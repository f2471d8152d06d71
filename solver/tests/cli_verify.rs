//! CLI tests: spawn the solver binary and check exit codes and output.

use std::io::Write;
use std::process::{Command, Stdio};

use solver::core::script::VerificationOutcome;
use solver::core::types::FinalStatus;
use solver::exit_codes;
use solver::io::store::RecordStore;
use solver::test_support::{attempt, history, initialized_data_dir};

fn solver() -> Command {
    Command::new(env!("CARGO_BIN_EXE_solver"))
}

fn verify_stdin(data_dir: &std::path::Path, script: &str) -> (Option<i32>, VerificationOutcome) {
    let mut child = solver()
        .arg("--data-dir")
        .arg(data_dir)
        .arg("verify")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("spawn solver verify");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(script.as_bytes())
        .expect("write script");
    let output = child.wait_with_output().expect("wait");
    let outcome = serde_json::from_slice(&output.stdout).expect("outcome json");
    (output.status.code(), outcome)
}

#[test]
fn verify_passing_script_exits_ok() {
    let (_temp, paths) = initialized_data_dir();
    let (code, outcome) = verify_stdin(
        &paths.data_dir,
        "x = sp.Symbol('x')\nis_correct = sp.diff(sp.sin(x), x) == sp.cos(x)\n",
    );
    assert_eq!(code, Some(exit_codes::OK));
    assert!(outcome.symbolic_passed);
}

#[test]
fn verify_failing_script_exits_mismatch() {
    let (_temp, paths) = initialized_data_dir();
    let (code, outcome) = verify_stdin(&paths.data_dir, "is_correct = 1 + 1 == 3\n");
    assert_eq!(code, Some(exit_codes::MISMATCH));
    assert!(!outcome.symbolic_passed);
    assert!(!outcome.is_execution_error);
}

#[test]
fn verify_reads_script_from_file() {
    let (temp, paths) = initialized_data_dir();
    let script = temp.path().join("check.py");
    std::fs::write(&script, "import os\n").expect("write script");
    let output = solver()
        .arg("--data-dir")
        .arg(&paths.data_dir)
        .arg("verify")
        .arg(&script)
        .output()
        .expect("run solver verify");
    assert_eq!(output.status.code(), Some(exit_codes::MISMATCH));
    let outcome: VerificationOutcome = serde_json::from_slice(&output.stdout).expect("json");
    assert!(outcome.is_execution_error);
}

#[test]
fn solve_rejects_empty_query() {
    let (_temp, paths) = initialized_data_dir();
    let output = solver()
        .arg("--data-dir")
        .arg(&paths.data_dir)
        .arg("solve")
        .arg("   ")
        .env("GROQ_API_KEY1", "unused")
        .output()
        .expect("run solver solve");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Query cannot be empty"));
}

#[test]
fn list_show_and_report_read_saved_records() {
    let (_temp, paths) = initialized_data_dir();
    let store = RecordStore::new(&paths.records_dir);
    let record = store
        .save(
            "Find the beam reaction.",
            &history(vec![attempt(1, FinalStatus::SemanticOnlyPass)]),
            "GROQ_API_KEY1",
        )
        .expect("save");

    let list = solver()
        .arg("--data-dir")
        .arg(&paths.data_dir)
        .arg("list")
        .output()
        .expect("run solver list");
    assert_eq!(list.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&list.stdout);
    assert!(stdout.contains(&record.id));
    assert!(stdout.contains("SEMANTIC_ONLY_PASS"));

    let show = solver()
        .arg("--data-dir")
        .arg(&paths.data_dir)
        .args(["show", &record.id])
        .output()
        .expect("run solver show");
    assert_eq!(show.status.code(), Some(exit_codes::OK));
    let shown: serde_json::Value = serde_json::from_slice(&show.stdout).expect("json");
    assert_eq!(shown["record"]["id"], record.id.as_str());
    assert_eq!(shown["attempts"].as_array().map(Vec::len), Some(1));

    let report = solver()
        .arg("--data-dir")
        .arg(&paths.data_dir)
        .args(["report", "--json"])
        .output()
        .expect("run solver report");
    let report: serde_json::Value = serde_json::from_slice(&report.stdout).expect("json");
    assert_eq!(report["total_problems"], 1);
    assert_eq!(report["categories"][0]["category"], "Calculus");
    assert_eq!(report["categories"][0]["hallucination_rate"], 100.0);
}

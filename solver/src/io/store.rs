//! On-disk record store under `<data-dir>/records/`.
//!
//! Layout: `records/<problem-id>/problem.json` plus one
//! `records/<problem-id>/attempts/<n>.json` per attempt. Attempts are written
//! first so a listed problem always has its attempts on disk.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::core::types::{AttemptRecord, AuditHistory, ProblemRecord, record_category};

const PROBLEM_FILE: &str = "problem.json";
const ATTEMPTS_DIR: &str = "attempts";

/// A parent record with its attempts, ordered by attempt number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredProblem {
    pub record: ProblemRecord,
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    records_dir: PathBuf,
}

/// SHA-256 hex digest of a query.
pub fn query_hash(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

/// Reject ids that could escape the records directory.
pub fn validate_id(id: &str) -> Result<()> {
    if id.is_empty()
        || id == "."
        || id.contains("..")
        || id.contains('/')
        || id.contains('\\')
        || id.chars().any(char::is_control)
    {
        bail!("invalid problem id {id:?}");
    }
    Ok(())
}

impl RecordStore {
    pub fn new(records_dir: impl Into<PathBuf>) -> Self {
        Self {
            records_dir: records_dir.into(),
        }
    }

    /// Persist a finished run; the final attempt is authoritative.
    pub fn save(
        &self,
        query: &str,
        history: &AuditHistory,
        credential: &str,
    ) -> Result<ProblemRecord> {
        self.save_at(query, history, credential, Utc::now())
    }

    #[instrument(skip_all, fields(attempts = history.len(), credential = %credential))]
    pub fn save_at(
        &self,
        query: &str,
        history: &AuditHistory,
        credential: &str,
        now: DateTime<Utc>,
    ) -> Result<ProblemRecord> {
        let hash = query_hash(query);
        let (id, problem_dir) = self.claim_dir(&hash, now)?;
        let created_at = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let last = history.final_attempt();

        let attempts_dir = problem_dir.join(ATTEMPTS_DIR);
        fs::create_dir_all(&attempts_dir)
            .with_context(|| format!("create {}", attempts_dir.display()))?;
        for attempt in history.attempts() {
            let record = AttemptRecord::from_attempt(&id, attempt, &created_at);
            write_json(
                &attempts_dir.join(format!("{}.json", attempt.attempt)),
                &record,
            )?;
        }

        let record = ProblemRecord {
            id: id.clone(),
            prompt: query.to_string(),
            query_hash: hash,
            category: record_category(&last.audit.category),
            final_solution: last.proposed_solution.clone(),
            verification_status: last.final_status,
            total_attempts: u32::try_from(history.len()).unwrap_or(u32::MAX),
            credential: credential.to_string(),
            created_at,
        };
        write_json(&problem_dir.join(PROBLEM_FILE), &record)?;
        info!(problem_id = %id, status = %record.verification_status, "saved problem record");
        Ok(record)
    }

    /// Create a fresh problem directory, suffixing the id on collision.
    fn claim_dir(&self, hash: &str, now: DateTime<Utc>) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.records_dir)
            .with_context(|| format!("create {}", self.records_dir.display()))?;
        let base = format!("p-{}-{}", now.format("%Y%m%dT%H%M%SZ"), &hash[..8]);
        for n in 1..=1000u32 {
            let id = if n == 1 {
                base.clone()
            } else {
                format!("{base}-{n}")
            };
            let dir = self.records_dir.join(&id);
            match fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    debug!(problem_id = %id, "problem id taken, trying next suffix");
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("create {}", dir.display()));
                }
            }
        }
        Err(anyhow!("could not allocate a problem id for {base}"))
    }

    /// All readable problem records, sorted by id, plus warnings for entries
    /// that could not be read.
    pub fn list(&self) -> Result<(Vec<ProblemRecord>, Vec<String>)> {
        let mut records = Vec::new();
        let mut warnings = Vec::new();
        if !self.records_dir.exists() {
            return Ok((records, warnings));
        }
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.records_dir)
            .with_context(|| format!("read {}", self.records_dir.display()))?
        {
            let entry = entry.context("read entry")?;
            if entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        for dir in dirs {
            match read_json::<ProblemRecord>(&dir.join(PROBLEM_FILE)) {
                Ok(record) => records.push(record),
                Err(err) => warnings.push(format!("skip {}: {err:#}", dir.display())),
            }
        }
        Ok((records, warnings))
    }

    pub fn load(&self, id: &str) -> Result<StoredProblem> {
        validate_id(id)?;
        let dir = self.records_dir.join(id);
        if !dir.is_dir() {
            bail!("problem {id} not found");
        }
        let record: ProblemRecord = read_json(&dir.join(PROBLEM_FILE))?;
        let attempts_dir = dir.join(ATTEMPTS_DIR);
        let mut attempts = Vec::new();
        if attempts_dir.exists() {
            for entry in fs::read_dir(&attempts_dir)
                .with_context(|| format!("read {}", attempts_dir.display()))?
            {
                let path = entry.context("read entry")?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    attempts.push(read_json::<AttemptRecord>(&path)?);
                }
            }
        }
        attempts.sort_by_key(|a| a.attempt);
        Ok(StoredProblem { record, attempts })
    }
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::FinalStatus;
    use crate::test_support::{attempt, history};
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26)
            .single()
            .expect("valid time")
    }

    #[test]
    fn save_list_load_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path().join("records"));
        let runs = history(vec![
            attempt(1, FinalStatus::BothFailure),
            attempt(2, FinalStatus::Verified),
        ]);

        let record = store
            .save_at("Integrate x dx", &runs, "GROQ_API_KEY2", fixed_now())
            .expect("save");
        assert!(record.id.starts_with("p-20260314T150926Z-"));
        assert_eq!(record.query_hash, query_hash("Integrate x dx"));
        assert_eq!(record.verification_status, FinalStatus::Verified);
        assert_eq!(record.total_attempts, 2);
        assert_eq!(record.created_at, "2026-03-14T15:09:26Z");

        let (listed, warnings) = store.list().expect("list");
        assert!(warnings.is_empty());
        assert_eq!(listed, vec![record.clone()]);

        let stored = store.load(&record.id).expect("load");
        assert_eq!(stored.record, record);
        let numbers: Vec<u32> = stored.attempts.iter().map(|a| a.attempt).collect();
        assert_eq!(numbers, [1, 2]);
        assert_eq!(stored.attempts[0].final_status, FinalStatus::BothFailure);
    }

    #[test]
    fn colliding_ids_get_a_suffix() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path());
        let runs = history(vec![attempt(1, FinalStatus::Verified)]);
        let first = store.save_at("q", &runs, "K", fixed_now()).expect("first");
        let second = store.save_at("q", &runs, "K", fixed_now()).expect("second");
        assert_eq!(second.id, format!("{}-2", first.id));
    }

    #[test]
    fn blank_category_is_recorded_as_general() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path());
        let mut only = attempt(1, FinalStatus::SemanticOnlyPass);
        only.audit.category = String::new();
        let record = store
            .save_at("q", &history(vec![only]), "K", fixed_now())
            .expect("save");
        assert_eq!(record.category, "General");
    }

    #[test]
    fn unreadable_entries_become_warnings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path());
        fs::create_dir_all(temp.path().join("p-broken")).expect("mkdir");
        fs::write(temp.path().join("p-broken").join(PROBLEM_FILE), "{").expect("write");
        let (records, warnings) = store.list().expect("list");
        assert!(records.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn ids_cannot_escape_the_store() {
        for id in ["", "..", "../etc", "a/b", "a\\b"] {
            assert!(validate_id(id).is_err(), "{id}");
        }
        validate_id("p-20260314T150926Z-deadbeef").expect("valid id");

        let temp = tempfile::tempdir().expect("tempdir");
        let store = RecordStore::new(temp.path());
        assert!(store.load("../outside").is_err());
        assert!(store.load("p-missing").is_err());
    }
}

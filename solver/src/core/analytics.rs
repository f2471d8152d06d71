//! Aggregate statistics over persisted problem records.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::types::{FinalStatus, ProblemRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub total_problems: usize,
    /// Percentage of all problems whose final status is `VERIFIED`.
    pub verified_rate: f64,
    /// Sorted by category name.
    pub categories: Vec<CategoryStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub category: String,
    pub total: usize,
    pub counts: BTreeMap<FinalStatus, usize>,
    pub avg_attempts: f64,
    /// Share of problems that only the Skeptic accepted, in percent.
    pub hallucination_rate: f64,
    /// Per-status share in percent, rounded to one decimal.
    pub shares: BTreeMap<FinalStatus, f64>,
}

impl CategoryStats {
    pub fn count(&self, status: FinalStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn share(&self, status: FinalStatus) -> f64 {
        self.shares.get(&status).copied().unwrap_or(0.0)
    }
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn aggregate(records: &[ProblemRecord]) -> AnalyticsReport {
    let mut by_category: BTreeMap<&str, Vec<&ProblemRecord>> = BTreeMap::new();
    for record in records {
        by_category
            .entry(record.category.as_str())
            .or_default()
            .push(record);
    }

    let categories = by_category
        .into_iter()
        .map(|(category, members)| {
            let total = members.len();
            let mut counts: BTreeMap<FinalStatus, usize> =
                FinalStatus::ALL.iter().map(|status| (*status, 0)).collect();
            for record in &members {
                *counts.entry(record.verification_status).or_insert(0) += 1;
            }
            let attempts: u64 = members.iter().map(|r| u64::from(r.total_attempts)).sum();
            let avg_attempts = if total == 0 {
                0.0
            } else {
                attempts as f64 / total as f64
            };
            let shares = counts
                .iter()
                .map(|(status, count)| (*status, round_one_decimal(percent(*count, total))))
                .collect();
            CategoryStats {
                category: category.to_string(),
                total,
                hallucination_rate: percent(
                    counts.get(&FinalStatus::SemanticOnlyPass).copied().unwrap_or(0),
                    total,
                ),
                counts,
                avg_attempts,
                shares,
            }
        })
        .collect();

    let verified = records
        .iter()
        .filter(|r| r.verification_status == FinalStatus::Verified)
        .count();

    AnalyticsReport {
        total_problems: records.len(),
        verified_rate: percent(verified, records.len()),
        categories,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, category: &str, status: FinalStatus, attempts: u32) -> ProblemRecord {
        ProblemRecord {
            id: id.to_string(),
            prompt: format!("{id} prompt"),
            query_hash: "00".repeat(32),
            category: category.to_string(),
            final_solution: String::new(),
            verification_status: status,
            total_attempts: attempts,
            credential: "GROQ_API_KEY1".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn empty_input_has_zero_rates() {
        let report = aggregate(&[]);
        assert_eq!(report.total_problems, 0);
        assert_eq!(report.verified_rate, 0.0);
        assert!(report.categories.is_empty());
    }

    #[test]
    fn per_category_counts_and_rates() {
        let records = [
            record("p1", "Thermodynamics", FinalStatus::Verified, 1),
            record("p2", "Thermodynamics", FinalStatus::SemanticOnlyPass, 2),
            record("p3", "Thermodynamics", FinalStatus::BothFailure, 2),
            record("p4", "Circuits", FinalStatus::Verified, 1),
        ];
        let report = aggregate(&records);
        assert_eq!(report.total_problems, 4);
        assert_eq!(report.verified_rate, 50.0);

        let names: Vec<&str> = report.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, ["Circuits", "Thermodynamics"]);

        let thermo = &report.categories[1];
        assert_eq!(thermo.total, 3);
        assert_eq!(thermo.count(FinalStatus::Verified), 1);
        assert_eq!(thermo.count(FinalStatus::SymbolicOnlyPass), 0);
        assert!((thermo.avg_attempts - 5.0 / 3.0).abs() < 1e-12);
        assert!((thermo.hallucination_rate - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(thermo.share(FinalStatus::BothFailure), 33.3);
        assert_eq!(thermo.share(FinalStatus::SymbolicOnlyPass), 0.0);
    }

    #[test]
    fn report_serializes_status_keys() {
        let report = aggregate(&[record("p1", "Statics", FinalStatus::Verified, 1)]);
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["categories"][0]["counts"]["VERIFIED"], 1);
        assert_eq!(json["categories"][0]["shares"]["VERIFIED"], 100.0);
    }
}

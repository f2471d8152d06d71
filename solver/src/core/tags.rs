//! Bracketed-tag protocol between the Skeptic's free text and the auditor.
//!
//! The Skeptic is asked to wrap each field in `[TAG]...[/TAG]` markers and to
//! emit a free-standing `STATUS=TRUE|FALSE` line. Extraction is a single
//! linear scan: the first opening marker wins and the region ends at the next
//! closing marker. Nesting and well-formedness are never validated.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static STATUS_PASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)STATUS=TRUE").expect("status regex should be valid"));

/// Fixed tag vocabulary understood by the auditor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Category,
    Skeptic,
    Feedback,
    Corrections,
    ErrorCategory,
    Affirmation,
}

impl Tag {
    pub const ALL: [Tag; 6] = [
        Tag::Category,
        Tag::Skeptic,
        Tag::Feedback,
        Tag::Corrections,
        Tag::ErrorCategory,
        Tag::Affirmation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Category => "CATEGORY",
            Tag::Skeptic => "SKEPTIC",
            Tag::Feedback => "FEEDBACK",
            Tag::Corrections => "CORRECTIONS",
            Tag::ErrorCategory => "ERROR_CATEGORY",
            Tag::Affirmation => "AFFIRMATION",
        }
    }

    fn open_marker(self) -> String {
        format!("[{}]", self.as_str())
    }

    fn close_marker(self) -> String {
        format!("[/{}]", self.as_str())
    }
}

/// Return the trimmed text between the first `[TAG]` and the next `[/TAG]`.
///
/// Returns an empty string when either marker is missing.
pub fn extract_tag(text: &str, tag: Tag) -> &str {
    let open = tag.open_marker();
    let Some(open_at) = text.find(&open) else {
        return "";
    };
    let body_start = open_at + open.len();
    let Some(close_rel) = text[body_start..].find(&tag.close_marker()) else {
        return "";
    };
    text[body_start..body_start + close_rel].trim()
}

/// Semantic pass: `STATUS=TRUE` appears anywhere, ignoring case.
pub fn status_passed(text: &str) -> bool {
    STATUS_PASS_RE.is_match(text)
}

/// Skeptic verdict fields; exactly one branch exists per parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Approved {
        affirmation: String,
    },
    Rejected {
        corrections: String,
        error_category: String,
    },
}

impl Verdict {
    pub fn affirmation(&self) -> &str {
        match self {
            Verdict::Approved { affirmation } => affirmation,
            Verdict::Rejected { .. } => "",
        }
    }

    pub fn corrections(&self) -> &str {
        match self {
            Verdict::Approved { .. } => "",
            Verdict::Rejected { corrections, .. } => corrections,
        }
    }

    pub fn error_category(&self) -> &str {
        match self {
            Verdict::Approved { .. } => "",
            Verdict::Rejected { error_category, .. } => error_category,
        }
    }
}

/// Fields derived from one Skeptic response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAudit {
    pub category: String,
    pub script: String,
    pub semantic_status: bool,
    pub feedback: String,
    #[serde(flatten)]
    pub verdict: Verdict,
}

/// Parse a Skeptic response into its structured fields.
pub fn parse_audit(text: &str) -> ParsedAudit {
    let semantic_status = status_passed(text);
    let verdict = if semantic_status {
        Verdict::Approved {
            affirmation: extract_tag(text, Tag::Affirmation).to_string(),
        }
    } else {
        Verdict::Rejected {
            corrections: extract_tag(text, Tag::Corrections).to_string(),
            error_category: extract_tag(text, Tag::ErrorCategory).to_string(),
        }
    };
    ParsedAudit {
        category: extract_tag(text, Tag::Category).to_string(),
        script: extract_tag(text, Tag::Skeptic).to_string(),
        semantic_status,
        feedback: extract_tag(text, Tag::Feedback).to_string(),
        verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tag_yields_empty() {
        for tag in Tag::ALL {
            assert_eq!(extract_tag("no markers at all", tag), "");
        }
    }

    #[test]
    fn unclosed_tag_yields_empty() {
        assert_eq!(extract_tag("[CATEGORY] Calculus", Tag::Category), "");
        assert_eq!(extract_tag("Calculus [/CATEGORY]", Tag::Category), "");
    }

    #[test]
    fn extracts_multiline_region_trimmed() {
        let text = "[SKEPTIC]\nx = sp.Symbol('x')\n\nis_correct = True\n  [/SKEPTIC]";
        assert_eq!(
            extract_tag(text, Tag::Skeptic),
            "x = sp.Symbol('x')\n\nis_correct = True"
        );
    }

    #[test]
    fn first_open_marker_wins() {
        let text = "[FEEDBACK] one [/FEEDBACK] [FEEDBACK] two [/FEEDBACK]";
        assert_eq!(extract_tag(text, Tag::Feedback), "one");
    }

    #[test]
    fn category_does_not_match_error_category() {
        let text = "[ERROR_CATEGORY]Sign Error[/ERROR_CATEGORY]";
        assert_eq!(extract_tag(text, Tag::Category), "");
        assert_eq!(extract_tag(text, Tag::ErrorCategory), "Sign Error");
    }

    #[test]
    fn status_detection_is_case_insensitive_substring() {
        assert!(status_passed("STATUS=TRUE"));
        assert!(status_passed("blah\nstatus=true # my analysis"));
        assert!(!status_passed("STATUS=FALSE"));
        assert!(!status_passed("STATUS=CORRECT"));
        assert!(!status_passed("STATUS = TRUE"));
    }

    #[test]
    fn parse_populates_rejected_branch_only() {
        let text = "[CATEGORY]Thermodynamics[/CATEGORY]\n\
                    [SKEPTIC]is_correct = False[/SKEPTIC]\n\
                    [FEEDBACK]Sign slip.[/FEEDBACK]\n\
                    STATUS=FALSE\n\
                    [CORRECTIONS]Flip the sign.[/CORRECTIONS]\n\
                    [ERROR_CATEGORY]Algebra Error[/ERROR_CATEGORY]\n\
                    [AFFIRMATION]ignored[/AFFIRMATION]";
        let parsed = parse_audit(text);
        assert_eq!(parsed.category, "Thermodynamics");
        assert_eq!(parsed.script, "is_correct = False");
        assert!(!parsed.semantic_status);
        assert_eq!(parsed.feedback, "Sign slip.");
        assert_eq!(
            parsed.verdict,
            Verdict::Rejected {
                corrections: "Flip the sign.".to_string(),
                error_category: "Algebra Error".to_string(),
            }
        );
        assert_eq!(parsed.verdict.affirmation(), "");
    }

    #[test]
    fn parse_populates_approved_branch_only() {
        let text = "STATUS=TRUE\n[AFFIRMATION]All steps hold.[/AFFIRMATION]\n\
                    [CORRECTIONS]ignored[/CORRECTIONS]";
        let parsed = parse_audit(text);
        assert!(parsed.semantic_status);
        assert_eq!(
            parsed.verdict,
            Verdict::Approved {
                affirmation: "All steps hold.".to_string()
            }
        );
        assert_eq!(parsed.verdict.corrections(), "");
        assert_eq!(parsed.category, "");
    }
}

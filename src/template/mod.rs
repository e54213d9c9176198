
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::document::{Document, Heading};

/// The recurring document shapes the corpus knows about.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateKind {
    /// Learnings extracted from a pull request review.
    PrNotes,
    /// A code comparison with `Before` and `After` sections.
    BeforeAfter,
    /// A reusable pattern write-up.
    PatternGuide,
    /// A problem post-mortem.
    ProblemSolution,
    /// No template markers recognized.
    #[default]
    Unknown,
}

impl TemplateKind {
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrNotes => "pr-notes",
            Self::BeforeAfter => "before-after",
            Self::PatternGuide => "pattern-guide",
            Self::ProblemSolution => "problem-solution",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TemplateKind {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a CLI filter names a template kind that does not
/// exist.
#[derive(Error, Debug)]
#[error(
    "unknown template kind `{0}`, expected one of: pr-notes, before-after, pattern-guide, problem-solution, unknown"
)]
pub struct ParseTemplateKindError(String);

impl FromStr for TemplateKind {
    type Err = ParseTemplateKindError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pr-notes" => Ok(Self::PrNotes),
            "before-after" => Ok(Self::BeforeAfter),
            "pattern-guide" => Ok(Self::PatternGuide),
            "problem-solution" => Ok(Self::ProblemSolution),
            "unknown" => Ok(Self::Unknown),
            other => Err(ParseTemplateKindError(other.to_string())),
        }
    }
}

/// One row of the classification table.
struct TemplateRule {
    kind: TemplateKind,
    matches: fn(&[Heading]) -> bool,
    required: &'static [&'static str],
}

const NO_SECTIONS: &[&str] = &[];

/// Classification rules in priority order. The first rule whose predicate
/// matches decides the template kind.
const RULES: [TemplateRule; 4] = [
    TemplateRule {
        kind: TemplateKind::BeforeAfter,
        matches: matches_before_after,
        required: &["Before", "After"],
    },
    TemplateRule {
        kind: TemplateKind::ProblemSolution,
        matches: matches_problem_solution,
        required: &["Problem Description", "Root Cause", "Solution"],
    },
    TemplateRule {
        kind: TemplateKind::PatternGuide,
        matches: matches_pattern_guide,
        required: &["Pattern Name", "When to Use", "Implementation"],
    },
    TemplateRule {
        kind: TemplateKind::PrNotes,
        matches: matches_pr_notes,
        required: &["TL;DR", "Issues & Fixes"],
    },
];

/// Determines which template a heading outline follows.
#[inline]
#[must_use]
pub fn classify(headings: &[Heading]) -> TemplateKind {
    RULES
        .iter()
        .find(|rule| (rule.matches)(headings))
        .map_or(TemplateKind::Unknown, |rule| rule.kind)
}

/// Sections a template requires, empty for [`TemplateKind::Unknown`].
#[inline]
#[must_use]
pub fn required_sections(kind: TemplateKind) -> &'static [&'static str] {
    RULES
        .iter()
        .find(|rule| rule.kind == kind)
        .map_or(NO_SECTIONS, |rule| rule.required)
}

/// Classifies every document and reports missing required sections.
///
/// Assigns `template_kind` on each document as a side effect so later stages
/// and the persisted metadata see the final value.
#[inline]
pub fn check(documents: &mut [Document]) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for document in documents.iter_mut() {
        let kind = classify(&document.headings);
        document.template_kind = kind;

        for section in required_sections(kind) {
            if !has_heading(&document.headings, &normalize(section)) {
                diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::TemplateMismatch,
                    document.path.clone(),
                    format!(
                        "document follows the `{kind}` template but is missing the `{section}` section"
                    ),
                ));
            }
        }
    }
    diagnostics
}

/// Heading comparison key: trimmed, lowercased, trailing colon dropped.
fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(':')
        .trim_end()
        .to_lowercase()
}

fn has_heading(headings: &[Heading], normalized: &str) -> bool {
    headings
        .iter()
        .any(|heading| normalize(&heading.text) == normalized)
}

/// `Before` and `After` only count as a comparison pair at the same level;
/// a stray `## Before` answered by `### After` is something else.
fn matches_before_after(headings: &[Heading]) -> bool {
    headings
        .iter()
        .filter(|h| normalize(&h.text) == "before")
        .any(|before| {
            headings
                .iter()
                .any(|after| after.level == before.level && normalize(&after.text) == "after")
        })
}

fn matches_problem_solution(headings: &[Heading]) -> bool {
    has_heading(headings, "problem description") || has_heading(headings, "root cause")
}

fn matches_pattern_guide(headings: &[Heading]) -> bool {
    has_heading(headings, "pattern name") || has_heading(headings, "when to use")
}

fn matches_pr_notes(headings: &[Heading]) -> bool {
    has_heading(headings, "issues & fixes") || has_heading(headings, "tl;dr")
}

use std::fmt::Write as _;

use console::style;
use serde::{Deserialize, Serialize};

/// How serious a diagnostic is.
///
/// Errors cause the process to exit non-zero; warnings are advisory and do
/// not affect the exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// The category of problem a diagnostic describes.
///
/// The variant order here is the tie-break order used when two diagnostics
/// share a path and line, so it is part of the stable output contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticKind {
    /// An internal link whose target is not a document in the corpus.
    BrokenLink,
    /// A document no other document links to.
    OrphanDocument,
    /// A recognized template missing one of its required sections.
    TemplateMismatch,
    /// Two documents in the same category sharing a title.
    DuplicateTitle,
    /// Malformed or unreadable source recovered with fallback values.
    ParseWarning,
}

impl DiagnosticKind {
    /// Short identifier used in terminal output, e.g. `error[broken-link]`.
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BrokenLink => "broken-link",
            Self::OrphanDocument => "orphan-document",
            Self::TemplateMismatch => "template-mismatch",
            Self::DuplicateTitle => "duplicate-title",
            Self::ParseWarning => "parse-warning",
        }
    }
}

/// A single integrity finding attached to one document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Corpus-relative path of the document the finding concerns.
    pub path: String,
    /// One-based line number when the finding points at a specific line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    /// Creates an error-severity diagnostic.
    #[inline]
    pub fn error(kind: DiagnosticKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            path: path.into(),
            line: None,
            message: message.into(),
        }
    }

    /// Creates a warning-severity diagnostic.
    #[inline]
    pub fn warning(
        kind: DiagnosticKind,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            path: path.into(),
            line: None,
            message: message.into(),
        }
    }

    /// Attaches a one-based line number.
    #[inline]
    #[must_use]
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

/// Sorts diagnostics into the stable report order: path, then line (entries
/// without a line first), then kind.
#[inline]
pub fn sort(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        (a.path.as_str(), a.line, a.kind).cmp(&(b.path.as_str(), b.line, b.kind))
    });
}

/// Returns true when any diagnostic has error severity.
#[inline]
#[must_use]
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics
        .iter()
        .any(|d| d.severity == Severity::Error)
}

/// Counts (errors, warnings) in one pass.
#[inline]
#[must_use]
pub fn count(diagnostics: &[Diagnostic]) -> (usize, usize) {
    let errors = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .count();
    (errors, diagnostics.len() - errors)
}

/// Renders a sorted diagnostic list for the terminal.
///
/// One line per diagnostic in the `path:line: severity[kind]: message` shape,
/// followed by a blank line and a summary count. Returns an empty string when
/// there is nothing to report so callers can skip printing entirely.
#[inline]
#[must_use]
pub fn render_report(diagnostics: &[Diagnostic]) -> String {
    if diagnostics.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    for diagnostic in diagnostics {
        let location = match diagnostic.line {
            Some(line) => format!("{}:{line}", diagnostic.path),
            None => diagnostic.path.clone(),
        };
        let label = match diagnostic.severity {
            Severity::Error => style(format!("error[{}]", diagnostic.kind.as_str()))
                .red()
                .bold(),
            Severity::Warning => style(format!("warning[{}]", diagnostic.kind.as_str()))
                .yellow()
                .bold(),
        };
        let _ = writeln!(
            out,
            "{}: {label}: {}",
            style(location).bold(),
            diagnostic.message
        );
    }

    let (errors, warnings) = count(diagnostics);
    out.push('\n');
    let _ = writeln!(
        out,
        "{errors} error{}, {warnings} warning{}",
        if errors == 1 { "" } else { "s" },
        if warnings == 1 { "" } else { "s" },
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Diagnostic> {
        vec![
            Diagnostic::warning(DiagnosticKind::OrphanDocument, "react/b.md", "no inbound links"),
            Diagnostic::error(DiagnosticKind::BrokenLink, "react/a.md", "target does not exist")
                .with_line(12),
            Diagnostic::warning(
                DiagnosticKind::TemplateMismatch,
                "react/a.md",
                "missing section",
            )
            .with_line(3),
            Diagnostic::error(DiagnosticKind::BrokenLink, "react/a.md", "another bad link")
                .with_line(3),
        ]
    }

    #[test]
    fn sorts_by_path_then_line_then_kind() {
        let mut diagnostics = sample();
        sort(&mut diagnostics);

        let order: Vec<(&str, Option<usize>, DiagnosticKind)> = diagnostics
            .iter()
            .map(|d| (d.path.as_str(), d.line, d.kind))
            .collect();
        assert_eq!(
            order,
            vec![
                ("react/a.md", Some(3), DiagnosticKind::BrokenLink),
                ("react/a.md", Some(3), DiagnosticKind::TemplateMismatch),
                ("react/a.md", Some(12), DiagnosticKind::BrokenLink),
                ("react/b.md", None, DiagnosticKind::OrphanDocument),
            ]
        );
    }

    #[test]
    fn file_level_entries_sort_before_line_entries() {
        let mut diagnostics = vec![
            Diagnostic::error(DiagnosticKind::BrokenLink, "a.md", "bad").with_line(1),
            Diagnostic::warning(DiagnosticKind::ParseWarning, "a.md", "odd bytes"),
        ];
        sort(&mut diagnostics);
        assert_eq!(diagnostics[0].line, None);
        assert_eq!(diagnostics[1].line, Some(1));
    }

    #[test]
    fn counts_errors_and_warnings() {
        let diagnostics = sample();
        assert!(has_errors(&diagnostics));
        assert_eq!(count(&diagnostics), (2, 2));
        assert!(!has_errors(&[]));
    }

    #[test]
    fn report_includes_location_and_summary() {
        let mut diagnostics = sample();
        sort(&mut diagnostics);
        let report = render_report(&diagnostics);

        assert!(report.contains("react/a.md:12"));
        assert!(report.contains("broken-link"));
        assert!(report.contains("2 errors, 2 warnings"));
    }

    #[test]
    fn empty_report_renders_nothing() {
        assert_eq!(render_report(&[]), "");
    }

    #[test]
    fn kind_serializes_as_kebab_case() {
        let json = serde_json::to_string(&DiagnosticKind::BrokenLink)
            .expect("can serialize diagnostic kind");
        assert_eq!(json, "\"broken-link\"");

        let diagnostic = Diagnostic::warning(DiagnosticKind::DuplicateTitle, "a.md", "dup");
        let json = serde_json::to_string(&diagnostic).expect("can serialize diagnostic");
        assert!(json.contains("\"duplicate-title\""));
        assert!(json.contains("\"warning\""));
        assert!(!json.contains("\"line\""));
    }
}

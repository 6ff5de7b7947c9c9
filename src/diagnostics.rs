//! Recoverable problems found while parsing, and where they get reported.
//!
//! The parser never logs through a global; callers hand it a
//! [`DiagnosticSink`]. [`TracingSink`] forwards to `tracing`, a `Vec` collects.

use std::fmt;

use crate::types::ParseStats;

/// Section names used in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionKind {
    SampleTestPlan,
    DefectRecordSpec,
    DefectList,
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::SampleTestPlan => "SampleTestPlan",
            SectionKind::DefectRecordSpec => "DefectRecordSpec",
            SectionKind::DefectList => "DefectList",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    /// A defect record was skipped.
    DroppedDefect { line: usize, reason: String },
    /// A sample test plan entry was skipped.
    DroppedDie { line: usize, reason: String },
    /// A known header keyword carried a value that could not be parsed.
    InvalidField {
        line: usize,
        keyword: String,
        value: String,
    },
    /// Statement outside any data section with an unrecognised keyword.
    UnknownKeyword { line: usize, keyword: String },
    /// A section ended without its `;` terminator.
    UnmatchedSection { line: usize, section: SectionKind },
    /// `DefectRecordSpec` count disagrees with the names listed.
    SpecWidthMismatch {
        line: usize,
        declared: i64,
        listed: usize,
    },
}

impl Diagnostic {
    /// Fold this diagnostic into the running counts.
    pub(crate) fn count(&self, stats: &mut ParseStats) {
        match self {
            Diagnostic::DroppedDefect { .. } => stats.dropped_defects += 1,
            Diagnostic::DroppedDie { .. } => stats.dropped_dies += 1,
            Diagnostic::InvalidField { .. } => stats.invalid_fields += 1,
            Diagnostic::UnknownKeyword { .. } => stats.unknown_keywords += 1,
            Diagnostic::UnmatchedSection { .. } => stats.unmatched_sections += 1,
            Diagnostic::SpecWidthMismatch { .. } => {}
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DroppedDefect { line, reason } => {
                write!(f, "line {line}: dropped defect record: {reason}")
            }
            Diagnostic::DroppedDie { line, reason } => {
                write!(f, "line {line}: dropped sample test plan entry: {reason}")
            }
            Diagnostic::InvalidField { line, keyword, value } => {
                write!(f, "line {line}: invalid {keyword} value {value:?}")
            }
            Diagnostic::UnknownKeyword { line, keyword } => {
                write!(f, "line {line}: ignored unknown keyword {keyword}")
            }
            Diagnostic::UnmatchedSection { line, section } => {
                write!(f, "line {line}: {section} section closed without terminator")
            }
            Diagnostic::SpecWidthMismatch { line, declared, listed } => write!(
                f,
                "line {line}: DefectRecordSpec declares {declared} fields but lists {listed}"
            ),
        }
    }
}

/// Receives every recoverable problem the parser hits.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::UnknownKeyword { .. } => tracing::debug!("{}", diagnostic),
            _ => tracing::warn!("{}", diagnostic),
        }
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _diagnostic: Diagnostic) {}
}

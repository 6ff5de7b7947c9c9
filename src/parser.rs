//! KLARF section state machine and record parsers.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Local};

use crate::diagnostics::{Diagnostic, DiagnosticSink, SectionKind, TracingSink};
use crate::error::{KlarfError, Result};
use crate::header::apply_header;
use crate::reader::{
    open_source, read_lines, starts_numeric, Line, RecordBoundary, Statement, StatementReader,
};
use crate::types::*;

/// Parser configuration.
#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// How statements without a `;` are delimited.
    pub boundary: RecordBoundary,
    /// Drop lines starting with `//` before reassembly.
    pub skip_comments: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            boundary: RecordBoundary::default(),
            skip_comments: true,
        }
    }
}

/// Section currently open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Header,
    SampleTestPlan,
    /// Waiting for the rest of a field-name list declared as `width` long.
    DefectRecordSpec { width: usize },
    DefectList,
}

impl Section {
    fn kind(self) -> Option<SectionKind> {
        match self {
            Section::Header => None,
            Section::SampleTestPlan => Some(SectionKind::SampleTestPlan),
            Section::DefectRecordSpec { .. } => Some(SectionKind::DefectRecordSpec),
            Section::DefectList => Some(SectionKind::DefectList),
        }
    }
}

/// Internal parser state.
struct ParserState<'s> {
    doc: KlarfDocument,
    section: Section,
    /// Whether the last statement seen inside the open section ended in `;`.
    terminated: bool,
    sink: &'s mut dyn DiagnosticSink,
}

impl<'s> ParserState<'s> {
    fn new(sink: &'s mut dyn DiagnosticSink) -> Self {
        Self {
            doc: KlarfDocument::new(),
            section: Section::Header,
            terminated: true,
            sink,
        }
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        diagnostic.count(&mut self.doc.stats);
        self.sink.report(diagnostic);
    }

    /// Field count the reassembler should aim for.
    fn expected_fields(&self) -> Option<usize> {
        match self.section {
            Section::DefectList if !self.doc.record_spec.is_empty() => {
                Some(self.doc.record_spec.width())
            }
            _ => None,
        }
    }

    /// Leave the current section, flagging it when no `;` marked its end.
    fn close_section(&mut self, line: usize) {
        if let Some(section) = self.section.kind() {
            if !self.terminated {
                self.report(Diagnostic::UnmatchedSection { line, section });
            }
            if section == SectionKind::SampleTestPlan {
                self.check_plan_count();
            }
        }
        self.section = Section::Header;
        self.terminated = true;
    }

    fn check_plan_count(&self) {
        if let Some(declared) = self.doc.header.declared_die_count {
            if declared != self.doc.dies.len() {
                tracing::debug!(
                    "SampleTestPlan declared {} dies, found {}",
                    declared,
                    self.doc.dies.len()
                );
            }
        }
    }

    fn dispatch(&mut self, stmt: &Statement) -> Result<()> {
        let keyword = stmt.keyword();

        match self.section {
            Section::Header => self.dispatch_keyword(stmt),

            // A keyword or record means the remaining names never came.
            Section::DefectRecordSpec { .. } if is_keyword(keyword) || starts_numeric(keyword) => {
                self.finish_spec(stmt.line);
                self.close_section(stmt.line);
                self.dispatch(stmt)
            }
            Section::DefectRecordSpec { .. } => {
                let tokens = stmt.tokens();
                self.collect_spec_names(stmt, &tokens);
                Ok(())
            }

            Section::SampleTestPlan if keyword == KW_END_SAMPLE_TEST_PLAN => {
                self.terminated = true;
                self.close_section(stmt.line);
                Ok(())
            }
            Section::DefectList if keyword == KW_END_DEFECT_LIST => {
                self.terminated = true;
                self.close_section(stmt.line);
                Ok(())
            }

            _ if is_keyword(keyword) => {
                self.close_section(stmt.line);
                self.dispatch_keyword(stmt)
            }

            Section::SampleTestPlan => {
                let tokens = stmt.tokens();
                self.plan_entries(stmt.line, &tokens, stmt.is_terminated());
                Ok(())
            }
            Section::DefectList => {
                let tokens = stmt.tokens();
                self.defect_record(stmt.line, &tokens, stmt.is_terminated())
            }
        }
    }

    /// Handle a statement outside any data section.
    fn dispatch_keyword(&mut self, stmt: &Statement) -> Result<()> {
        match stmt.keyword() {
            KW_SAMPLE_TEST_PLAN => self.start_plan(stmt),
            KW_DEFECT_RECORD_SPEC => {
                let tokens = stmt.tokens();
                let declared = tokens.get(1).and_then(|t| t.parse::<i64>().ok());
                let start = if declared.is_some() { 2 } else { 1 };
                self.doc.record_spec = DefectRecordSpec {
                    declared_count: declared,
                    fields: Vec::new(),
                };
                self.collect_spec_names(stmt, &tokens[start.min(tokens.len())..]);
            }
            KW_DEFECT_LIST => {
                let tokens = stmt.tokens();
                self.section = Section::DefectList;
                self.terminated = stmt.is_terminated();
                if tokens.len() > 1 {
                    return self.defect_record(stmt.line, &tokens[1..], stmt.is_terminated());
                }
            }
            // Stray closers and the end marker need no handling.
            KW_END_SAMPLE_TEST_PLAN | KW_END_DEFECT_LIST | KW_END_OF_FILE => {}
            _ => match apply_header(&mut self.doc.header, stmt) {
                Ok(true) => {}
                Ok(false) => self.report(Diagnostic::UnknownKeyword {
                    line: stmt.line,
                    keyword: stmt.keyword().to_string(),
                }),
                Err(diagnostic) => self.report(diagnostic),
            },
        }
        Ok(())
    }

    // ── Sample test plan ────────────────────────────────────────────

    fn start_plan(&mut self, stmt: &Statement) {
        let tokens = stmt.tokens();
        let declared = tokens.get(1).and_then(|t| t.parse::<usize>().ok());
        let start = if declared.is_some() { 2 } else { 1 };

        self.doc.header.declared_die_count = declared;
        self.section = Section::SampleTestPlan;
        self.terminated = false;
        self.plan_entries(stmt.line, &tokens[start.min(tokens.len())..], stmt.is_terminated());
    }

    /// Consume `row column` pairs. A `;` ends the plan.
    fn plan_entries(&mut self, line: usize, tokens: &[&str], terminated: bool) {
        if tokens.len() % 2 != 0 {
            self.report(Diagnostic::DroppedDie {
                line,
                reason: format!("expected row/column pairs, found {} tokens", tokens.len()),
            });
        } else {
            for pair in tokens.chunks(2) {
                match (pair[0].parse::<i64>(), pair[1].parse::<i64>()) {
                    (Ok(row), Ok(column)) => self.doc.dies.push(Die { row, column }),
                    _ => self.report(Diagnostic::DroppedDie {
                        line,
                        reason: format!("invalid coordinates {} {}", pair[0], pair[1]),
                    }),
                }
            }
        }

        if terminated {
            self.terminated = true;
            self.close_section(line);
        }
    }

    // ── Defect record spec ──────────────────────────────────────────

    /// Append field names. Every token after the keyword and count is a
    /// name; the declared count only decides whether to wait for more lines.
    fn collect_spec_names(&mut self, stmt: &Statement, names: &[&str]) {
        let spec = &mut self.doc.record_spec;
        spec.fields.extend(names.iter().map(|n| n.to_string()));
        let declared = spec.declared_count.map(|n| n.max(0) as usize);
        let short = declared.map_or(false, |n| spec.fields.len() < n);

        if short && !stmt.is_terminated() {
            self.section = Section::DefectRecordSpec {
                width: declared.unwrap_or_default(),
            };
            self.terminated = false;
            return;
        }

        self.section = Section::Header;
        self.terminated = true;
        self.finish_spec(stmt.line);
    }

    fn finish_spec(&mut self, line: usize) {
        let spec = &self.doc.record_spec;
        tracing::debug!("DefectRecordSpec with {} fields", spec.width());
        if let Some(declared) = spec.declared_count {
            if declared != spec.width() as i64 {
                let listed = spec.width();
                self.report(Diagnostic::SpecWidthMismatch {
                    line,
                    declared,
                    listed,
                });
            }
        }
    }

    // ── Defect list ─────────────────────────────────────────────────

    fn defect_record(&mut self, line: usize, tokens: &[&str], terminated: bool) -> Result<()> {
        self.terminated = terminated;

        let spec = &self.doc.record_spec;
        let layout = match spec.layout() {
            Some(layout) => layout,
            None if spec.is_empty() => return Err(KlarfError::MissingRecordSpec { line }),
            None => return Err(KlarfError::UnsupportedRecordSpec { width: spec.width() }),
        };

        match build_defect(tokens, layout) {
            Ok(defect) => self.doc.defects.push(defect),
            Err(reason) => self.report(Diagnostic::DroppedDefect { line, reason }),
        }
        Ok(())
    }

    fn finish(&mut self, last_line: usize) {
        match self.section {
            Section::Header => {}
            Section::DefectRecordSpec { .. } => {
                self.terminated = false;
                self.finish_spec(last_line);
                self.close_section(last_line);
            }
            _ => self.close_section(last_line),
        }
        self.doc.parsed = true;
    }
}

/// Parse token `idx` as `T`, naming the field on failure.
fn field<T: FromStr>(tokens: &[&str], idx: usize, name: &str) -> std::result::Result<T, String> {
    tokens[idx]
        .parse::<T>()
        .map_err(|_| format!("invalid {} {:?}", name, tokens[idx]))
}

/// Map record tokens onto a [`Defect`]. Callers guarantee at least
/// `layout.min_tokens()` tokens only via the length check below.
fn build_defect(tokens: &[&str], layout: RecordLayout) -> std::result::Result<Defect, String> {
    if tokens.len() < layout.min_tokens() {
        return Err(format!(
            "expected {} fields, found {}",
            layout.min_tokens(),
            tokens.len()
        ));
    }

    let extended = match layout {
        // XSIZE, YSIZE and DEFECTAREA are not kept for legacy records.
        RecordLayout::Legacy => None,
        RecordLayout::Extended => Some(ExtendedFields {
            x_size: field(tokens, 5, "XSIZE")?,
            y_size: field(tokens, 6, "YSIZE")?,
            area: field(tokens, 7, "DEFECTAREA")?,
            test: field(tokens, 10, "TEST")?,
            cluster_number: field(tokens, 11, "CLUSTERNUMBER")?,
            rough_bin: field(tokens, 12, "ROUGHBINNUMBER")?,
            fine_bin: field(tokens, 13, "FINEBINNUMBER")?,
            review_sample: field(tokens, 14, "REVIEWSAMPLE")?,
            image_count: field(tokens, 15, "IMAGECOUNT")?,
            image_list: tokens[16..].join(" "),
        }),
    };

    Ok(Defect {
        id: tokens[0].to_string(),
        x_rel: field(tokens, 1, "XREL")?,
        y_rel: field(tokens, 2, "YREL")?,
        row: field(tokens, 3, "XINDEX")?,
        column: field(tokens, 4, "YINDEX")?,
        size: field(tokens, 8, "DSIZE")?,
        class_code: tokens[9].to_string(),
        extended,
    })
}

// ── Main parse functions ────────────────────────────────────────────

fn parse_lines(
    lines: &[Line],
    options: &ParseOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<KlarfDocument> {
    let mut state = ParserState::new(sink);
    let mut reader = StatementReader::new(lines, options.boundary);

    while let Some(stmt) = reader.next_statement(state.expected_fields()) {
        state.doc.stats.statements += 1;
        state.dispatch(&stmt)?;
    }

    state.finish(lines.last().map_or(0, |l| l.number));
    Ok(state.doc)
}

/// Parse KLARF text from any reader.
pub fn parse_reader<R: Read>(
    reader: R,
    options: &ParseOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<KlarfDocument> {
    let lines = read_lines(reader, options.skip_comments)?;
    parse_lines(&lines, options, sink)
}

/// Parse KLARF text held in memory.
pub fn parse_str(
    text: &str,
    options: &ParseOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<KlarfDocument> {
    parse_reader(text.as_bytes(), options, sink)
}

fn file_info(path: &Path) -> FileInfo {
    let modified = fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(|t| DateTime::<Local>::from(t).naive_local());

    FileInfo {
        name: path
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
        path: path.to_path_buf(),
        modified,
        extension: path
            .extension()
            .map_or_else(String::new, |e| e.to_string_lossy().into_owned()),
    }
}

/// Parse a KLARF file (supports `.gz` compressed files).
pub fn parse_klarf<P: AsRef<Path>>(path: P) -> Result<KlarfDocument> {
    parse_klarf_with(path, &ParseOptions::default(), &mut TracingSink)
}

/// Parse a KLARF file with explicit options and diagnostic sink.
pub fn parse_klarf_with<P: AsRef<Path>>(
    path: P,
    options: &ParseOptions,
    sink: &mut dyn DiagnosticSink,
) -> Result<KlarfDocument> {
    let path = path.as_ref();

    // The handle is dropped before parsing begins.
    let lines = {
        let source = open_source(path).map_err(|e| KlarfError::from_io(path.to_path_buf(), e))?;
        read_lines(source, options.skip_comments)
            .map_err(|e| KlarfError::from_io(path.to_path_buf(), e))?
    };

    let mut doc = parse_lines(&lines, options, sink)?;
    doc.file = file_info(path);

    tracing::info!(
        "parsed {}: {} dies, {} defects",
        path.display(),
        doc.total_dies(),
        doc.total_defects()
    );
    if doc.stats.dropped_defects > 0 || doc.stats.dropped_dies > 0 {
        tracing::warn!(
            "{}: dropped {} defect records and {} plan entries",
            path.display(),
            doc.stats.dropped_defects,
            doc.stats.dropped_dies
        );
    }

    Ok(doc)
}

//! Line source and statement reassembly for KLARF text.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::types::is_keyword;

/// A trimmed, non-blank physical line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// 1-based line number in the input.
    pub number: usize,
    pub text: String,
}

/// Open `path` for reading, gunzipping `.gz` files on the fly.
pub fn open_source(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;

    // Detect gzip by extension
    let is_gz = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("gz"));

    if is_gz {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read all of `reader` and split it into trimmed lines, skipping blanks and,
/// when `skip_comments` is set, `//` comment lines.
pub fn read_lines<R: Read>(mut reader: R, skip_comments: bool) -> io::Result<Vec<Line>> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);

    Ok(text
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let line = raw.trim();
            if line.is_empty() || (skip_comments && line.starts_with("//")) {
                return None;
            }
            Some(Line {
                number: idx + 1,
                text: line.to_string(),
            })
        })
        .collect())
}

/// When a logical statement ends, besides the `;` terminator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordBoundary {
    /// Only `;` ends a statement.
    Terminator,
    /// `;`, or the next line starts with a number. Producers commonly omit
    /// the terminator on every record but the last one.
    #[default]
    NumericLine,
    /// As [`RecordBoundary::NumericLine`], but when the caller knows how many
    /// fields a record has, the statement ends once that many tokens are
    /// buffered and numeric continuation lines are folded in.
    FieldCount,
}

/// One logical, possibly multi-line, statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    /// Line number where the statement starts.
    pub line: usize,
    pub text: String,
}

impl Statement {
    /// True when the statement carries its `;` terminator.
    pub fn is_terminated(&self) -> bool {
        self.text.ends_with(';')
    }

    /// Whitespace tokens with the terminator removed. A lone `;` token
    /// disappears entirely.
    pub fn tokens(&self) -> Vec<&str> {
        self.text
            .trim_end_matches(';')
            .split_whitespace()
            .collect()
    }

    /// First token without any `;`, used for keyword dispatch.
    pub fn keyword(&self) -> &str {
        self.text
            .split_whitespace()
            .next()
            .map_or("", |t| t.trim_end_matches(';'))
    }
}

/// True if `text` begins with a number, optionally signed.
pub(crate) fn starts_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') | Some('+') => chars.next().map_or(false, |c| c.is_ascii_digit()),
        _ => false,
    }
}

/// True if `text` opens with a known KLARF keyword.
fn starts_keyword(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .map_or(false, |t| is_keyword(t.trim_end_matches(';')))
}

/// Folds physical lines into logical statements. A line that opens with a
/// known keyword always starts a new statement.
pub struct StatementReader<'a> {
    lines: &'a [Line],
    pos: usize,
    boundary: RecordBoundary,
}

impl<'a> StatementReader<'a> {
    pub fn new(lines: &'a [Line], boundary: RecordBoundary) -> Self {
        Self {
            lines,
            pos: 0,
            boundary,
        }
    }

    /// Next statement. `expected_fields` is the active record width when the
    /// caller is inside a defect list; only [`RecordBoundary::FieldCount`]
    /// looks at it.
    pub fn next_statement(&mut self, expected_fields: Option<usize>) -> Option<Statement> {
        let first = self.lines.get(self.pos)?;
        let line = first.number;
        let mut text = String::new();
        let mut token_count = 0;

        while let Some(current) = self.lines.get(self.pos) {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&current.text);
            token_count += current.text.split_whitespace().count();
            self.pos += 1;

            if text.ends_with(';') {
                break;
            }

            let next = match self.lines.get(self.pos) {
                Some(next) => next,
                None => break,
            };

            if starts_keyword(&next.text) {
                break;
            }

            let done = match (self.boundary, expected_fields) {
                (RecordBoundary::Terminator, _) => false,
                (RecordBoundary::FieldCount, Some(width)) => token_count >= width,
                (RecordBoundary::NumericLine, _) | (RecordBoundary::FieldCount, None) => {
                    starts_numeric(&next.text)
                }
            };
            if done {
                break;
            }
        }

        Some(Statement { line, text })
    }
}

impl Iterator for StatementReader<'_> {
    type Item = Statement;

    fn next(&mut self) -> Option<Statement> {
        self.next_statement(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn lines(text: &str) -> Vec<Line> {
        read_lines(Cursor::new(text.as_bytes().to_vec()), true).unwrap()
    }

    fn texts(reader: StatementReader<'_>) -> Vec<String> {
        reader.map(|s| s.text).collect()
    }

    #[test]
    fn test_read_lines_trims_and_skips_blanks() {
        let result = lines("  LotID \"A\";  \n\n\t\n// note\nSlot 1;\n");
        assert_eq!(
            result,
            vec![
                Line { number: 1, text: "LotID \"A\";".to_string() },
                Line { number: 5, text: "Slot 1;".to_string() },
            ]
        );
    }

    #[test]
    fn test_read_lines_keeps_comments_when_asked() {
        let result = read_lines(Cursor::new(b"// note\n".to_vec()), false).unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_read_lines_crlf() {
        let result = lines("Slot 1;\r\nLotID \"A\";\r\n");
        assert_eq!(result[0].text, "Slot 1;");
        assert_eq!(result[1].text, "LotID \"A\";");
    }

    #[test]
    fn test_terminated_statements() {
        let src = lines("LotID \"A\";\nWaferID\n\"W1\";\n");
        let stmts: Vec<Statement> = StatementReader::new(&src, RecordBoundary::NumericLine).collect();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[1].text, "WaferID \"W1\";");
        assert_eq!(stmts[1].line, 2);
    }

    #[test]
    fn test_numeric_line_ends_statement() {
        let src = lines("SampleTestPlan 2\n1 1\n1 2;\n");
        let reader = StatementReader::new(&src, RecordBoundary::NumericLine);
        assert_eq!(texts(reader), vec!["SampleTestPlan 2", "1 1", "1 2;"]);
    }

    #[test]
    fn test_negative_numeric_line_ends_statement() {
        let src = lines("1 1\n-1 2;\n");
        let reader = StatementReader::new(&src, RecordBoundary::NumericLine);
        assert_eq!(texts(reader), vec!["1 1", "-1 2;"]);
    }

    #[test]
    fn test_terminator_only_merges() {
        let src = lines("SampleTestPlan 2\n1 1\n1 2;\n");
        let reader = StatementReader::new(&src, RecordBoundary::Terminator);
        assert_eq!(texts(reader), vec!["SampleTestPlan 2 1 1 1 2;"]);
    }

    #[test]
    fn test_split_statement_matches_single_line() {
        let split = lines("D1 0.5 0.5\n1 1 0 0\n0 2.0 7;\n");
        let single = lines("D1 0.5 0.5 1 1 0 0 0 2.0 7;\n");

        let mut reader = StatementReader::new(&split, RecordBoundary::FieldCount);
        let joined = reader.next_statement(Some(10)).unwrap();
        let whole = StatementReader::new(&single, RecordBoundary::FieldCount)
            .next_statement(Some(10))
            .unwrap();
        assert_eq!(joined.text, whole.text);
        assert_eq!(joined.tokens(), whole.tokens());
    }

    #[test]
    fn test_non_numeric_continuation_is_folded() {
        let src = lines("1 0.5 0.5 1 1 0 0 0 2.0 7 0 0 1 1 0 1\nimg001.png;\n");
        let stmt = StatementReader::new(&src, RecordBoundary::NumericLine)
            .next()
            .unwrap();
        assert_eq!(stmt.tokens().len(), 17);
        assert!(stmt.is_terminated());
    }

    #[test]
    fn test_field_count_stops_at_width() {
        let src = lines("1 0.5 0.5 1 1 0 0 0 2.0 7\n2 0.1 0.1 1 2 0 0 0 1.0 3;\n");
        let mut reader = StatementReader::new(&src, RecordBoundary::FieldCount);
        assert_eq!(reader.next_statement(Some(10)).unwrap().tokens().len(), 10);
        assert_eq!(reader.next_statement(Some(10)).unwrap().tokens().len(), 10);
        assert!(reader.next_statement(Some(10)).is_none());
    }

    #[test]
    fn test_keyword_line_starts_statement() {
        let src = lines("1 1\n1 2\nLotID \"A\";\n");
        let reader = StatementReader::new(&src, RecordBoundary::Terminator);
        assert_eq!(texts(reader), vec!["1 1 1 2", "LotID \"A\";"]);
    }

    #[test]
    fn test_field_names_are_not_keywords() {
        let src = lines("DefectRecordSpec 3 DEFECTID\nXREL YREL;\n");
        let reader = StatementReader::new(&src, RecordBoundary::NumericLine);
        assert_eq!(texts(reader), vec!["DefectRecordSpec 3 DEFECTID XREL YREL;"]);
    }

    #[test]
    fn test_unterminated_trailing_statement() {
        let src = lines("LotID \"A\";\nEndOfFile\n");
        let reader = StatementReader::new(&src, RecordBoundary::NumericLine);
        assert_eq!(texts(reader), vec!["LotID \"A\";", "EndOfFile"]);
    }

    #[test]
    fn test_tokens_and_keyword() {
        let stmt = Statement {
            line: 1,
            text: "DiePitch 1.0e+04  2.0e+04;".to_string(),
        };
        assert_eq!(stmt.keyword(), "DiePitch");
        assert_eq!(stmt.tokens(), vec!["DiePitch", "1.0e+04", "2.0e+04"]);

        let bare = Statement { line: 1, text: "EndOfFile;".to_string() };
        assert_eq!(bare.keyword(), "EndOfFile");

        let detached = Statement { line: 1, text: "1 2 ;".to_string() };
        assert_eq!(detached.tokens(), vec!["1", "2"]);
    }
}

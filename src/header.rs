//! Header statement extraction.

use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::diagnostics::Diagnostic;
use crate::reader::Statement;
use crate::types::*;

/// Timestamp layouts, tried in order.
const TIMESTAMP_FORMATS: [&str; 2] = ["%m-%d-%Y %H:%M:%S", "%d-%m-%Y %H:%M:%S"];

/// Separator for multi-part quoted identifiers.
const ID_SEPARATOR: &str = " / ";

/// Everything after the keyword, with the terminator removed.
fn rest_of(stmt: &Statement) -> &str {
    stmt.text
        .trim_end_matches(';')
        .split_once(char::is_whitespace)
        .map_or("", |(_, rest)| rest.trim())
}

/// Contents of every double-quoted substring, in order.
fn quoted(text: &str) -> Vec<&str> {
    text.split('"').skip(1).step_by(2).collect()
}

/// First quoted value, or the unquoted remainder.
fn text_value(rest: &str) -> String {
    if rest.contains('"') {
        quoted(rest).first().map_or_else(String::new, |s| s.to_string())
    } else {
        rest.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Unquoted `FileVersion 1 2` is a major/minor pair.
fn version_value(rest: &str) -> String {
    if rest.contains('"') {
        return text_value(rest);
    }
    let parts: Vec<&str> = rest.split_whitespace().collect();
    if parts.len() > 1 && parts.iter().all(|p| p.parse::<u32>().is_ok()) {
        parts.join(".")
    } else {
        parts.join(" ")
    }
}

/// Parse a `date time` pair in one of [`TIMESTAMP_FORMATS`].
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let cleaned = value.replace('"', " ");
    let parts: Vec<&str> = cleaned.split_whitespace().take(2).collect();
    if parts.len() < 2 {
        return None;
    }
    let joined = parts.join(" ");
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&joined, fmt).ok())
}

fn invalid(stmt: &Statement, keyword: &str, value: &str) -> Diagnostic {
    Diagnostic::InvalidField {
        line: stmt.line,
        keyword: keyword.to_string(),
        value: value.to_string(),
    }
}

/// Parse the positional value at `idx` (0 is the keyword).
fn positional<T: FromStr>(stmt: &Statement, tokens: &[&str], idx: usize) -> Result<T, Diagnostic> {
    let keyword = tokens.first().copied().unwrap_or_default();
    let raw = tokens.get(idx).copied().unwrap_or_default();
    raw.parse::<T>().map_err(|_| invalid(stmt, keyword, raw))
}

/// Apply one header statement.
///
/// Returns `Ok(true)` when the keyword is known and its value stored,
/// `Ok(false)` for unknown keywords (left for the caller to ignore), and a
/// diagnostic when a known keyword's value is unusable. Fields are only
/// written when their value parses.
pub fn apply_header(header: &mut KlarfHeader, stmt: &Statement) -> Result<bool, Diagnostic> {
    let tokens = stmt.tokens();
    let rest = rest_of(stmt);

    match stmt.keyword() {
        KW_FILE_VERSION => header.file_version = version_value(rest),
        KW_INSPECTION_STATION_ID => {
            header.inspection_station_id = if rest.contains('"') {
                quoted(rest).join(ID_SEPARATOR)
            } else {
                text_value(rest)
            }
        }
        KW_SAMPLE_TYPE => header.sample_type = text_value(rest),
        KW_LOT_ID => header.lot_id = text_value(rest),
        KW_WAFER_ID => header.wafer_id = text_value(rest),
        KW_TIFF_FILENAME => header.tiff_filename = text_value(rest),
        KW_TIFF_SPEC => header.tiff_spec = text_value(rest),
        KW_SETUP_ID => header.setup_id = text_value(rest),
        KW_STEP_ID => header.step_id = text_value(rest),
        KW_SAMPLE_ORIENTATION_MARK_TYPE => header.sample_orientation_mark_type = text_value(rest),
        KW_ORIENTATION_MARK_LOCATION => header.orientation_mark_location = text_value(rest),

        KW_FILE_TIMESTAMP | KW_RESULT_TIMESTAMP => {
            let parsed = parse_timestamp(rest);
            if stmt.keyword() == KW_FILE_TIMESTAMP {
                header.file_timestamp = parsed;
            } else {
                header.result_timestamp = parsed;
            }
            if parsed.is_none() {
                return Err(invalid(stmt, stmt.keyword(), rest));
            }
        }

        KW_SLOT => header.slot = positional(stmt, &tokens, 1)?,
        KW_INSPECTION_TEST => header.inspection_test = positional(stmt, &tokens, 1)?,
        KW_AREA_PER_TEST => header.area_per_test = positional(stmt, &tokens, 1)?,
        KW_SAMPLE_SIZE => {
            let idx = if tokens.len() > 2 { 2 } else { 1 };
            header.wafer_diameter = positional(stmt, &tokens, idx)?;
        }
        KW_DIE_PITCH => {
            let (x, y) = (positional(stmt, &tokens, 1)?, positional(stmt, &tokens, 2)?);
            header.die_pitch_x = x;
            header.die_pitch_y = y;
        }
        KW_DIE_ORIGIN => {
            let (x, y) = (positional(stmt, &tokens, 1)?, positional(stmt, &tokens, 2)?);
            header.die_origin_x = x;
            header.die_origin_y = y;
        }
        KW_SAMPLE_CENTER_LOCATION => {
            let (x, y) = (positional(stmt, &tokens, 1)?, positional(stmt, &tokens, 2)?);
            header.sample_center_x = x;
            header.sample_center_y = y;
        }

        _ => return Ok(false),
    }

    Ok(true)
}

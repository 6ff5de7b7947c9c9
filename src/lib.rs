//! klarf-rs: KLARF wafer inspection result parser with optional Python bindings.
//!
//! ```no_run
//! let doc = klarf_rs::parse_klarf("wafer.klarf").unwrap();
//! for summary in doc.die_summaries() {
//!     println!("{:?}: {} defects", summary.die, summary.defect_count);
//! }
//! ```

pub mod diagnostics;
pub mod error;
pub mod header;
pub mod parser;
pub mod reader;
pub mod types;
pub mod wafer;

#[cfg(feature = "python")]
mod python;

pub use diagnostics::{Diagnostic, DiagnosticSink, NullSink, TracingSink};
pub use error::{KlarfError, Result};
pub use parser::{parse_klarf, parse_klarf_with, parse_reader, parse_str, ParseOptions};
pub use reader::RecordBoundary;
pub use types::{Defect, DefectRecordSpec, Die, KlarfDocument, KlarfHeader, RecordLayout};
pub use wafer::DieSummary;

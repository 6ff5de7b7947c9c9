//! PyO3 bindings exposing `parse_klarf_rs()` to Python.

use pyo3::exceptions::{PyFileNotFoundError, PyIOError, PyValueError};
use pyo3::prelude::*;

use crate::error::KlarfError;
use crate::parser;
use crate::types::{
    Defect, DefectRecordSpec, Die, ExtendedFields, FileInfo, KlarfDocument, KlarfHeader,
    ParseStats,
};

fn to_py_err(err: KlarfError) -> PyErr {
    match err {
        KlarfError::NotFound { .. } => PyFileNotFoundError::new_err(err.to_string()),
        KlarfError::Io { .. } | KlarfError::Stream(_) => PyIOError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Parse a KLARF file and return the document.
///
/// Supports both plain and `.gz` compressed files.
#[pyfunction]
fn parse_klarf_rs(path: &str) -> PyResult<KlarfDocument> {
    parser::parse_klarf(path).map_err(to_py_err)
}

#[pymethods]
impl Defect {
    #[getter]
    fn frame(&self) -> Option<u32> {
        self.frame_number()
    }
}

#[pymethods]
impl KlarfDocument {
    #[getter]
    fn die_count(&self) -> usize {
        self.total_dies()
    }

    #[getter]
    fn defect_total(&self) -> usize {
        self.total_defects()
    }

    /// `(row, column, defect_count, is_good)` per die, in plan order.
    fn die_table(&self) -> Vec<(i64, i64, usize, bool)> {
        self.die_summaries()
            .into_iter()
            .map(|s| (s.die.row, s.die.column, s.defect_count, s.is_good))
            .collect()
    }

    fn tiff_file(&self) -> Option<String> {
        self.tiff_path().map(|p| p.to_string_lossy().into_owned())
    }
}

/// Python module: klarf_rs
#[pymodule]
fn klarf_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(parse_klarf_rs, m)?)?;
    m.add_class::<KlarfDocument>()?;
    m.add_class::<KlarfHeader>()?;
    m.add_class::<FileInfo>()?;
    m.add_class::<DefectRecordSpec>()?;
    m.add_class::<Die>()?;
    m.add_class::<Defect>()?;
    m.add_class::<ExtendedFields>()?;
    m.add_class::<ParseStats>()?;
    Ok(())
}

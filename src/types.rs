//! KLARF data types and structures.

#[cfg(feature = "python")]
use pyo3::prelude::*;
use std::path::PathBuf;

use chrono::NaiveDateTime;

/// Header keywords understood by the parser.
pub const KW_FILE_VERSION: &str = "FileVersion";
pub const KW_FILE_TIMESTAMP: &str = "FileTimestamp";
pub const KW_RESULT_TIMESTAMP: &str = "ResultTimestamp";
pub const KW_INSPECTION_STATION_ID: &str = "InspectionStationID";
pub const KW_SAMPLE_TYPE: &str = "SampleType";
pub const KW_LOT_ID: &str = "LotID";
pub const KW_WAFER_ID: &str = "WaferID";
pub const KW_SLOT: &str = "Slot";
pub const KW_SAMPLE_SIZE: &str = "SampleSize";
pub const KW_DIE_PITCH: &str = "DiePitch";
pub const KW_AREA_PER_TEST: &str = "AreaPerTest";
pub const KW_ORIENTATION_MARK_LOCATION: &str = "OrientationMarkLocation";
pub const KW_SAMPLE_ORIENTATION_MARK_TYPE: &str = "SampleOrientationMarkType";
pub const KW_TIFF_FILENAME: &str = "TiffFilename";
pub const KW_TIFF_SPEC: &str = "TiffSpec";
pub const KW_SETUP_ID: &str = "SetupID";
pub const KW_STEP_ID: &str = "StepID";
pub const KW_DIE_ORIGIN: &str = "DieOrigin";
pub const KW_SAMPLE_CENTER_LOCATION: &str = "SampleCenterLocation";
pub const KW_INSPECTION_TEST: &str = "InspectionTest";

/// Section keywords.
pub const KW_SAMPLE_TEST_PLAN: &str = "SampleTestPlan";
pub const KW_END_SAMPLE_TEST_PLAN: &str = "EndOfSampleTestPlan";
pub const KW_DEFECT_RECORD_SPEC: &str = "DefectRecordSpec";
pub const KW_DEFECT_LIST: &str = "DefectList";
pub const KW_END_DEFECT_LIST: &str = "EndOfDefectList";
pub const KW_END_OF_FILE: &str = "EndOfFile";

/// Keywords that always open a new statement when they lead a line.
pub const KEYWORDS: &[&str] = &[
    KW_FILE_VERSION,
    KW_FILE_TIMESTAMP,
    KW_RESULT_TIMESTAMP,
    KW_INSPECTION_STATION_ID,
    KW_SAMPLE_TYPE,
    KW_LOT_ID,
    KW_WAFER_ID,
    KW_SLOT,
    KW_SAMPLE_SIZE,
    KW_DIE_PITCH,
    KW_AREA_PER_TEST,
    KW_ORIENTATION_MARK_LOCATION,
    KW_SAMPLE_ORIENTATION_MARK_TYPE,
    KW_TIFF_FILENAME,
    KW_TIFF_SPEC,
    KW_SETUP_ID,
    KW_STEP_ID,
    KW_DIE_ORIGIN,
    KW_SAMPLE_CENTER_LOCATION,
    KW_INSPECTION_TEST,
    KW_SAMPLE_TEST_PLAN,
    KW_END_SAMPLE_TEST_PLAN,
    KW_DEFECT_RECORD_SPEC,
    KW_DEFECT_LIST,
    KW_END_DEFECT_LIST,
    KW_END_OF_FILE,
    // Recognised for statement boundaries only.
    "DeviceID",
    "SummarySpec",
    "SummaryList",
    "ClassLookup",
];

/// True if `token` is one of [`KEYWORDS`].
pub fn is_keyword(token: &str) -> bool {
    KEYWORDS.contains(&token)
}

/// Where the KLARF document was loaded from.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "python", pyclass)]
pub struct FileInfo {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub name: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub path: PathBuf,
    /// Last modification time in local time, when the filesystem reports one.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub modified: Option<NaiveDateTime>,
    /// Extension without the leading dot (`"klarf"`, `"001"`, `"gz"`).
    #[cfg_attr(feature = "python", pyo3(get))]
    pub extension: String,
}

/// Header metadata. Missing keywords leave their field at the default.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "python", pyclass)]
pub struct KlarfHeader {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub file_version: String,
    /// `None` when absent or in no recognised format.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub file_timestamp: Option<NaiveDateTime>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub result_timestamp: Option<NaiveDateTime>,
    /// All quoted parts joined with `" / "`.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub inspection_station_id: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub sample_type: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub lot_id: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub wafer_id: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub slot: i64,
    /// Taken from `SampleSize`.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub wafer_diameter: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub area_per_test: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub orientation_mark_location: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub sample_orientation_mark_type: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub tiff_filename: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub tiff_spec: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub die_pitch_x: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub die_pitch_y: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub die_origin_x: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub die_origin_y: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub sample_center_x: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub sample_center_y: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub setup_id: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub step_id: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub inspection_test: i64,
    /// Die count written after `SampleTestPlan`. A hint only.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub declared_die_count: Option<usize>,
}

/// One inspected die from the sample test plan.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "python", pyclass)]
pub struct Die {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub row: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub column: i64,
}

/// Fields only present with the 17-field record layout.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "python", pyclass)]
pub struct ExtendedFields {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub x_size: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub y_size: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub area: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub test: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub cluster_number: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub rough_bin: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub fine_bin: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub review_sample: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub image_count: i64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub image_list: String,
}

/// A single defect record.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "python", pyclass)]
pub struct Defect {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub id: String,
    /// Position relative to the die origin.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub x_rel: f64,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub y_rel: f64,
    /// Die-grid index read from the XINDEX token (position 3).
    #[cfg_attr(feature = "python", pyo3(get))]
    pub row: i64,
    /// Die-grid index read from the YINDEX token (position 4).
    #[cfg_attr(feature = "python", pyo3(get))]
    pub column: i64,
    /// DSIZE.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub size: f64,
    /// CLASSNUMBER, kept as text since producers are not consistent about it.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub class_code: String,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub extended: Option<ExtendedFields>,
}

impl Defect {
    /// 1-based frame index into the document's multi-frame TIFF, taken from
    /// the defect id. `None` when the id is not a positive integer.
    pub fn frame_number(&self) -> Option<u32> {
        self.id.parse::<u32>().ok().filter(|n| *n > 0)
    }
}

/// How defect record tokens map onto [`Defect`] fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordLayout {
    /// `DEFECTID XREL YREL XINDEX YINDEX XSIZE YSIZE DEFECTAREA DSIZE CLASSNUMBER`.
    Legacy,
    /// Legacy fields followed by `TEST CLUSTERNUMBER ROUGHBINNUMBER
    /// FINEBINNUMBER REVIEWSAMPLE IMAGECOUNT IMAGELIST`.
    Extended,
}

impl RecordLayout {
    pub const LEGACY_WIDTH: usize = 10;
    pub const EXTENDED_WIDTH: usize = 17;

    /// Select a layout for a schema of `width` fields.
    pub fn for_width(width: usize) -> Option<Self> {
        if width >= Self::EXTENDED_WIDTH {
            Some(RecordLayout::Extended)
        } else if width >= Self::LEGACY_WIDTH {
            Some(RecordLayout::Legacy)
        } else {
            None
        }
    }

    /// Minimum token count a record needs under this layout.
    pub fn min_tokens(self) -> usize {
        match self {
            RecordLayout::Legacy => Self::LEGACY_WIDTH,
            RecordLayout::Extended => Self::EXTENDED_WIDTH,
        }
    }
}

/// Schema declared by the `DefectRecordSpec` statement.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "python", pyclass)]
pub struct DefectRecordSpec {
    /// Field count as written after the keyword.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub declared_count: Option<i64>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub fields: Vec<String>,
}

impl DefectRecordSpec {
    /// Number of field names actually listed.
    pub fn width(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn layout(&self) -> Option<RecordLayout> {
        RecordLayout::for_width(self.width())
    }
}

/// Counts of everything the parser recovered from instead of failing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "python", pyclass)]
pub struct ParseStats {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub statements: usize,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub dropped_defects: usize,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub dropped_dies: usize,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub invalid_fields: usize,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub unknown_keywords: usize,
    /// Sections whose end was inferred rather than marked by `;`.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub unmatched_sections: usize,
}

/// Top-level parsed KLARF document.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "python", pyclass)]
pub struct KlarfDocument {
    #[cfg_attr(feature = "python", pyo3(get))]
    pub file: FileInfo,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub header: KlarfHeader,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub record_spec: DefectRecordSpec,
    /// Sample test plan, in file order.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub dies: Vec<Die>,
    /// Defect list, in file order.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub defects: Vec<Defect>,
    #[cfg_attr(feature = "python", pyo3(get))]
    pub stats: ParseStats,
    /// Set once the whole input has been consumed.
    #[cfg_attr(feature = "python", pyo3(get))]
    pub parsed: bool,
}

impl KlarfDocument {
    pub fn new() -> Self {
        Self::default()
    }
}

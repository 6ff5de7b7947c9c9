//! End-to-end parsing of KLARF files on disk.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::NaiveDate;
use flate2::write::GzEncoder;
use flate2::Compression;
use klarf_rs::{
    parse_klarf, parse_klarf_with, Diagnostic, Die, KlarfError, NullSink, ParseOptions,
    RecordBoundary,
};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn field_count_options() -> ParseOptions {
    ParseOptions {
        boundary: RecordBoundary::FieldCount,
        ..ParseOptions::default()
    }
}

#[test]
fn test_parse_legacy_file() {
    let doc = parse_klarf(fixture_path("legacy.klarf")).expect("Should parse");
    assert!(doc.parsed);

    let h = &doc.header;
    assert_eq!(h.file_version, "1.2");
    assert_eq!(h.inspection_station_id, "KLA / 2367 / TOOL01");
    assert_eq!(h.sample_type, "WAFER");
    assert_eq!(h.lot_id, "LOT123");
    assert_eq!(h.wafer_id, "W01");
    assert_eq!(h.slot, 4);
    assert_eq!(h.wafer_diameter, 300.0);
    assert_eq!(h.setup_id, "RECIPE_A");
    assert_eq!(h.step_id, "ETCH");
    assert_eq!(h.sample_orientation_mark_type, "NOTCH");
    assert_eq!(h.orientation_mark_location, "DOWN");
    assert_eq!(h.tiff_spec, "6.0 G R");
    assert_eq!(h.tiff_filename, "defects.tif");
    assert_eq!((h.die_pitch_x, h.die_pitch_y), (10000.0, 10000.0));
    assert_eq!((h.sample_center_x, h.sample_center_y), (150000.0, 150000.0));
    assert_eq!(h.area_per_test, 7.068583e10);
    assert_eq!(h.inspection_test, 1);
    assert_eq!(
        h.result_timestamp,
        NaiveDate::from_ymd_opt(2020, 6, 15).and_then(|d| d.and_hms_opt(10, 25, 0))
    );

    assert_eq!(
        doc.dies,
        vec![
            Die { row: 0, column: 0 },
            Die { row: 0, column: 1 },
            Die { row: 1, column: 0 },
            Die { row: 1, column: 1 },
        ]
    );
    let ids: Vec<&str> = doc.defects.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
    assert_eq!(doc.stats.dropped_defects, 0);
    assert_eq!(doc.stats.unmatched_sections, 0);
}

#[test]
fn test_legacy_die_classification() {
    let doc = parse_klarf(fixture_path("legacy.klarf")).expect("Should parse");
    assert_eq!(doc.good_dies(), vec![Die { row: 0, column: 0 }, Die { row: 1, column: 0 }]);
    assert_eq!(doc.defect_count(&Die { row: 0, column: 1 }), 2);
    assert_eq!(doc.class_counts().get("7"), Some(&2));
}

#[test]
fn test_parse_extended_file_with_field_count() {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    let doc = parse_klarf_with(fixture_path("extended.klarf"), &field_count_options(), &mut diagnostics)
        .expect("Should parse");

    assert_eq!(doc.header.file_version, "1.8");
    assert_eq!(doc.record_spec.width(), 17);
    assert_eq!(doc.dies.len(), 3);

    let ids: Vec<&str> = doc.defects.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["D1", "D2", "D4"]);

    let d2 = &doc.defects[1];
    assert_eq!(d2.class_code, "BRIDGE");
    assert_eq!(d2.extended.as_ref().map(|e| e.image_list.as_str()), Some("img002.png"));

    assert_eq!(doc.stats.dropped_defects, 1);
    assert!(diagnostics
        .iter()
        .any(|d| matches!(d, Diagnostic::DroppedDefect { reason, .. } if reason.contains("XREL"))));

    assert!(!doc.is_good(&Die { row: -1, column: 0 }));
    assert!(doc.is_good(&Die { row: 0, column: 1 }));
}

#[test]
fn test_extended_file_numeric_line_splits_continuation() {
    let doc = parse_klarf(fixture_path("extended.klarf")).expect("Should parse");
    let ids: Vec<&str> = doc.defects.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["D1", "D4"]);
    assert_eq!(doc.stats.dropped_defects, 3);
}

#[test]
fn test_file_identity() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wafer01.klarf");
    fs::copy(fixture_path("legacy.klarf"), &path).unwrap();

    let doc = parse_klarf(&path).unwrap();
    assert_eq!(doc.file.name, "wafer01.klarf");
    assert_eq!(doc.file.extension, "klarf");
    assert_eq!(doc.file.path, path);
    assert!(doc.file.modified.is_some());
    assert_eq!(doc.tiff_path(), Some(dir.path().join("defects.tif")));
}

#[test]
fn test_parse_gzip_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wafer01.klarf.gz");

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&fs::read(fixture_path("legacy.klarf")).unwrap())
        .unwrap();
    fs::write(&path, encoder.finish().unwrap()).unwrap();

    let doc = parse_klarf(&path).unwrap();
    assert_eq!(doc.header.lot_id, "LOT123");
    assert_eq!(doc.defects.len(), 3);
    assert_eq!(doc.file.extension, "gz");
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not_a_real_file.klarf");

    match parse_klarf(&path) {
        Err(KlarfError::NotFound { path: missing }) => assert_eq!(missing, path),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn test_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.klarf");
    fs::write(&path, "").unwrap();

    let doc = parse_klarf_with(&path, &ParseOptions::default(), &mut NullSink).unwrap();
    assert!(doc.parsed);
    assert_eq!(doc.total_dies(), 0);
    assert_eq!(doc.total_defects(), 0);
}

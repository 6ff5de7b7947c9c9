//! Derived die/defect views over a parsed document.
//!
//! Nothing here is cached. Every query scans the defect list again, so the
//! results always reflect the current contents of `dies` and `defects`.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::types::{Defect, Die, KlarfDocument};

/// A die together with its derived defect statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DieSummary {
    pub die: Die,
    pub defect_count: usize,
    pub is_good: bool,
}

impl KlarfDocument {
    pub fn total_dies(&self) -> usize {
        self.dies.len()
    }

    pub fn total_defects(&self) -> usize {
        self.defects.len()
    }

    /// Defects located in the die at (`row`, `column`), in file order.
    pub fn defects_in(&self, row: i64, column: i64) -> impl Iterator<Item = &Defect> + '_ {
        self.defects
            .iter()
            .filter(move |d| d.row == row && d.column == column)
    }

    pub fn defect_count(&self, die: &Die) -> usize {
        self.defects_in(die.row, die.column).count()
    }

    /// A die is good when no defect shares its coordinates.
    pub fn is_good(&self, die: &Die) -> bool {
        self.defects_in(die.row, die.column).next().is_none()
    }

    /// One summary per die, in plan order.
    pub fn die_summaries(&self) -> Vec<DieSummary> {
        let mut counts: HashMap<(i64, i64), usize> = HashMap::new();
        for defect in &self.defects {
            *counts.entry((defect.row, defect.column)).or_default() += 1;
        }

        self.dies
            .iter()
            .map(|die| {
                let defect_count = counts.get(&(die.row, die.column)).copied().unwrap_or(0);
                DieSummary {
                    die: *die,
                    defect_count,
                    is_good: defect_count == 0,
                }
            })
            .collect()
    }

    pub fn good_dies(&self) -> Vec<Die> {
        self.die_summaries()
            .into_iter()
            .filter(|s| s.is_good)
            .map(|s| s.die)
            .collect()
    }

    pub fn bad_dies(&self) -> Vec<Die> {
        self.die_summaries()
            .into_iter()
            .filter(|s| !s.is_good)
            .map(|s| s.die)
            .collect()
    }

    /// Defects carrying classification `class_code`.
    pub fn defects_by_class<'a>(&'a self, class_code: &'a str) -> impl Iterator<Item = &'a Defect> + 'a {
        self.defects.iter().filter(move |d| d.class_code == class_code)
    }

    /// Number of defects per classification code.
    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for defect in &self.defects {
            *counts.entry(defect.class_code.clone()).or_default() += 1;
        }
        counts
    }

    /// Die position on the wafer: row scaled by the X pitch, column by the Y
    /// pitch.
    pub fn die_center(&self, die: &Die) -> (f64, f64) {
        (
            die.row as f64 * self.header.die_pitch_x,
            die.column as f64 * self.header.die_pitch_y,
        )
    }

    /// Defect position in wafer coordinates.
    pub fn defect_position(&self, defect: &Defect) -> (f64, f64) {
        let (x, y) = self.die_center(&Die {
            row: defect.row,
            column: defect.column,
        });
        (x + defect.x_rel, y + defect.y_rel)
    }

    /// The defect image file, resolved against the KLARF file's directory.
    /// `None` when the header names no TIFF file.
    pub fn tiff_path(&self) -> Option<PathBuf> {
        if self.header.tiff_filename.is_empty() {
            return None;
        }
        let dir = self.file.path.parent().map(PathBuf::from).unwrap_or_default();
        Some(dir.join(&self.header.tiff_filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn defect(id: &str, row: i64, column: i64, class_code: &str) -> Defect {
        Defect {
            id: id.to_string(),
            x_rel: 1.5,
            y_rel: 2.5,
            row,
            column,
            size: 1.0,
            class_code: class_code.to_string(),
            extended: None,
        }
    }

    fn sample() -> KlarfDocument {
        let mut doc = KlarfDocument::new();
        doc.dies = vec![
            Die { row: 1, column: 1 },
            Die { row: 1, column: 2 },
            Die { row: 2, column: 1 },
        ];
        doc.defects = vec![
            defect("1", 1, 2, "7"),
            defect("2", 1, 2, "3"),
            defect("3", 5, 5, "7"),
        ];
        doc
    }

    #[test]
    fn test_counts() {
        let doc = sample();
        assert_eq!(doc.total_dies(), 3);
        assert_eq!(doc.total_defects(), 3);
        assert_eq!(doc.defect_count(&Die { row: 1, column: 2 }), 2);
        assert_eq!(doc.defect_count(&Die { row: 1, column: 1 }), 0);
    }

    #[test]
    fn test_good_and_bad() {
        let doc = sample();
        assert!(doc.is_good(&doc.dies[0]));
        assert!(!doc.is_good(&doc.dies[1]));
        assert_eq!(doc.good_dies(), vec![Die { row: 1, column: 1 }, Die { row: 2, column: 1 }]);
        assert_eq!(doc.bad_dies(), vec![Die { row: 1, column: 2 }]);
    }

    #[test]
    fn test_adding_defect_flips_classification() {
        let mut doc = sample();
        let die = doc.dies[0];
        assert!(doc.is_good(&die));

        doc.defects.push(defect("4", 1, 1, "9"));
        assert!(!doc.is_good(&die));
        assert_eq!(doc.dies[0], Die { row: 1, column: 1 });
    }

    #[test]
    fn test_summaries_follow_plan_order() {
        let doc = sample();
        let summaries = doc.die_summaries();
        assert_eq!(summaries.len(), 3);
        assert_eq!(summaries[1].die, Die { row: 1, column: 2 });
        assert_eq!(summaries[1].defect_count, 2);
        assert!(!summaries[1].is_good);
        assert!(summaries[2].is_good);
    }

    #[test]
    fn test_defect_outside_plan_is_kept() {
        let doc = sample();
        assert_eq!(doc.defects_in(5, 5).count(), 1);
        let total: usize = doc.die_summaries().iter().map(|s| s.defect_count).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn test_classes() {
        let doc = sample();
        let ids: Vec<&str> = doc.defects_by_class("7").map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        let counts = doc.class_counts();
        assert_eq!(counts.get("7"), Some(&2));
        assert_eq!(counts.get("3"), Some(&1));
    }

    #[test]
    fn test_positions() {
        let mut doc = sample();
        doc.header.die_pitch_x = 100.0;
        doc.header.die_pitch_y = 50.0;
        assert_eq!(doc.die_center(&Die { row: 2, column: 3 }), (200.0, 150.0));
        assert_eq!(doc.defect_position(&doc.defects[0]), (101.5, 102.5));
    }

    #[test]
    fn test_tiff_path() {
        let mut doc = sample();
        assert_eq!(doc.tiff_path(), None);

        doc.header.tiff_filename = "images.tif".to_string();
        doc.file.path = PathBuf::from("/data/lot1/wafer.klarf");
        assert_eq!(doc.tiff_path().as_deref(), Some(Path::new("/data/lot1/images.tif")));
    }
}

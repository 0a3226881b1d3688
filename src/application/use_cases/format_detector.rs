use crate::domain::layout::{DetectedLayout, DetectionMethod, LayoutSignature};
use crate::domain::settings::{IngestionSettings, MAX_HEADER_SCAN_ROWS};
use crate::domain::sheet::{occupied_width, row_is_blank, RawRow};

use super::layout_rules::LayoutRules;

/// Result of scoring a sheet's leading rows
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Detected(DetectedLayout),
    /// No non-empty cell in the sampled rows
    Empty,
    /// Nothing qualified and the sheet is too narrow for a positional guess
    Unknown { columns: usize },
}

/// Picks the layout of a sheet from its first rows.
///
/// Pure: the same rows and rules always produce the same answer.
pub struct FormatDetector<'a> {
    rules: &'a LayoutRules,
    scan_rows: usize,
    detailed_min_columns: usize,
    min_columns: usize,
}

impl<'a> FormatDetector<'a> {
    pub fn new(rules: &'a LayoutRules, settings: &IngestionSettings) -> Self {
        Self {
            rules,
            scan_rows: settings.header_scan_rows.clamp(1, MAX_HEADER_SCAN_ROWS),
            detailed_min_columns: settings.detailed_min_columns,
            min_columns: settings.min_columns,
        }
    }

    pub fn scan_rows(&self) -> usize {
        self.scan_rows
    }

    /// Detect the layout from the sheet's leading rows. Rows past the scan
    /// window are ignored.
    pub fn detect(&self, rows: &[RawRow]) -> Detection {
        let sample = &rows[..rows.len().min(self.scan_rows)];
        if sample.iter().all(|row| row_is_blank(row)) {
            return Detection::Empty;
        }

        let haystack = search_text(sample);
        let mut best: Option<(&LayoutSignature, usize)> = None;
        for signature in self.rules.signatures() {
            let Some(score) = score_signature(signature, &haystack) else {
                continue;
            };
            // Strictly greater: the earlier registration keeps ties.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((signature, score));
            }
        }

        if let Some((signature, score)) = best {
            return Detection::Detected(DetectedLayout {
                name: signature.name.clone(),
                method: DetectionMethod::Keywords { score },
            });
        }

        self.positional_guess(sample)
    }

    fn positional_guess(&self, sample: &[RawRow]) -> Detection {
        let columns = sample
            .iter()
            .map(|row| occupied_width(row))
            .max()
            .unwrap_or(0);

        let name = if columns >= self.detailed_min_columns {
            self.rules.detailed_fallback()
        } else if columns >= self.min_columns {
            self.rules.simple_fallback()
        } else {
            return Detection::Unknown { columns };
        };

        Detection::Detected(DetectedLayout {
            name: name.to_string(),
            method: DetectionMethod::Positional { columns },
        })
    }
}

/// Upper-cased concatenation of every non-empty cell in the sample
pub fn search_text(rows: &[RawRow]) -> String {
    let mut out = String::new();
    for row in rows {
        for cell in row {
            if let Some(text) = cell.as_text() {
                out.push_str(&text.to_uppercase());
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out
}

/// Keyword hits for one signature, or `None` when it does not qualify
pub fn score_signature(signature: &LayoutSignature, haystack: &str) -> Option<usize> {
    if signature
        .required_keywords
        .iter()
        .any(|k| !haystack.contains(k.as_str()))
    {
        return None;
    }
    let hits = signature
        .keywords()
        .filter(|k| haystack.contains(k.as_str()))
        .count();
    (hits >= signature.min_matches).then_some(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::layout_rules::{
        BANK_BRANCH_LAYOUT, ENHANCED_LAYOUT, SIMPLE_LAYOUT,
    };
    use crate::domain::sheet::RawSheet;
    use std::collections::BTreeMap;

    fn detect(rows: &[&[&str]]) -> Detection {
        let rules = LayoutRules::builtin();
        let settings = IngestionSettings::default();
        let sheet = RawSheet::from_strings("s", rows);
        FormatDetector::new(&rules, &settings).detect(&sheet.rows)
    }

    fn name_of(detection: &Detection) -> &str {
        match detection {
            Detection::Detected(layout) => &layout.name,
            other => panic!("expected detection, got {:?}", other),
        }
    }

    #[test]
    fn test_enhanced_header_detected_by_keywords() {
        let d = detect(&[
            &["Pensioner details - Assam circle"],
            &[
                "S.No",
                "PPO No",
                "Year of Birth",
                "PSA",
                "Disbursing Branch",
                "Branch Pincode",
                "Pensioner Address",
                "Pensioner Pincode",
            ],
        ]);
        assert_eq!(name_of(&d), ENHANCED_LAYOUT);
        if let Detection::Detected(layout) = d {
            assert!(!layout.is_positional());
        }
    }

    #[test]
    fn test_simple_header_detected() {
        let d = detect(&[&["Sl", "PPO Number", "Date of Birth", "Address"]]);
        assert_eq!(name_of(&d), SIMPLE_LAYOUT);
    }

    #[test]
    fn test_bank_header_detected() {
        let d = detect(&[&["Branch", "PPO", "DOB", "Account", "IFSC"]]);
        assert_eq!(name_of(&d), BANK_BRANCH_LAYOUT);
    }

    #[test]
    fn test_unmatched_wide_sheet_falls_back_to_enhanced() {
        let d = detect(&[
            &["A", "B", "C", "D", "E", "F", "G", "H"],
            &["1", "x", "y", "z", "w", "v", "u", "t"],
        ]);
        assert_eq!(name_of(&d), ENHANCED_LAYOUT);
        assert_eq!(
            d,
            Detection::Detected(DetectedLayout {
                name: ENHANCED_LAYOUT.to_string(),
                method: DetectionMethod::Positional { columns: 8 },
            })
        );
    }

    #[test]
    fn test_unmatched_narrow_sheet_falls_back_to_simple() {
        let d = detect(&[&["A", "B", "C"]]);
        assert_eq!(name_of(&d), SIMPLE_LAYOUT);
    }

    #[test]
    fn test_single_column_is_unknown_and_blank_is_empty() {
        assert_eq!(detect(&[&["just a note"]]), Detection::Unknown { columns: 1 });
        assert_eq!(detect(&[&["", ""], &[]]), Detection::Empty);
    }

    #[test]
    fn test_rows_past_window_are_ignored() {
        let rules = LayoutRules::builtin();
        let mut settings = IngestionSettings::default();
        settings.header_scan_rows = 1;
        let sheet = RawSheet::from_strings("s", &[&["x"], &["PPO No", "Date of Birth", "Address"]]);
        let d = FormatDetector::new(&rules, &settings).detect(&sheet.rows);
        assert_eq!(d, Detection::Unknown { columns: 1 });
    }

    #[test]
    fn test_ties_go_to_first_registered() {
        let twin = |name: &str| LayoutSignature {
            name: name.to_string(),
            required_keywords: vec!["TREASURY".to_string()],
            optional_keywords: vec!["CODE".to_string()],
            min_matches: 2,
            positions: BTreeMap::from([(crate::domain::layout::CanonicalField::PpoNumber, 0)]),
        };
        let rules = LayoutRules::builtin()
            .with_signatures(vec![twin("first"), twin("second")])
            .unwrap();
        let settings = IngestionSettings::default();
        let sheet = RawSheet::from_strings("s", &[&["Treasury", "Code"]]);
        let d = FormatDetector::new(&rules, &settings).detect(&sheet.rows);
        assert_eq!(name_of(&d), "first");
    }

    #[test]
    fn test_required_keyword_gate() {
        let rules = LayoutRules::builtin();
        let enhanced = rules.signature(ENHANCED_LAYOUT).unwrap();
        let text = "BIRTH PSA BRANCH PINCODE STATE DISTRICT";
        assert_eq!(score_signature(enhanced, text), None);
        assert_eq!(score_signature(enhanced, &format!("PPO {}", text)), Some(7));
    }
}

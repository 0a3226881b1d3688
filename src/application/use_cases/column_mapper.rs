use std::collections::BTreeMap;

use crate::domain::error::{AppError, Result};
use crate::domain::layout::{CanonicalField, DetectedLayout};
use crate::domain::settings::{IngestionSettings, MAX_HEADER_SCAN_ROWS};
use crate::domain::sheet::{occupied_width, CellValue, RawRow};

use super::layout_rules::{normalize_header, LayoutRules};

/// Where each canonical field lives in one sheet
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub layout: String,
    columns: BTreeMap<CanonicalField, usize>,

    /// Index of the (last) header row, when one was found
    pub header_row: Option<usize>,

    /// First row holding data
    pub data_start: usize,

    /// True when the layout's positional table was applied
    pub positional: bool,
}

impl ColumnMapping {
    pub fn column(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    /// Cell for a field in a data row; `None` when unmapped or out of range
    pub fn cell<'r>(&self, row: &'r [CellValue], field: CanonicalField) -> Option<&'r CellValue> {
        self.column(field)
            .and_then(|idx| row.get(idx))
            .filter(|c| !c.is_empty())
    }

    pub fn resolved(&self) -> impl Iterator<Item = (CanonicalField, usize)> + '_ {
        self.columns.iter().map(|(f, i)| (*f, *i))
    }

    pub fn has(&self, field: CanonicalField) -> bool {
        self.columns.contains_key(&field)
    }
}

/// Header row located in a sheet, after multi-row merging
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBlock {
    pub row: usize,
    pub labels: Vec<String>,
    pub columns: BTreeMap<CanonicalField, usize>,
}

/// Resolves canonical fields to physical columns: header names first,
/// the layout's positional table when too few names resolve.
pub struct ColumnMapper<'a> {
    rules: &'a LayoutRules,
    min_name_match_ratio: f32,
    scan_rows: usize,
}

impl<'a> ColumnMapper<'a> {
    pub fn new(rules: &'a LayoutRules, settings: &IngestionSettings) -> Self {
        Self {
            rules,
            min_name_match_ratio: settings.min_name_match_ratio,
            scan_rows: settings.header_scan_rows.clamp(1, MAX_HEADER_SCAN_ROWS),
        }
    }

    pub fn map(&self, layout: &DetectedLayout, rows: &[RawRow]) -> Result<ColumnMapping> {
        let signature = self.rules.signature(&layout.name).ok_or_else(|| {
            AppError::NotFound(format!("Layout not registered: {}", layout.name))
        })?;

        let header = self.locate_header(rows);
        let by_name = header
            .as_ref()
            .map(|h| h.columns.clone())
            .unwrap_or_default();

        let expected = signature.positions.len().max(1);
        let named = signature
            .positions
            .keys()
            .filter(|f| by_name.contains_key(f))
            .count();
        let ratio = named as f32 / expected as f32;

        let positional = header.is_none() || ratio < self.min_name_match_ratio;
        let columns = if positional {
            let width = rows.iter().map(|r| occupied_width(r)).max().unwrap_or(0);
            signature
                .positions
                .iter()
                .filter(|(_, idx)| **idx < width)
                .map(|(f, idx)| (*f, *idx))
                .collect()
        } else {
            by_name
        };

        let header_row = header.as_ref().map(|h| h.row);
        // A weak "header" under a positional mapping may be a data row
        // whose text happens to contain alias words.
        let data_start = match header_row {
            Some(row) if !positional => row + 1,
            _ => first_keyed_row(rows, columns.get(&CanonicalField::PpoNumber).copied()),
        };

        Ok(ColumnMapping {
            layout: layout.name.clone(),
            columns,
            header_row,
            data_start,
            positional,
        })
    }

    /// Find the sampled row naming the most canonical fields, merging a
    /// group label row above it when that resolves at least as well.
    pub fn locate_header(&self, rows: &[RawRow]) -> Option<HeaderBlock> {
        let sample = &rows[..rows.len().min(self.scan_rows)];

        let mut best: Option<(usize, Vec<String>, BTreeMap<CanonicalField, usize>)> = None;
        for (idx, row) in sample.iter().enumerate() {
            let labels = row_labels(row);
            let columns = self.resolve_by_name(&labels);
            if !qualifies_as_header(row, columns.len()) {
                continue;
            }
            if best.as_ref().map_or(true, |(_, _, b)| columns.len() > b.len()) {
                best = Some((idx, labels, columns));
            }
        }

        let (row, labels, columns) = best?;
        if row > 0 && is_group_label_row(&rows[row - 1]) {
            let merged = merge_labels(&rows[row - 1], &labels);
            let merged_columns = self.resolve_by_name(&merged);
            if merged_columns.len() >= columns.len() {
                return Some(HeaderBlock {
                    row,
                    labels: merged,
                    columns: merged_columns,
                });
            }
        }

        Some(HeaderBlock {
            row,
            labels,
            columns,
        })
    }

    /// Name-based resolution. Fields are tried in resolution order; each
    /// takes the leftmost unclaimed column that names it.
    pub fn resolve_by_name(&self, labels: &[String]) -> BTreeMap<CanonicalField, usize> {
        let normalized: Vec<String> = labels.iter().map(|l| normalize_header(l)).collect();
        let mut claimed = vec![false; normalized.len()];
        let mut columns = BTreeMap::new();

        for aliases in self.rules.aliases() {
            for (idx, label) in normalized.iter().enumerate() {
                if claimed[idx] || !aliases.matches(label) {
                    continue;
                }
                claimed[idx] = true;
                columns.insert(aliases.field, idx);
                break;
            }
        }

        columns
    }
}

fn row_labels(row: &[CellValue]) -> Vec<String> {
    row.iter()
        .map(|c| c.as_text().unwrap_or_default())
        .collect()
}

fn is_text_cell(cell: &CellValue) -> bool {
    !cell.is_empty() && !cell.is_numeric() && !matches!(cell, CellValue::Date(_))
}

// A lone hit only counts on an all-text row; data rows carry numbers.
fn qualifies_as_header(row: &[CellValue], hits: usize) -> bool {
    match hits {
        0 => false,
        1 => row.iter().all(|c| c.is_empty() || is_text_cell(c)),
        _ => true,
    }
}

fn is_group_label_row(row: &[CellValue]) -> bool {
    row.iter().filter(|c| is_text_cell(c)).count() >= 2
}

/// Prefix child labels with the group label above them. Merged group
/// cells arrive as one value followed by blanks, so the value is carried
/// right until the next non-empty group cell.
fn merge_labels(group_row: &[CellValue], labels: &[String]) -> Vec<String> {
    let mut carried: Option<String> = None;
    labels
        .iter()
        .enumerate()
        .map(|(idx, label)| {
            if let Some(text) = group_row.get(idx).and_then(|c| c.as_text()) {
                carried = Some(text);
            }
            match (&carried, label.is_empty()) {
                (Some(group), false) if !label_contains(label, group) => {
                    format!("{} {}", group, label)
                }
                (Some(group), true) => group.clone(),
                _ => label.clone(),
            }
        })
        .collect()
}

fn label_contains(label: &str, group: &str) -> bool {
    normalize_header(label).contains(&normalize_header(group))
}

/// First row whose key cell is mostly digits. Title rows, blank rows and
/// generic labels such as `Col2` above header-less data are skipped.
fn first_keyed_row(rows: &[RawRow], key_column: Option<usize>) -> usize {
    let Some(key) = key_column else {
        return 0;
    };
    rows.iter()
        .position(|row| {
            row.get(key)
                .and_then(|c| c.as_text())
                .map_or(false, |t| is_numeric_key(&t))
        })
        .unwrap_or(rows.len())
}

fn is_numeric_key(text: &str) -> bool {
    let digits = text.chars().filter(|c| c.is_ascii_digit()).count();
    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    digits > 0 && digits > letters
}

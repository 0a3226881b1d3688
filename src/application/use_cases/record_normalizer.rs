use crate::domain::layout::CanonicalField;
use crate::domain::outcome::{FieldGaps, SkipReason};
use crate::domain::pensioner::{AuthorityParts, OutputField, PensionerRecord};
use crate::domain::pincode::PincodeDirectory;
use crate::domain::settings::NormalizationSettings;
use crate::domain::sheet::CellValue;

use super::column_mapper::ColumnMapping;
use super::field_extractors::{
    age_category, clean_pincode, compute_age, extract_birth_year, extract_pincode,
    extract_state_district, parse_authority,
};

/// Turns raw rows of one sheet into canonical records.
///
/// Holds only borrowed, read-only context, so one instance serves every
/// row of a sheet.
pub struct RecordNormalizer<'a> {
    mapping: &'a ColumnMapping,
    settings: &'a NormalizationSettings,
    directory: Option<&'a PincodeDirectory>,
    reference_year: i32,
    source_file: &'a str,
    source_sheet: &'a str,
}

#[derive(Debug, Default)]
struct Location {
    state: Option<String>,
    district: Option<String>,
}

impl<'a> RecordNormalizer<'a> {
    pub fn new(
        mapping: &'a ColumnMapping,
        settings: &'a NormalizationSettings,
        reference_year: i32,
        source_file: &'a str,
        source_sheet: &'a str,
    ) -> Self {
        Self {
            mapping,
            settings,
            directory: None,
            reference_year,
            source_file,
            source_sheet,
        }
    }

    pub fn with_directory(mut self, directory: Option<&'a PincodeDirectory>) -> Self {
        self.directory = directory.filter(|d| !d.is_empty());
        self
    }

    /// Normalize one row. Only a missing natural key rejects the row;
    /// every other field is best-effort.
    pub fn normalize(
        &self,
        row: &[CellValue],
    ) -> std::result::Result<(PensionerRecord, FieldGaps), SkipReason> {
        let natural_key = self
            .text(row, CanonicalField::PpoNumber)
            .filter(|k| is_plausible_key(k))
            .ok_or(SkipReason::MissingNaturalKey)?;

        let mut gaps = FieldGaps::default();

        let birth_cell = self.mapping.cell(row, CanonicalField::BirthDate);
        let birth_year =
            birth_cell.and_then(|c| extract_birth_year(c, self.reference_year));
        gaps.birth_year = birth_cell.is_some() && birth_year.is_none();
        let age = compute_age(birth_year, self.reference_year);

        // Configured values replace source values before anything is
        // derived from them, so sub-fields always agree with their parent.
        let sanctioning_authority = self.configured(
            OutputField::SanctioningAuthority,
            self.text(row, CanonicalField::SanctioningAuthority),
        );
        let authority = sanctioning_authority
            .as_deref()
            .map(parse_authority)
            .unwrap_or_else(AuthorityParts::default);

        let branch_address = self.text(row, CanonicalField::BranchAddress);
        let (branch_pincode, _) = self.pincode(
            row,
            CanonicalField::BranchPincode,
            branch_address.as_deref(),
        );
        let disbursing_branch_pincode =
            self.configured(OutputField::DisbursingBranchPincode, branch_pincode);

        let pensioner_address = self.text(row, CanonicalField::PensionerAddress);
        let (found_pincode, pincode_gap) = self.pincode(
            row,
            CanonicalField::PensionerPincode,
            pensioner_address.as_deref(),
        );
        gaps.pincode = pincode_gap;
        let pensioner_pincode = self.configured(OutputField::PensionerPincode, found_pincode);

        let declared = Location {
            state: self.overridden(OutputField::PensionerState).or_else(|| {
                self.text(row, CanonicalField::PensionerState)
                    .map(|s| s.to_uppercase())
            }),
            district: self.overridden(OutputField::PensionerDistrict).or_else(|| {
                self.text(row, CanonicalField::PensionerDistrict)
                    .map(|s| s.to_uppercase())
            }),
        };
        let pensioner = self.locate(
            declared,
            pensioner_pincode.as_deref(),
            pensioner_address.as_deref(),
        );
        let branch = self.locate(
            Location {
                state: self.overridden(OutputField::BranchState),
                district: self.overridden(OutputField::BranchDistrict),
            },
            disbursing_branch_pincode.as_deref(),
            branch_address.as_deref(),
        );

        let record = PensionerRecord {
            natural_key,
            birth_year,
            age,
            age_category: age_category(age),
            sanctioning_authority,
            authority,
            disbursing_branch_pincode,
            pensioner_pincode,
            pensioner_state: self.configured(OutputField::PensionerState, pensioner.state),
            pensioner_district: self.configured(OutputField::PensionerDistrict, pensioner.district),
            branch_state: self.configured(OutputField::BranchState, branch.state),
            branch_district: self.configured(OutputField::BranchDistrict, branch.district),
            batch_label: self.configured(
                OutputField::BatchLabel,
                self.settings.batch_label.clone(),
            ),
            source_file: self.source_file.to_string(),
            source_sheet: self.source_sheet.to_string(),
        };

        Ok((record, gaps))
    }

    fn text(&self, row: &[CellValue], field: CanonicalField) -> Option<String> {
        self.mapping.cell(row, field).and_then(|c| c.as_text())
    }

    /// Pincode from its own column, else from the related address text.
    /// The flag is set when source text existed but held no valid pincode.
    fn pincode(
        &self,
        row: &[CellValue],
        field: CanonicalField,
        address: Option<&str>,
    ) -> (Option<String>, bool) {
        let cell = self.mapping.cell(row, field);
        let found = cell
            .and_then(clean_pincode)
            .or_else(|| address.and_then(extract_pincode));
        let had_source = cell.is_some() || address.is_some();
        let gap = found.is_none() && had_source;
        (found, gap)
    }

    /// Fill whatever the row did not declare: directory first, then the
    /// free-text address.
    fn locate(
        &self,
        mut location: Location,
        pincode: Option<&str>,
        address: Option<&str>,
    ) -> Location {
        if location.state.is_some() && location.district.is_some() {
            return location;
        }

        if let Some(entry) = pincode.and_then(|p| self.directory.and_then(|d| d.lookup(p))) {
            location.state.get_or_insert_with(|| entry.state.to_uppercase());
            location
                .district
                .get_or_insert_with(|| entry.district.to_uppercase());
            return location;
        }

        if let Some(address) = address {
            let (state, district) = extract_state_district(address, &self.settings.known_states);
            if location.state.is_none() {
                location.state = state;
            }
            if location.district.is_none() {
                location.district = district;
            }
        }
        location
    }

    fn overridden(&self, field: OutputField) -> Option<String> {
        self.settings.field_overrides.get(&field).cloned()
    }

    /// Override, else the current value, else the default fill
    fn configured(&self, field: OutputField, current: Option<String>) -> Option<String> {
        self.overridden(field)
            .or(current)
            .or_else(|| self.settings.default_fill.get(&field).cloned())
    }
}

/// PPO numbers always carry digits; repeated header rows and totals lines
/// (`PPO No`, `Grand Total`) do not.
fn is_plausible_key(key: &str) -> bool {
    !key.trim().is_empty() && key.bytes().any(|b| b.is_ascii_digit())
}

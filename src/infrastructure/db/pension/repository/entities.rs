use crate::domain::error::{AppError, Result};
use crate::domain::pensioner::{AgeCategory, AuthorityParts, PensionerRecord};
use crate::domain::pincode::PincodeEntry;
use crate::domain::summary::{GroupingDimension, SummaryBucket, SummaryKey};

#[derive(sqlx::FromRow)]
pub(super) struct PensionerEntity {
    ppo_number: String,
    birth_year: Option<i64>,
    age: Option<i64>,
    age_category: String,
    sanctioning_authority: Option<String>,
    authority_type: Option<String>,
    authority_division: Option<String>,
    authority_area: Option<String>,
    authority_pincode: Option<String>,
    disbursing_branch_pincode: Option<String>,
    pensioner_pincode: Option<String>,
    pensioner_state: Option<String>,
    pensioner_district: Option<String>,
    branch_state: Option<String>,
    branch_district: Option<String>,
    batch_label: Option<String>,
    source_file: String,
    source_sheet: String,
}

impl TryFrom<PensionerEntity> for PensionerRecord {
    type Error = AppError;

    fn try_from(entity: PensionerEntity) -> Result<Self> {
        Ok(Self {
            natural_key: entity.ppo_number,
            birth_year: entity.birth_year.map(|y| y as i32),
            age: entity.age.map(|a| a as i32),
            age_category: parse_category(&entity.age_category)?,
            sanctioning_authority: entity.sanctioning_authority,
            authority: AuthorityParts {
                authority_type: entity.authority_type,
                authority_division: entity.authority_division,
                authority_area: entity.authority_area,
                authority_pincode: entity.authority_pincode,
            },
            disbursing_branch_pincode: entity.disbursing_branch_pincode,
            pensioner_pincode: entity.pensioner_pincode,
            pensioner_state: entity.pensioner_state,
            pensioner_district: entity.pensioner_district,
            branch_state: entity.branch_state,
            branch_district: entity.branch_district,
            batch_label: entity.batch_label,
            source_file: entity.source_file,
            source_sheet: entity.source_sheet,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct SummaryRowEntity {
    pub(super) dimension_value: String,
    pub(super) age_category: String,
    pub(super) count: i64,
}

impl SummaryRowEntity {
    pub(super) fn into_bucket(self, dimension: GroupingDimension) -> Result<SummaryBucket> {
        Ok(SummaryBucket {
            key: SummaryKey {
                dimension,
                value: self.dimension_value,
                age_category: parse_category(&self.age_category)?,
            },
            count: self.count.max(0) as u64,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct PincodeEntity {
    pincode: String,
    state: String,
    district: String,
    office_name: Option<String>,
}

impl From<PincodeEntity> for PincodeEntry {
    fn from(entity: PincodeEntity) -> Self {
        Self {
            pincode: entity.pincode,
            state: entity.state,
            district: entity.district,
            office_name: entity.office_name,
        }
    }
}

pub(super) fn parse_category(value: &str) -> Result<AgeCategory> {
    value
        .parse::<AgeCategory>()
        .map_err(|e| AppError::ParseError(format!("Stored age category: {}", e)))
}

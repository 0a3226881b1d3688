// Declarative layout configuration for pensioner sheets.
//
// Everything that differs between source formats lives here as data:
// keyword signatures for detection, header phrase aliases per canonical
// field, and positional tables for sheets whose headers are missing or
// renamed. Adding a source format means adding a signature, not code.

use std::collections::BTreeMap;

use crate::domain::error::{AppError, Result};
use crate::domain::layout::{CanonicalField, LayoutSignature};
use crate::domain::settings::Settings;

pub const ENHANCED_LAYOUT: &str = "enhanced";
pub const SIMPLE_LAYOUT: &str = "simple";
pub const BANK_BRANCH_LAYOUT: &str = "bank_branch";

// NOTE:
// - Aliases are matched against a normalized header (lowercase, runs of
//   non-alphanumerics collapsed to one space).
// - An alias matches when it appears as a whole-word phrase.
// - Excludes stop generic aliases from grabbing branch/authority columns.

const PPO_ALIASES: &[&str] = &[
    "ppo no",
    "ppo number",
    "ppo num",
    "ppo id",
    "pension payment order",
    "ppo",
];

const BIRTH_ALIASES: &[&str] = &[
    "date of birth",
    "year of birth",
    "birth year",
    "birth date",
    "dob",
    "yob",
    "d o b",
    "birth",
];

const AUTHORITY_ALIASES: &[&str] = &[
    "pension sanctioning authority",
    "sanctioning authority",
    "sanction authority",
    "psa",
];

const BRANCH_PINCODE_ALIASES: &[&str] = &[
    "disbursing branch pincode",
    "branch pincode",
    "branch pin code",
    "branch pin",
    "bank pincode",
    "bank pin code",
];

const BRANCH_ADDRESS_ALIASES: &[&str] = &[
    "disbursing branch",
    "disbursing bank",
    "branch address",
    "branch name",
    "bank branch",
    "branch",
];

const PENSIONER_PINCODE_ALIASES: &[&str] = &[
    "pensioner pincode",
    "pensioner pin code",
    "pensioner pin",
    "pincode",
    "pin code",
    "postal code",
    "pin",
];

const PENSIONER_STATE_ALIASES: &[&str] = &["pensioner state", "state name", "state"];

const PENSIONER_DISTRICT_ALIASES: &[&str] =
    &["pensioner district", "district name", "district", "dist"];

const PENSIONER_ADDRESS_ALIASES: &[&str] = &[
    "pensioner address",
    "residential address",
    "postal address",
    "address",
    "addr",
];

const BRANCH_SIDE_EXCLUDES: &[&str] = &["branch", "bank", "psa", "authority"];

/// Header phrases that identify one canonical field
#[derive(Debug, Clone)]
pub struct FieldAliases {
    pub field: CanonicalField,
    pub aliases: Vec<String>,
    pub excludes: Vec<String>,
}

impl FieldAliases {
    fn new(field: CanonicalField, aliases: &[&str], excludes: &[&str]) -> Self {
        Self {
            field,
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            excludes: excludes.iter().map(|e| e.to_string()).collect(),
        }
    }

    /// Whether a normalized header names this field
    pub fn matches(&self, normalized_header: &str) -> bool {
        if normalized_header.is_empty() {
            return false;
        }
        if self
            .excludes
            .iter()
            .any(|e| contains_phrase(normalized_header, e))
        {
            return false;
        }
        self.aliases
            .iter()
            .any(|a| contains_phrase(normalized_header, a))
    }
}

/// Lowercase and collapse every run of non-alphanumerics to one space.
/// `PPO_No.` and `ppo-no` both become `ppo no`.
pub fn normalize_header(s: &str) -> String {
    let lowered: String = s
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whole-word phrase containment on normalized text
pub fn contains_phrase(normalized_header: &str, phrase: &str) -> bool {
    let phrase = normalize_header(phrase);
    if phrase.is_empty() {
        return false;
    }
    if normalized_header == phrase {
        return true;
    }
    let padded = format!(" {} ", normalized_header);
    padded.contains(&format!(" {} ", phrase))
}

/// The full set of layout rules used by detection and mapping
#[derive(Debug, Clone)]
pub struct LayoutRules {
    signatures: Vec<LayoutSignature>,
    aliases: Vec<FieldAliases>,
    detailed_fallback: String,
    simple_fallback: String,
}

impl LayoutRules {
    /// Built-in signatures and aliases, in declaration order
    pub fn builtin() -> Self {
        Self {
            signatures: builtin_signatures(),
            aliases: builtin_aliases(),
            detailed_fallback: ENHANCED_LAYOUT.to_string(),
            simple_fallback: SIMPLE_LAYOUT.to_string(),
        }
    }

    /// Built-ins extended with the layouts and aliases declared in settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::builtin()
            .with_signatures(settings.layouts.clone())?
            .with_extra_aliases(&settings.normalization.extra_aliases)
    }

    /// Register extra signatures after the existing ones. Later
    /// registrations lose ties, so built-ins keep priority.
    pub fn with_signatures(mut self, extra: Vec<LayoutSignature>) -> Result<Self> {
        for signature in extra {
            signature
                .validate()
                .map_err(|e| AppError::ConfigError(format!("Invalid layout: {}", e)))?;
            if self.signature(&signature.name).is_some() {
                return Err(AppError::ConfigError(format!(
                    "Duplicate layout name: {}",
                    signature.name
                )));
            }
            self.signatures.push(normalize_signature(signature));
        }
        Ok(self)
    }

    /// Append extra header phrases. They are tried after the built-in ones.
    pub fn with_extra_aliases(
        mut self,
        extra: &BTreeMap<CanonicalField, Vec<String>>,
    ) -> Result<Self> {
        for (field, phrases) in extra {
            let entry = self
                .aliases
                .iter_mut()
                .find(|a| a.field == *field)
                .ok_or_else(|| {
                    AppError::ConfigError(format!("No alias table for field {}", field))
                })?;
            for phrase in phrases {
                let phrase = normalize_header(phrase);
                if phrase.is_empty() {
                    return Err(AppError::ConfigError(format!(
                        "Blank alias configured for {}",
                        field
                    )));
                }
                if !entry.aliases.contains(&phrase) {
                    entry.aliases.push(phrase);
                }
            }
        }
        Ok(self)
    }

    pub fn signatures(&self) -> &[LayoutSignature] {
        &self.signatures
    }

    pub fn signature(&self, name: &str) -> Option<&LayoutSignature> {
        self.signatures.iter().find(|s| s.name == name)
    }

    pub fn aliases(&self) -> &[FieldAliases] {
        &self.aliases
    }

    /// Layout used for unrecognised sheets at or above the detailed width
    pub fn detailed_fallback(&self) -> &str {
        &self.detailed_fallback
    }

    pub fn simple_fallback(&self) -> &str {
        &self.simple_fallback
    }

    /// First canonical field (in resolution order) a header names
    pub fn detect_field(&self, header: &str) -> Option<CanonicalField> {
        let normalized = normalize_header(header);
        self.aliases
            .iter()
            .find(|a| a.matches(&normalized))
            .map(|a| a.field)
    }
}

fn normalize_signature(mut signature: LayoutSignature) -> LayoutSignature {
    let upper = |v: Vec<String>| -> Vec<String> {
        v.into_iter()
            .map(|k| k.trim().to_uppercase())
            .filter(|k| !k.is_empty())
            .collect()
    };
    signature.required_keywords = upper(signature.required_keywords);
    signature.optional_keywords = upper(signature.optional_keywords);
    signature
}

fn keywords(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}

fn builtin_signatures() -> Vec<LayoutSignature> {
    use CanonicalField::*;

    vec![
        // Detailed portal export: serial, PPO, birth, PSA, branch, branch pin,
        // pensioner address, pensioner pin.
        LayoutSignature {
            name: ENHANCED_LAYOUT.to_string(),
            required_keywords: keywords(&["PPO"]),
            optional_keywords: keywords(&[
                "BIRTH",
                "PSA",
                "SANCTIONING",
                "DISBURSING",
                "BRANCH",
                "PENSIONER ADDRESS",
                "PINCODE",
                "STATE",
                "DISTRICT",
            ]),
            min_matches: 5,
            positions: BTreeMap::from([
                (PpoNumber, 1),
                (BirthDate, 2),
                (SanctioningAuthority, 3),
                (BranchAddress, 4),
                (BranchPincode, 5),
                (PensionerAddress, 6),
                (PensionerPincode, 7),
            ]),
        },
        // Short list: serial, PPO, birth, address with embedded pincode.
        LayoutSignature {
            name: SIMPLE_LAYOUT.to_string(),
            required_keywords: keywords(&["PPO"]),
            optional_keywords: keywords(&["BIRTH", "ADDRESS", "PIN"]),
            min_matches: 2,
            positions: BTreeMap::from([
                (PpoNumber, 1),
                (BirthDate, 2),
                (PensionerAddress, 3),
                (PensionerPincode, 4),
            ]),
        },
        // Bank branch returns: branch first, then PPO and pensioner details.
        LayoutSignature {
            name: BANK_BRANCH_LAYOUT.to_string(),
            required_keywords: keywords(&["PPO", "BRANCH"]),
            optional_keywords: keywords(&["IFSC", "ACCOUNT", "BANK", "DOB"]),
            min_matches: 3,
            positions: BTreeMap::from([
                (BranchAddress, 0),
                (PpoNumber, 1),
                (BirthDate, 2),
                (PensionerAddress, 3),
                (BranchPincode, 4),
            ]),
        },
    ]
}

fn builtin_aliases() -> Vec<FieldAliases> {
    use CanonicalField::*;

    // Order follows CanonicalField::ALL; a column claimed by an earlier
    // field is not offered to later ones.
    vec![
        FieldAliases::new(PpoNumber, PPO_ALIASES, &[]),
        FieldAliases::new(BirthDate, BIRTH_ALIASES, &[]),
        FieldAliases::new(SanctioningAuthority, AUTHORITY_ALIASES, &[]),
        FieldAliases::new(BranchPincode, BRANCH_PINCODE_ALIASES, &[]),
        FieldAliases::new(
            BranchAddress,
            BRANCH_ADDRESS_ALIASES,
            &["pin", "pincode", "state", "district", "dist"],
        ),
        FieldAliases::new(
            PensionerPincode,
            PENSIONER_PINCODE_ALIASES,
            &["branch", "bank", "psa", "authority", "address"],
        ),
        FieldAliases::new(PensionerState, PENSIONER_STATE_ALIASES, BRANCH_SIDE_EXCLUDES),
        FieldAliases::new(
            PensionerDistrict,
            PENSIONER_DISTRICT_ALIASES,
            BRANCH_SIDE_EXCLUDES,
        ),
        FieldAliases::new(
            PensionerAddress,
            PENSIONER_ADDRESS_ALIASES,
            BRANCH_SIDE_EXCLUDES,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  PPO_No. "), "ppo no");
        assert_eq!(normalize_header("Date-of-Birth"), "date of birth");
        assert_eq!(normalize_header("***"), "");
    }

    #[test]
    fn test_phrase_match_needs_word_boundary() {
        assert!(contains_phrase("pensioner pin code", "pin code"));
        assert!(contains_phrase("pin", "pin"));
        assert!(!contains_phrase("spinning", "pin"));
        assert!(!contains_phrase("pincode", "pin"));
    }

    #[test]
    fn test_detect_field_respects_excludes() {
        let rules = LayoutRules::builtin();
        assert_eq!(rules.detect_field("PPO No"), Some(CanonicalField::PpoNumber));
        assert_eq!(rules.detect_field("Branch Pincode"), Some(CanonicalField::BranchPincode));
        assert_eq!(rules.detect_field("Pincode"), Some(CanonicalField::PensionerPincode));
        assert_eq!(
            rules.detect_field("Address with Pincode"),
            Some(CanonicalField::PensionerAddress)
        );
        assert_eq!(rules.detect_field("Branch State"), None);
        assert_eq!(rules.detect_field("Branch District"), None);
        assert_eq!(rules.detect_field("Branch Dist"), None);
        assert_eq!(rules.detect_field("Branch Name"), Some(CanonicalField::BranchAddress));
        assert_eq!(rules.detect_field("Name"), None);
    }

    #[test]
    fn test_builtins_are_valid_and_ordered() {
        let rules = LayoutRules::builtin();
        let names: Vec<&str> = rules.signatures().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![ENHANCED_LAYOUT, SIMPLE_LAYOUT, BANK_BRANCH_LAYOUT]);
        for s in rules.signatures() {
            assert!(s.validate().is_ok(), "{} invalid", s.name);
        }
    }

    #[test]
    fn test_extra_signature_registration() {
        let extra = LayoutSignature {
            name: "treasury".to_string(),
            required_keywords: vec!["treasury".to_string()],
            optional_keywords: vec!["ppo".to_string()],
            min_matches: 2,
            positions: BTreeMap::from([(CanonicalField::PpoNumber, 0)]),
        };
        let rules = LayoutRules::builtin()
            .with_signatures(vec![extra.clone()])
            .unwrap();
        let registered = rules.signature("treasury").unwrap();
        assert_eq!(registered.required_keywords, vec!["TREASURY".to_string()]);
        assert_eq!(rules.signatures().last().unwrap().name, "treasury");

        let dup = LayoutRules::builtin()
            .with_signatures(vec![extra.clone(), extra])
            .unwrap_err();
        assert!(matches!(dup, AppError::ConfigError(_)));
    }

    #[test]
    fn test_extra_aliases_extend_matching() {
        let extra = BTreeMap::from([(
            CanonicalField::PpoNumber,
            vec!["Pension ID".to_string()],
        )]);
        let rules = LayoutRules::builtin().with_extra_aliases(&extra).unwrap();
        assert_eq!(rules.detect_field("PENSION-ID"), Some(CanonicalField::PpoNumber));
    }
}

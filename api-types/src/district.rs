//! District identifier validation.
//!
//! Grounded on the predefined-regex pattern from the teacher's
//! `pbs-api-types::common_regex` module: a small set of `Regex`es built once
//! behind `once_cell::sync::Lazy` and reused across the crate.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Districts are identified by a short alphanumeric code (e.g. "42", "F").
pub static DISTRICT_ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());

/// Matches upstream "as of" footer strings that sometimes leak into the
/// district id column, e.g. `As of 1/20/2026`.
pub static AS_OF_DATE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^As of \d{1,2}/\d{1,2}/\d{4}$").unwrap());

/// A validated district identifier.
///
/// Constructing one always goes through [`DistrictId::parse`], so a
/// `DistrictId` appearing anywhere downstream (cache, snapshot, index) is
/// guaranteed to satisfy the id invariant in the data model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DistrictId(String);

impl DistrictId {
    pub fn parse(raw: &str) -> Result<Self, DistrictIdError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DistrictIdError::Empty);
        }
        if AS_OF_DATE_REGEX.is_match(trimmed) {
            return Err(DistrictIdError::AsOfDate(trimmed.to_string()));
        }
        if !DISTRICT_ID_REGEX.is_match(trimmed) {
            return Err(DistrictIdError::NotAlphanumeric(trimmed.to_string()));
        }
        Ok(DistrictId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DistrictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DistrictId {
    type Err = DistrictIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistrictId::parse(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DistrictIdError {
    #[error("district id is empty or whitespace-only")]
    Empty,
    #[error("district id '{0}' looks like an \"as of\" date footer")]
    AsOfDate(String),
    #[error("district id '{0}' contains non-alphanumeric characters")]
    NotAlphanumeric(String),
}

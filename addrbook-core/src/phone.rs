use crate::error::{AddrBookError, Result};
use phonenumber::{Mode, country};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_REGION: &str = "RU";

const MIN_LENGTH: usize = 7;
const MAX_LENGTH: usize = 64;

/// A phone number in canonical E.164 form (`+79991234567`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneError {
    #[error("phone number must be between {min} and {max} characters long")]
    Length { min: usize, max: usize },

    #[error("value is not a valid phone number: {0}")]
    Parse(String),

    #[error("value is not a valid phone number")]
    Invalid,

    #[error("phone number region is not supported: {0}")]
    UnsupportedRegion(String),
}

impl PhoneError {
    /// Stable machine-readable tag for API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PhoneError::Length { .. } => "value_error.phone.length",
            PhoneError::Parse(_) => "value_error.phone.parse",
            PhoneError::Invalid => "value_error.phone.invalid",
            PhoneError::UnsupportedRegion(_) => "value_error.phone.region",
        }
    }
}

/// Normalizes raw input into [`Phone`] for a fixed set of regions.
///
/// Numbers written without a country code are read in the numbering plan of
/// `default_region`.
#[derive(Debug, Clone)]
pub struct PhoneValidator {
    default_region: country::Id,
    supported_regions: Vec<country::Id>,
}

impl Default for PhoneValidator {
    fn default() -> Self {
        Self {
            default_region: country::Id::RU,
            supported_regions: vec![country::Id::RU],
        }
    }
}

impl PhoneValidator {
    pub fn new(default_region: &str, supported_regions: &[String]) -> Result<Self> {
        let default_region = parse_region(default_region)?;

        let supported_regions = supported_regions
            .iter()
            .map(|code| parse_region(code))
            .collect::<Result<Vec<_>>>()?;

        if supported_regions.is_empty() {
            return Err(AddrBookError::Config(
                "at least one supported phone region is required".to_string(),
            ));
        }

        Ok(Self {
            default_region,
            supported_regions,
        })
    }

    pub fn validate(&self, raw: &str) -> std::result::Result<Phone, PhoneError> {
        let trimmed = raw.trim();
        let length = trimmed.chars().count();
        if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
            return Err(PhoneError::Length {
                min: MIN_LENGTH,
                max: MAX_LENGTH,
            });
        }

        let number = phonenumber::parse(Some(self.default_region), trimmed)
            .map_err(|error| PhoneError::Parse(error.to_string()))?;

        if !phonenumber::is_valid(&number) {
            return Err(PhoneError::Invalid);
        }

        let country = number.country();
        match country.id() {
            Some(id) if self.supported_regions.contains(&id) => {}
            Some(id) => return Err(PhoneError::UnsupportedRegion(format!("{:?}", id))),
            None => return Err(PhoneError::UnsupportedRegion(format!("+{}", country.code()))),
        }

        Ok(Phone(number.format().mode(Mode::E164).to_string()))
    }
}

fn parse_region(code: &str) -> Result<country::Id> {
    let normalized = code.trim().to_ascii_uppercase();
    normalized
        .parse::<country::Id>()
        .map_err(|_| AddrBookError::Config(format!("unknown phone region: '{}'", code)))
}

//! FHIR specification versions.

use crate::{FhirError, FhirResult};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// A FHIR specification version, such as `4.0.1`.
///
/// Only the strict three-part numeric form is accepted: no labels (`4.0.1-beta`), no partial
/// versions (`4.0`), no surrounding text. Ordering compares major, then minor, then patch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FhirVersion {
    major: u32,
    minor: u32,
    patch: u32,
}

impl FhirVersion {
    /// FHIR R4.
    pub const R4: FhirVersion = FhirVersion::new(4, 0, 1);
    /// FHIR R4B.
    pub const R4B: FhirVersion = FhirVersion::new(4, 3, 0);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a `major.minor.patch` version string.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidVersion`] naming the input if it does not match
    /// `^[0-9]+\.[0-9]+\.[0-9]+$` or if a component does not fit in a `u32`.
    pub fn parse(input: &str) -> FhirResult<Self> {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE.get_or_init(|| {
            Regex::new(r"^([0-9]+)\.([0-9]+)\.([0-9]+)$").expect("version regex must compile")
        });

        let invalid = || FhirError::InvalidVersion(input.to_owned());
        let caps = re.captures(input).ok_or_else(invalid)?;
        let component = |i: usize| -> FhirResult<u32> {
            caps.get(i)
                .ok_or_else(invalid)?
                .as_str()
                .parse::<u32>()
                .map_err(|_| invalid())
        };

        Ok(Self::new(component(1)?, component(2)?, component(3)?))
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for FhirVersion {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FhirVersion::parse(s)
    }
}

impl serde::Serialize for FhirVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for FhirVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FhirVersion::parse(&s).map_err(serde::de::Error::custom)
    }
}

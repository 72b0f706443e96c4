//! FHIR resource types recognised by the medical store.

use crate::FhirError;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

/// The closed set of FHIR resource types the store can recognise.
///
/// The integer codes are part of the persisted format. [`FhirResourceType::Unknown`] (code `0`)
/// is the sentinel for any `resourceType` string outside the set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FhirResourceType {
    Unknown = 0,
    Immunization = 1,
    AllergyIntolerance = 2,
    Observation = 3,
    Condition = 4,
}

impl FhirResourceType {
    /// Every recognised type, excluding the unknown sentinel.
    pub const KNOWN: [FhirResourceType; 4] = [
        FhirResourceType::Immunization,
        FhirResourceType::AllergyIntolerance,
        FhirResourceType::Observation,
        FhirResourceType::Condition,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Looks up a type by its integer code. Returns `None` for codes outside the enumeration.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Immunization),
            2 => Some(Self::AllergyIntolerance),
            3 => Some(Self::Observation),
            4 => Some(Self::Condition),
            _ => None,
        }
    }

    /// Canonical upper-case name, as used in lookups and identity derivation.
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Immunization => "IMMUNIZATION",
            Self::AllergyIntolerance => "ALLERGYINTOLERANCE",
            Self::Observation => "OBSERVATION",
            Self::Condition => "CONDITION",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl fmt::Display for FhirResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<FhirResourceType> for i32 {
    fn from(value: FhirResourceType) -> Self {
        value.code()
    }
}

impl TryFrom<i32> for FhirResourceType {
    type Error = FhirError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        FhirResourceType::from_code(code).ok_or_else(|| {
            FhirError::InvalidInput(format!("unknown FHIR resource type code {code}"))
        })
    }
}

impl serde::Serialize for FhirResourceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> serde::Deserialize<'de> for FhirResourceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = i32::deserialize(deserializer)?;
        FhirResourceType::try_from(code).map_err(serde::de::Error::custom)
    }
}

/// Maps free-form `resourceType` strings to [`FhirResourceType`] codes.
///
/// This is a zero-sized type used for namespacing. The lookup table is built once on first use
/// and never mutated afterwards.
pub struct FhirResourceTypeMapper;

impl FhirResourceTypeMapper {
    fn table() -> &'static HashMap<&'static str, FhirResourceType> {
        static TABLE: OnceLock<HashMap<&'static str, FhirResourceType>> = OnceLock::new();
        TABLE.get_or_init(|| {
            FhirResourceType::KNOWN
                .iter()
                .map(|t| (t.name(), *t))
                .collect()
        })
    }

    /// Maps a `resourceType` string to its type, ignoring ASCII case.
    ///
    /// Strings outside the recognised set map to [`FhirResourceType::Unknown`]; this never
    /// fails. Whether a recognised type is *storable* is decided by the validator.
    pub fn to_type(resource_type: &str) -> FhirResourceType {
        Self::table()
            .get(resource_type.to_ascii_uppercase().as_str())
            .copied()
            .unwrap_or(FhirResourceType::Unknown)
    }

    /// Integer-code form of [`FhirResourceTypeMapper::to_type`].
    pub fn to_int(resource_type: &str) -> i32 {
        Self::to_type(resource_type).code()
    }
}

//! Medical resource types: the store's own classification of clinical data.

use fhir::FhirResourceType;
use std::fmt;

/// The kinds of medical data the store can hold.
///
/// Integer codes are part of the persisted format. [`MedicalResourceType::Unknown`] is never
/// stored; it only appears when decoding an unrecognised code from a caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MedicalResourceType {
    Unknown = 0,
    Immunization = 1,
}

impl MedicalResourceType {
    /// Every storable type.
    pub const SUPPORTED: [MedicalResourceType; 1] = [MedicalResourceType::Immunization];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Immunization),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Immunization => "IMMUNIZATION",
        }
    }

    /// Looks up a type by name, ignoring ASCII case. Used by the CLI and REST layers.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Which medical resource type a FHIR resource type is stored as.
    ///
    /// Only part of the recognised FHIR types are storable today. Adding one means adding a
    /// variant above and moving its arm out of the `None` group.
    pub fn for_fhir_resource_type(fhir_type: FhirResourceType) -> Option<Self> {
        match fhir_type {
            FhirResourceType::Immunization => Some(Self::Immunization),
            // Recognised but not yet supported.
            FhirResourceType::AllergyIntolerance
            | FhirResourceType::Observation
            | FhirResourceType::Condition => None,
            FhirResourceType::Unknown => None,
        }
    }
}

impl fmt::Display for MedicalResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl serde::Serialize for MedicalResourceType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> serde::Deserialize<'de> for MedicalResourceType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = i32::deserialize(deserializer)?;
        MedicalResourceType::from_code(code).ok_or_else(|| {
            serde::de::Error::custom(format!("unknown medical resource type code {code}"))
        })
    }
}

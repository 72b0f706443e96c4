//! FHIR boundary support for medical records.
//!
//! This crate handles the parts of FHIR that the medical store needs to understand about raw,
//! app-supplied JSON, without modelling full FHIR resources:
//! - [`FhirVersion`]: strict `major.minor.patch` version values
//! - [`FhirResourceType`] and [`FhirResourceTypeMapper`]: case-insensitive mapping from the
//!   `resourceType` field to a closed set of type codes
//! - [`FhirResource`]: a validated (type, id, raw JSON) triple with a display projection
//! - [`RawFhirFormatter`]: a pretty-printer and structural JSON check for displaying raw data
//!
//! Structural FHIR schema validation is not performed here.

pub mod formatter;
pub mod resource;
pub mod resource_type;
pub mod version;

pub use formatter::RawFhirFormatter;
pub use resource::FhirResource;
pub use resource_type::{FhirResourceType, FhirResourceTypeMapper};
pub use version::FhirVersion;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid FHIR version string: '{0}'")]
    InvalidVersion(String),

    #[error("invalid FHIR resource: {0}")]
    InvalidResource(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

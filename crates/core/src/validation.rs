//! Input validation for medical data.
//!
//! [`MedicalResourceValidator`] turns an app-supplied upsert request into an
//! [`UpsertMedicalResourceInternalRequest`]. The remaining functions guard data source fields
//! before they are stored.

use crate::constants::{
    MAX_DATA_SOURCE_DISPLAY_NAME_LENGTH, MAX_FHIR_BASE_URI_LENGTH, SUPPORTED_FHIR_VERSIONS,
};
use crate::error::ValidationError;
use crate::medical_resource::UpsertMedicalResourceInternalRequest;
use crate::medical_resource_type::MedicalResourceType;
use crate::{MedicalError, MedicalResult};
use fhir::{FhirResourceType, FhirResourceTypeMapper, FhirVersion};
use hc_types::NonEmptyText;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// An upsert request as received from an app.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UpsertMedicalResourceRequest {
    pub data_source_id: String,
    /// Declared FHIR version, `major.minor.patch`.
    pub fhir_version: String,
    /// Raw FHIR resource JSON.
    pub data: String,
}

impl UpsertMedicalResourceRequest {
    pub fn new(
        data_source_id: impl Into<String>,
        fhir_version: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            fhir_version: fhir_version.into(),
            data: data.into(),
        }
    }
}

/// Structural validation of a FHIR resource beyond its identity fields.
///
/// No implementation ships with the store; one can be installed with
/// [`MedicalResourceValidator::with_structure_check`].
pub trait FhirStructureCheck: Send + Sync {
    /// Returns a human-readable reason when `resource` is not acceptable.
    fn check(
        &self,
        resource_type: FhirResourceType,
        fhir_version: FhirVersion,
        resource: &Map<String, Value>,
    ) -> Result<(), String>;
}

#[derive(Clone, Default)]
pub struct MedicalResourceValidator {
    structure_check: Option<Arc<dyn FhirStructureCheck>>,
}

impl std::fmt::Debug for MedicalResourceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MedicalResourceValidator")
            .field("structure_check", &self.structure_check.is_some())
            .finish()
    }
}

impl MedicalResourceValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_structure_check(structure_check: Arc<dyn FhirStructureCheck>) -> Self {
        Self {
            structure_check: Some(structure_check),
        }
    }

    /// Validates one upsert request.
    ///
    /// Checks run in a fixed order and stop at the first failure, so the error always names the
    /// earliest problem. The data source id is passed through unchecked; existence and
    /// ownership are the store's concern.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of the first failing check.
    pub fn validate(
        &self,
        request: &UpsertMedicalResourceRequest,
    ) -> Result<UpsertMedicalResourceInternalRequest, ValidationError> {
        let parsed: Value = serde_json::from_str(&request.data)
            .map_err(|e| ValidationError::InvalidJson(e.to_string()))?;
        let object = match &parsed {
            Value::Object(map) => Some(map),
            Value::Array(_) => None,
            _ => {
                return Err(ValidationError::InvalidJson(
                    "expected a JSON object".into(),
                ))
            }
        };

        let id = object
            .and_then(|o| o.get("id"))
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingId)?;

        let resource_type = object
            .and_then(|o| o.get("resourceType"))
            .and_then(Value::as_str)
            .ok_or_else(|| ValidationError::MissingResourceType { id: id.to_owned() })?;

        if id.is_empty() {
            return Err(ValidationError::EmptyId);
        }

        let fhir_version = FhirVersion::parse(&request.fhir_version).map_err(|_| {
            ValidationError::InvalidFhirVersion {
                version: request.fhir_version.clone(),
                id: id.to_owned(),
            }
        })?;
        if !SUPPORTED_FHIR_VERSIONS.contains(&fhir_version) {
            return Err(ValidationError::UnsupportedFhirVersion {
                version: fhir_version.to_string(),
                id: id.to_owned(),
            });
        }

        let fhir_resource_type = FhirResourceTypeMapper::to_type(resource_type);
        if fhir_resource_type == FhirResourceType::Unknown {
            return Err(ValidationError::UnsupportedResourceType {
                resource_type: resource_type.to_owned(),
                id: id.to_owned(),
            });
        }

        let medical_resource_type = MedicalResourceType::for_fhir_resource_type(
            fhir_resource_type,
        )
        .ok_or_else(|| ValidationError::UnmappedResourceType {
            resource_type: resource_type.to_owned(),
            id: id.to_owned(),
        })?;

        if let (Some(check), Some(object)) = (&self.structure_check, object) {
            check
                .check(fhir_resource_type, fhir_version, object)
                .map_err(|reason| ValidationError::StructureViolation {
                    id: id.to_owned(),
                    reason,
                })?;
        }

        Ok(UpsertMedicalResourceInternalRequest {
            medical_resource_type,
            fhir_resource_id: id.to_owned(),
            fhir_resource_type,
            data_source_id: request.data_source_id.clone(),
            fhir_version,
            data: request.data.clone(),
        })
    }
}

/// Validates a data source display name and returns it trimmed.
///
/// # Errors
///
/// Returns [`MedicalError::Text`] if the name is blank or longer than
/// [`MAX_DATA_SOURCE_DISPLAY_NAME_LENGTH`] characters.
pub fn validate_data_source_display_name(display_name: &str) -> MedicalResult<NonEmptyText> {
    Ok(NonEmptyText::with_max_len(
        display_name,
        MAX_DATA_SOURCE_DISPLAY_NAME_LENGTH,
    )?)
}

/// Validates that a FHIR base URI is safe to store and hand back to other apps.
///
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to avoid pathological inputs
/// - Requires ASCII with no whitespace or control characters
/// - Requires an `http` or `https` scheme with a non-empty remainder
///
/// # Errors
///
/// Returns [`MedicalError::InvalidInput`] if the URI is invalid.
pub fn validate_fhir_base_uri(uri: &str) -> MedicalResult<()> {
    if uri.trim().is_empty() {
        return Err(MedicalError::InvalidInput(
            "FHIR base URI cannot be empty".into(),
        ));
    }

    if uri.len() > MAX_FHIR_BASE_URI_LENGTH {
        return Err(MedicalError::InvalidInput(format!(
            "FHIR base URI exceeds maximum length of {} characters",
            MAX_FHIR_BASE_URI_LENGTH
        )));
    }

    if !uri.is_ascii() {
        return Err(MedicalError::InvalidInput(
            "FHIR base URI must contain only ASCII characters".into(),
        ));
    }

    if uri.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(MedicalError::InvalidInput(
            "FHIR base URI cannot contain whitespace or control characters".into(),
        ));
    }

    let rest = uri
        .strip_prefix("https://")
        .or_else(|| uri.strip_prefix("http://"));
    match rest {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(MedicalError::InvalidInput(format!(
            "FHIR base URI must be an http or https URI, got: '{}'",
            uri
        ))),
    }
}

//! Medical resources: the validated upsert form and the stored form.

use crate::medical_resource_type::MedicalResourceType;
use fhir::{FhirResource, FhirResourceType, FhirVersion};
use hc_uuid::{derive_medical_resource_uuid, UuidService};
use serde::{Deserialize, Serialize};

/// The identity triple a medical resource's UUID is derived from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MedicalResourceId {
    pub data_source_id: String,
    pub fhir_resource_type: FhirResourceType,
    pub fhir_resource_id: String,
}

impl MedicalResourceId {
    pub fn new(
        data_source_id: impl Into<String>,
        fhir_resource_type: FhirResourceType,
        fhir_resource_id: impl Into<String>,
    ) -> Self {
        Self {
            data_source_id: data_source_id.into(),
            fhir_resource_type,
            fhir_resource_id: fhir_resource_id.into(),
        }
    }

    /// The storage identity. Uses the canonical upper-case FHIR type name.
    pub fn uuid(&self) -> UuidService {
        UuidService::from_uuid(derive_medical_resource_uuid(
            &self.fhir_resource_id,
            self.fhir_resource_type.name(),
            &self.data_source_id,
        ))
    }
}

/// A validated upsert request, ready to be written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpsertMedicalResourceInternalRequest {
    pub medical_resource_type: MedicalResourceType,
    pub fhir_resource_id: String,
    pub fhir_resource_type: FhirResourceType,
    /// Passed through from the caller unchanged.
    pub data_source_id: String,
    pub fhir_version: FhirVersion,
    /// The raw FHIR JSON, exactly as submitted.
    pub data: String,
}

impl UpsertMedicalResourceInternalRequest {
    pub fn id(&self) -> MedicalResourceId {
        MedicalResourceId::new(
            self.data_source_id.clone(),
            self.fhir_resource_type,
            self.fhir_resource_id.clone(),
        )
    }

    pub fn uuid(&self) -> UuidService {
        self.id().uuid()
    }
}

/// A stored medical resource.
///
/// The raw FHIR data is the persisted representation; [`MedicalResource::display_name`] is
/// derived from it on demand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicalResource {
    pub id: UuidService,
    pub medical_resource_type: MedicalResourceType,
    pub data_source_id: UuidService,
    pub fhir_version: FhirVersion,
    pub fhir_resource: FhirResource,
    /// Epoch millis of the last upsert; also the ordering timestamp for paginated reads.
    pub last_modified_time_millis: i64,
}

impl MedicalResource {
    pub fn display_name(&self) -> String {
        self.fhir_resource.display_name()
    }
}

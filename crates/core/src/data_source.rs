//! Medical data sources: provenance records that medical resources belong to.

use hc_types::{NonEmptyText, PackageName};
use hc_uuid::UuidService;
use serde::{Deserialize, Serialize};

/// Request to register a new data source for the calling app.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CreateMedicalDataSourceRequest {
    pub fhir_base_uri: String,
    pub display_name: String,
}

impl CreateMedicalDataSourceRequest {
    pub fn new(fhir_base_uri: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            fhir_base_uri: fhir_base_uri.into(),
            display_name: display_name.into(),
        }
    }
}

/// A stored data source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MedicalDataSource {
    pub id: UuidService,
    pub package_name: PackageName,
    pub display_name: NonEmptyText,
    pub fhir_base_uri: String,
    /// Epoch millis of the last upsert or delete of one of this source's resources.
    #[serde(default)]
    pub last_data_update_time_millis: Option<i64>,
}

impl MedicalDataSource {
    pub fn is_owned_by(&self, package_name: &PackageName) -> bool {
        &self.package_name == package_name
    }
}

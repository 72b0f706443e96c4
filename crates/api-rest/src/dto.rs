//! Request and response bodies of the REST API.
//!
//! These are wire types only. Conversions into core types validate as they go and report
//! failures through [`ApiError`].

use crate::error::{ApiError, ApiResult};
use hc_core::{
    DeleteMedicalResourcesRequest, MedicalDataSource, MedicalError, MedicalResource,
    MedicalResourceType, PackageName, ReadMedicalResourcesRequest, ReadMedicalResourcesResponse,
    UpsertMedicalResourceRequest, UuidService,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::{IntoParams, ToSchema};

fn rfc3339(millis: i64) -> Option<String> {
    chrono::DateTime::from_timestamp_millis(millis).map(|dt| dt.to_rfc3339())
}

pub(crate) fn parse_uuid(id: &str) -> ApiResult<UuidService> {
    UuidService::parse(id.trim()).map_err(|e| ApiError::Medical(MedicalError::from(e)))
}

pub(crate) fn parse_uuids<'a>(
    ids: impl IntoIterator<Item = &'a String>,
) -> ApiResult<Vec<UuidService>> {
    ids.into_iter().map(|id| parse_uuid(id)).collect()
}

fn parse_medical_resource_type(name: &str) -> ApiResult<MedicalResourceType> {
    MedicalResourceType::from_name(name).ok_or_else(|| {
        ApiError::BadRequest(format!("unsupported medical resource type: '{}'", name))
    })
}

// ----------------------------------------------------------------------------
// Data sources
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct CreateDataSourceReq {
    pub fhir_base_uri: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DataSourceRes {
    pub id: String,
    pub package_name: String,
    pub display_name: String,
    pub fhir_base_uri: String,
    /// RFC 3339 time of the last change to this source's resources.
    pub last_data_update_time: Option<String>,
}

impl From<MedicalDataSource> for DataSourceRes {
    fn from(source: MedicalDataSource) -> Self {
        Self {
            id: source.id.to_string(),
            package_name: source.package_name.to_string(),
            display_name: source.display_name.into_string(),
            fhir_base_uri: source.fhir_base_uri,
            last_data_update_time: source.last_data_update_time_millis.and_then(rfc3339),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ListDataSourcesRes {
    pub data_sources: Vec<DataSourceRes>,
}

/// Query for `GET /data-sources`. `ids` takes precedence over `packages`.
#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DataSourceQuery {
    /// Comma-separated data source ids.
    pub ids: Option<String>,
    /// Comma-separated package names; empty means every package.
    pub packages: Option<String>,
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// What a [`DataSourceQuery`] selects.
pub(crate) enum DataSourceSelection {
    Ids(BTreeSet<UuidService>),
    Packages(BTreeSet<PackageName>),
}

impl DataSourceQuery {
    pub(crate) fn selection(&self) -> ApiResult<DataSourceSelection> {
        if let Some(ids) = &self.ids {
            let ids = split_list(ids)
                .map(|id| parse_uuid(id))
                .collect::<ApiResult<BTreeSet<_>>>()?;
            return Ok(DataSourceSelection::Ids(ids));
        }

        let packages = split_list(self.packages.as_deref().unwrap_or_default())
            .map(|p| {
                PackageName::parse(p).map_err(|e| ApiError::Medical(MedicalError::from(e)))
            })
            .collect::<ApiResult<BTreeSet<_>>>()?;
        Ok(DataSourceSelection::Packages(packages))
    }
}

// ----------------------------------------------------------------------------
// Medical resources
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct UpsertResourceReq {
    pub data_source_id: String,
    /// Declared FHIR version, e.g. `4.0.1`.
    pub fhir_version: String,
    /// Raw FHIR resource JSON.
    pub data: String,
}

impl From<UpsertResourceReq> for UpsertMedicalResourceRequest {
    fn from(req: UpsertResourceReq) -> Self {
        UpsertMedicalResourceRequest::new(req.data_source_id, req.fhir_version, req.data)
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct UpsertReq {
    pub resources: Vec<UpsertResourceReq>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MedicalResourceRes {
    pub id: String,
    pub medical_resource_type: String,
    pub data_source_id: String,
    pub fhir_version: String,
    pub fhir_resource_type: String,
    pub fhir_resource_id: String,
    pub data: String,
    pub display_name: String,
    pub last_modified_time: Option<String>,
}

impl From<MedicalResource> for MedicalResourceRes {
    fn from(resource: MedicalResource) -> Self {
        Self {
            id: resource.id.to_string(),
            medical_resource_type: resource.medical_resource_type.to_string(),
            data_source_id: resource.data_source_id.to_string(),
            fhir_version: resource.fhir_version.to_string(),
            fhir_resource_type: resource.fhir_resource.resource_type().to_string(),
            fhir_resource_id: resource.fhir_resource.id().to_string(),
            display_name: resource.display_name(),
            data: resource.fhir_resource.data().to_string(),
            last_modified_time: rfc3339(resource.last_modified_time_millis),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MedicalResourcesRes {
    pub medical_resources: Vec<MedicalResourceRes>,
}

impl MedicalResourcesRes {
    pub(crate) fn from_resources(resources: Vec<MedicalResource>) -> Self {
        Self {
            medical_resources: resources.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ReadReq {
    /// Medical resource type name, e.g. `IMMUNIZATION`.
    pub medical_resource_type: String,
    #[serde(default)]
    pub data_source_ids: Vec<String>,
    pub page_size: Option<u32>,
    /// Token from a previous response. Mutually exclusive with `ascending`.
    pub page_token: Option<i64>,
    pub ascending: Option<bool>,
}

impl ReadReq {
    pub(crate) fn into_request(self) -> ApiResult<ReadMedicalResourcesRequest> {
        let mut builder = ReadMedicalResourcesRequest::builder(parse_medical_resource_type(
            &self.medical_resource_type,
        )?)
        .data_source_ids(parse_uuids(&self.data_source_ids)?);

        if let Some(page_size) = self.page_size {
            builder = builder.page_size(page_size);
        }
        if let Some(page_token) = self.page_token {
            builder = builder.page_token(page_token);
        }
        if let Some(ascending) = self.ascending {
            builder = builder.ascending(ascending);
        }
        Ok(builder.build()?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadRes {
    pub medical_resources: Vec<MedicalResourceRes>,
    /// `-1` when there are no more pages.
    pub next_page_token: i64,
    pub remaining_count: usize,
}

impl From<ReadMedicalResourcesResponse> for ReadRes {
    fn from(response: ReadMedicalResourcesResponse) -> Self {
        Self {
            medical_resources: response
                .medical_resources
                .into_iter()
                .map(Into::into)
                .collect(),
            next_page_token: response.next_page_token,
            remaining_count: response.remaining_count,
        }
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct IdsReq {
    pub ids: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DeleteReq {
    #[serde(default)]
    pub data_source_ids: Vec<String>,
    #[serde(default)]
    pub medical_resource_types: Vec<String>,
}

impl DeleteReq {
    pub(crate) fn into_request(self) -> ApiResult<DeleteMedicalResourcesRequest> {
        let types = self
            .medical_resource_types
            .iter()
            .map(|t| parse_medical_resource_type(t))
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(DeleteMedicalResourcesRequest::new(
            parse_uuids(&self.data_source_ids)?,
            types,
        )?)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteRes {
    pub deleted: usize,
}

// ----------------------------------------------------------------------------
// FHIR formatting
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct FormatReq {
    pub data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct FormatRes {
    pub valid_json: bool,
    pub formatted: String,
}

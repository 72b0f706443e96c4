//! Read and delete requests for medical resources.

use crate::constants::{DEFAULT_LONG, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::medical_resource::MedicalResource;
use crate::medical_resource_type::MedicalResourceType;
use crate::page_token::PageTokenWrapper;
use crate::{MedicalError, MedicalResult};
use hc_uuid::UuidService;
use serde::Serialize;
use std::collections::BTreeSet;

/// A paginated read of one medical resource type.
///
/// Built through [`ReadMedicalResourcesRequest::builder`]; a built request is always valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadMedicalResourcesRequest {
    medical_resource_type: MedicalResourceType,
    data_source_ids: BTreeSet<UuidService>,
    page_size: u32,
    page_token: PageTokenWrapper,
}

impl ReadMedicalResourcesRequest {
    pub fn builder(medical_resource_type: MedicalResourceType) -> ReadMedicalResourcesRequestBuilder {
        ReadMedicalResourcesRequestBuilder {
            medical_resource_type,
            data_source_ids: BTreeSet::new(),
            page_size: DEFAULT_PAGE_SIZE,
            page_token: DEFAULT_LONG,
            is_ascending: None,
        }
    }

    pub fn medical_resource_type(&self) -> MedicalResourceType {
        self.medical_resource_type
    }

    /// Data sources to read from. Empty means no data source filter.
    pub fn data_source_ids(&self) -> &BTreeSet<UuidService> {
        &self.data_source_ids
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The decoded page token. Without a token this carries only the sort direction.
    pub fn page_token(&self) -> PageTokenWrapper {
        self.page_token
    }

    pub fn is_ascending(&self) -> bool {
        self.page_token.is_ascending()
    }
}

#[derive(Clone, Debug)]
pub struct ReadMedicalResourcesRequestBuilder {
    medical_resource_type: MedicalResourceType,
    data_source_ids: BTreeSet<UuidService>,
    page_size: u32,
    page_token: i64,
    is_ascending: Option<bool>,
}

impl ReadMedicalResourcesRequestBuilder {
    pub fn data_source_ids(mut self, ids: impl IntoIterator<Item = UuidService>) -> Self {
        self.data_source_ids.extend(ids);
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Resumes from a token returned by a previous read. [`DEFAULT_LONG`] means no token.
    pub fn page_token(mut self, page_token: i64) -> Self {
        self.page_token = page_token;
        self
    }

    /// Sort order by timestamp. Only valid for a first page; later pages follow the token.
    pub fn ascending(mut self, is_ascending: bool) -> Self {
        self.is_ascending = Some(is_ascending);
        self
    }

    /// # Errors
    ///
    /// Returns [`MedicalError::InvalidInput`] for an unknown resource type, a page size outside
    /// `1..=MAX_PAGE_SIZE`, or both a page token and a sort order; and
    /// [`MedicalError::PageToken`] for a negative token.
    pub fn build(self) -> MedicalResult<ReadMedicalResourcesRequest> {
        if self.medical_resource_type == MedicalResourceType::Unknown {
            return Err(MedicalError::InvalidInput(
                "medical resource type must be set".into(),
            ));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(MedicalError::InvalidInput(format!(
                "page size must be between 1 and {}, got: {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }
        if self.page_token != DEFAULT_LONG && self.is_ascending.is_some() {
            return Err(MedicalError::InvalidInput(
                "Cannot set both pageToken and sort order".into(),
            ));
        }

        let page_token =
            PageTokenWrapper::decode(self.page_token, self.is_ascending.unwrap_or(true))?;

        Ok(ReadMedicalResourcesRequest {
            medical_resource_type: self.medical_resource_type,
            data_source_ids: self.data_source_ids,
            page_size: self.page_size,
            page_token,
        })
    }
}

/// One page of a paginated read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReadMedicalResourcesResponse {
    pub medical_resources: Vec<MedicalResource>,
    /// Token for the next page, or [`DEFAULT_LONG`] when this is the last page.
    pub next_page_token: i64,
    /// Matching rows after this page.
    pub remaining_count: usize,
}

/// Deletes the caller's resources matching all non-empty filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteMedicalResourcesRequest {
    data_source_ids: BTreeSet<UuidService>,
    medical_resource_types: BTreeSet<MedicalResourceType>,
}

impl DeleteMedicalResourcesRequest {
    /// # Errors
    ///
    /// Returns [`MedicalError::InvalidInput`] if both filters are empty or a type is unknown.
    pub fn new(
        data_source_ids: impl IntoIterator<Item = UuidService>,
        medical_resource_types: impl IntoIterator<Item = MedicalResourceType>,
    ) -> MedicalResult<Self> {
        let data_source_ids: BTreeSet<_> = data_source_ids.into_iter().collect();
        let medical_resource_types: BTreeSet<_> = medical_resource_types.into_iter().collect();

        if data_source_ids.is_empty() && medical_resource_types.is_empty() {
            return Err(MedicalError::InvalidInput(
                "delete request must set data source ids or medical resource types".into(),
            ));
        }
        if medical_resource_types.contains(&MedicalResourceType::Unknown) {
            return Err(MedicalError::InvalidInput(
                "medical resource type must not be unknown".into(),
            ));
        }

        Ok(Self {
            data_source_ids,
            medical_resource_types,
        })
    }

    pub fn data_source_ids(&self) -> &BTreeSet<UuidService> {
        &self.data_source_ids
    }

    pub fn medical_resource_types(&self) -> &BTreeSet<MedicalResourceType> {
        &self.medical_resource_types
    }

    /// Whether a row passes both filters. An empty filter matches everything.
    pub fn matches(&self, resource: &MedicalResource) -> bool {
        (self.data_source_ids.is_empty() || self.data_source_ids.contains(&resource.data_source_id))
            && (self.medical_resource_types.is_empty()
                || self
                    .medical_resource_types
                    .contains(&resource.medical_resource_type))
    }
}

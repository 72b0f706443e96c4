//! # Health Connect Core
//!
//! Core business logic for storing clinical (FHIR) medical data on behalf of apps.
//!
//! This crate contains pure data operations and file/folder management:
//! - Validation of app-supplied FHIR resources into normalized upsert requests
//! - Content-derived resource identity and permission category / read permission mapping
//! - Opaque page tokens and paginated reads
//! - Medical data sources and resources in sharded JSON storage under `HC_DATA_DIR`
//!
//! **No API concerns**: HTTP servers, authentication and CLI parsing belong in `api-rest` and
//! `hc-cli`.

pub mod config;
pub mod constants;
pub mod data_source;
pub mod error;
pub mod medical_resource;
pub mod medical_resource_type;
pub mod page_token;
pub mod permissions;
pub mod read_request;
pub mod repositories;
pub mod service;
pub mod validation;

pub use config::CoreConfig;
pub use data_source::{CreateMedicalDataSourceRequest, MedicalDataSource};
pub use error::{
    ErrorCategory, MappingError, MedicalError, MedicalResult, PageTokenError, ValidationError,
    ValidationErrorKind,
};
pub use medical_resource::{MedicalResource, MedicalResourceId, UpsertMedicalResourceInternalRequest};
pub use medical_resource_type::MedicalResourceType;
pub use page_token::PageTokenWrapper;
pub use permissions::{
    CallerIdentity, MedicalPermissionCategory, MedicalResourceTypePermissionCategoryMapper,
    MedicalResourceTypePermissionMapper, ReadScope,
};
pub use read_request::{
    DeleteMedicalResourcesRequest, ReadMedicalResourcesRequest, ReadMedicalResourcesResponse,
};
pub use repositories::medical::MedicalStore;
pub use service::MedicalDataService;
pub use validation::{FhirStructureCheck, MedicalResourceValidator, UpsertMedicalResourceRequest};

// Re-exported so callers need not depend on the leaf crates for common types.
pub use fhir::{FhirResource, FhirResourceType, FhirVersion};
pub use hc_types::PackageName;
pub use hc_uuid::UuidService;

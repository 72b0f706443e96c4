/// Reasons an upsert request is rejected by the validation pipeline.
///
/// Every variant is a caller error. Messages name the offending field or value and, once it has
/// been extracted, the FHIR resource id so a failure can be traced within a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
    #[error("missing id field")]
    MissingId,
    #[error("missing resourceType field for resource with id {id}")]
    MissingResourceType { id: String },
    #[error("empty id")]
    EmptyId,
    #[error("invalid FHIR version '{version}' for resource with id {id}")]
    InvalidFhirVersion { version: String, id: String },
    #[error("unsupported FHIR version {version} for resource with id {id}")]
    UnsupportedFhirVersion { version: String, id: String },
    #[error("unsupported resource type {resource_type} for resource with id {id}")]
    UnsupportedResourceType { resource_type: String, id: String },
    #[error(
        "resource type {resource_type} for resource with id {id} could not be mapped to a permissions category"
    )]
    UnmappedResourceType { resource_type: String, id: String },
    #[error("resource with id {id} failed structural validation: {reason}")]
    StructureViolation { id: String, reason: String },
}

/// Coarse classification of caller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The input is not shaped like a FHIR resource.
    MalformedInput,
    /// The input is well-formed but names a version or type the store does not accept.
    UnsupportedValue,
}

impl ValidationError {
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            ValidationError::InvalidJson(_)
            | ValidationError::MissingId
            | ValidationError::MissingResourceType { .. }
            | ValidationError::EmptyId
            | ValidationError::InvalidFhirVersion { .. }
            | ValidationError::StructureViolation { .. } => ValidationErrorKind::MalformedInput,
            ValidationError::UnsupportedFhirVersion { .. }
            | ValidationError::UnsupportedResourceType { .. }
            | ValidationError::UnmappedResourceType { .. } => ValidationErrorKind::UnsupportedValue,
        }
    }
}

/// A lookup in the permission tables found no entry.
///
/// This signals a programming error (a type was accepted upstream but has no mapping), not bad
/// caller input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("medical resource type {0} has no permission category")]
    NoPermissionCategory(i32),
    #[error("permission category {0} has no medical resource type")]
    NoMedicalResourceTypeForCategory(i32),
    #[error("medical resource type {0} has no read permission")]
    NoReadPermission(i32),
    #[error("permission {0} is not a medical read permission")]
    NoMedicalResourceTypeForPermission(String),
}

/// Page token construction and decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PageTokenError {
    #[error("timestamp can not be negative")]
    NegativeTimestamp,
    #[error("offset can not be negative")]
    NegativeOffset,
    #[error("timestamp too large")]
    TimestampTooLarge,
    #[error("pageToken cannot be negative")]
    NegativeToken,
}

#[derive(Debug, thiserror::Error)]
pub enum MedicalError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    PageToken(#[from] PageTokenError),
    #[error("internal mapping error: {0}")]
    Invariant(#[from] MappingError),
    #[error("{offset} resources share timestamp {time_millis}, more than a page token can skip")]
    PageOffsetOverflow { time_millis: i64, offset: i64 },
    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
    #[error("invalid text: {0}")]
    Text(#[from] hc_types::TextError),
    #[error("invalid id: {0}")]
    Uuid(#[from] hc_uuid::UuidError),

    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    NotFound(String),

    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to write medical data file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read medical data file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to remove data source directory: {0}")]
    DirRemoval(std::io::Error),
    #[error("failed to serialize medical data: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize {path}: {message}")]
    Deserialization { path: String, message: String },
    #[error("medical store lock poisoned")]
    LockPoisoned,
}

/// How a [`MedicalError`] should be surfaced to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    MalformedInput,
    UnsupportedValue,
    PermissionDenied,
    NotFound,
    /// Internal inconsistency; alert rather than show to the user.
    InvariantViolation,
    Storage,
}

impl MedicalError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MedicalError::Validation(e) => match e.kind() {
                ValidationErrorKind::MalformedInput => ErrorCategory::MalformedInput,
                ValidationErrorKind::UnsupportedValue => ErrorCategory::UnsupportedValue,
            },
            MedicalError::InvalidInput(_)
            | MedicalError::PageToken(_)
            | MedicalError::Fhir(_)
            | MedicalError::Text(_)
            | MedicalError::Uuid(_) => ErrorCategory::MalformedInput,
            MedicalError::Invariant(_) | MedicalError::PageOffsetOverflow { .. } => {
                ErrorCategory::InvariantViolation
            }
            MedicalError::PermissionDenied(_) => ErrorCategory::PermissionDenied,
            MedicalError::NotFound(_) => ErrorCategory::NotFound,
            MedicalError::StorageDirCreation(_)
            | MedicalError::FileWrite(_)
            | MedicalError::FileRead(_)
            | MedicalError::DirRemoval(_)
            | MedicalError::Serialization(_)
            | MedicalError::Deserialization { .. }
            | MedicalError::LockPoisoned => ErrorCategory::Storage,
        }
    }
}

pub type MedicalResult<T> = std::result::Result<T, MedicalError>;

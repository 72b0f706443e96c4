//! Constants used throughout the core crate.
//!
//! Path and filename constants for the on-disk layout, plus the request limits applied by the
//! medical store.

use fhir::FhirVersion;

/// Default directory for health data storage when no explicit directory is configured.
pub const DEFAULT_DATA_DIR: &str = "health_data";

/// Directory name for medical data sources and their resources.
pub const MEDICAL_DIR_NAME: &str = "medical";

/// Filename holding a data source record inside its sharded directory.
pub const DATA_SOURCE_FILENAME: &str = "data_source.json";

/// Filename holding a data source's medical resources inside its sharded directory.
pub const RESOURCES_FILENAME: &str = "resources.json";

/// FHIR versions accepted for upserted resources (R4 and R4B).
pub const SUPPORTED_FHIR_VERSIONS: [FhirVersion; 2] = [FhirVersion::R4, FhirVersion::R4B];

/// Default cap on the number of data sources one package may own.
pub const DEFAULT_MAX_DATA_SOURCES_PER_PACKAGE: usize = 20;

/// Maximum length of a data source display name, in characters.
pub const MAX_DATA_SOURCE_DISPLAY_NAME_LENGTH: usize = 90;

/// Maximum length of a data source FHIR base URI, in bytes.
pub const MAX_FHIR_BASE_URI_LENGTH: usize = 2000;

/// Page size used when a read request does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;

/// Largest page size a read request may ask for.
pub const MAX_PAGE_SIZE: u32 = 5000;

/// Largest number of ids accepted by a single read-by-ids or delete-by-ids call.
pub const MAX_IDS_PER_REQUEST: usize = 5000;

/// Largest number of resources accepted by a single upsert call.
///
/// Rows written by one upsert share a timestamp, so this also bounds how many rows a page token
/// offset has to skip.
pub const MAX_UPSERT_BATCH_SIZE: usize = 5000;

/// Sentinel meaning "no value" for page tokens.
pub const DEFAULT_LONG: i64 = -1;

//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into core services. The intent is to avoid reading process-wide environment variables
//! during request handling, which can lead to inconsistent behaviour in multi-threaded runtimes
//! and test harnesses.

use crate::constants::{DEFAULT_DATA_DIR, DEFAULT_MAX_DATA_SOURCES_PER_PACKAGE, MEDICAL_DIR_NAME};
use crate::{MedicalError, MedicalResult};
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    max_data_sources_per_package: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalError::InvalidInput`] if `max_data_sources_per_package` is zero.
    pub fn new(data_dir: PathBuf, max_data_sources_per_package: usize) -> MedicalResult<Self> {
        if max_data_sources_per_package == 0 {
            return Err(MedicalError::InvalidInput(
                "max_data_sources_per_package must be at least 1".into(),
            ));
        }

        Ok(Self {
            data_dir,
            max_data_sources_per_package,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Root of the sharded data source directories.
    pub fn medical_dir(&self) -> PathBuf {
        self.data_dir.join(MEDICAL_DIR_NAME)
    }

    pub fn max_data_sources_per_package(&self) -> usize {
        self.max_data_sources_per_package
    }
}

/// Resolve the data directory from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_DATA_DIR`].
pub fn data_dir_from_env_value(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

/// Parse the per-package data source limit from an optional string value.
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_MAX_DATA_SOURCES_PER_PACKAGE`].
///
/// # Errors
///
/// Returns [`MedicalError::InvalidInput`] if the value is not a positive integer.
pub fn max_data_sources_from_env_value(value: Option<String>) -> MedicalResult<usize> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let Some(value) = value else {
        return Ok(DEFAULT_MAX_DATA_SOURCES_PER_PACKAGE);
    };

    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(MedicalError::InvalidInput(format!(
            "max data sources per package must be a positive integer, got: '{}'",
            value
        ))),
    }
}

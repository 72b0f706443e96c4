//! Shared file system utilities for the medical store.
//!
//! ## Key Components
//!
//! - **Directory Operations**: allocating a fresh sharded data source directory
//!   (`create_uuid_and_shard_dir`) and walking the shard tree (`list_shard_leaf_dirs`)
//! - **JSON Files**: staged writes renamed into place together (`stage_json`, `commit_staged`)
//!   and path-aware reads (`read_json`)

use crate::error::{MedicalError, MedicalResult};
use hc_uuid::UuidService;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

/// Creates a unique sharded directory within the medical directory.
///
/// UUIDs are drawn from `uuid_source` until one maps to a directory that does not exist yet,
/// giving up after 5 attempts.
///
/// # Errors
///
/// Returns [`MedicalError::StorageDirCreation`] if the directory or its parents cannot be created.
pub(crate) fn create_uuid_and_shard_dir(
    base_dir: &Path,
    mut uuid_source: impl FnMut() -> UuidService,
) -> MedicalResult<(UuidService, PathBuf)> {
    for _attempt in 0..5 {
        let uuid = uuid_source();
        let candidate = uuid.sharded_dir(base_dir);

        if candidate.exists() {
            continue;
        }

        if let Some(parent) = candidate.parent() {
            fs::create_dir_all(parent).map_err(MedicalError::StorageDirCreation)?;
        }

        match fs::create_dir(&candidate) {
            Ok(()) => return Ok((uuid, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(MedicalError::StorageDirCreation(e)),
        }
    }

    Err(MedicalError::StorageDirCreation(io::Error::new(
        ErrorKind::AlreadyExists,
        "failed to allocate a unique data source directory after 5 attempts",
    )))
}

/// Returns every `<base>/<s1>/<s2>/<leaf>` directory.
///
/// Unreadable directories are skipped. A missing `base_dir` yields an empty list.
pub(crate) fn list_shard_leaf_dirs(base_dir: &Path) -> Vec<PathBuf> {
    fn subdirs(dir: &Path) -> Vec<PathBuf> {
        match fs::read_dir(dir) {
            Ok(it) => it
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    let mut leaves = Vec::new();
    for s1 in subdirs(base_dir) {
        for s2 in subdirs(&s1) {
            leaves.extend(subdirs(&s2));
        }
    }
    leaves.sort();
    leaves
}

/// A JSON file written next to its destination and not yet renamed into place.
#[derive(Debug)]
pub(crate) struct StagedFile {
    tmp_path: PathBuf,
    path: PathBuf,
}

impl StagedFile {
    /// Renames the staged file over its destination.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalError::FileWrite`] if the rename fails. The staged file is removed.
    pub(crate) fn commit(self) -> MedicalResult<()> {
        if let Err(e) = fs::rename(&self.tmp_path, &self.path) {
            let _ = fs::remove_file(&self.tmp_path);
            return Err(MedicalError::FileWrite(e));
        }
        Ok(())
    }

    /// Removes the staged file and leaves the destination untouched.
    pub(crate) fn discard(self) {
        if let Err(e) = fs::remove_file(&self.tmp_path) {
            tracing::warn!(
                "failed to remove staged file {}: {}",
                self.tmp_path.display(),
                e
            );
        }
    }
}

/// Serialises `value` as pretty JSON into a hidden sibling of `path`.
///
/// Nothing at `path` changes until the returned [`StagedFile`] is committed.
///
/// # Errors
///
/// Returns [`MedicalError::Serialization`] or [`MedicalError::FileWrite`].
pub(crate) fn stage_json<T: Serialize>(path: &Path, value: &T) -> MedicalResult<StagedFile> {
    let bytes = serde_json::to_vec_pretty(value).map_err(MedicalError::Serialization)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            MedicalError::FileWrite(io::Error::new(
                ErrorKind::InvalidInput,
                format!("not a file path: {}", path.display()),
            ))
        })?;
    let tmp_path = path.with_file_name(format!(".{file_name}.tmp"));

    if let Err(e) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(MedicalError::FileWrite(e));
    }
    Ok(StagedFile {
        tmp_path,
        path: path.to_path_buf(),
    })
}

/// Commits `files` in order. After the first failure the rest are discarded.
///
/// # Errors
///
/// Returns the first [`MedicalError::FileWrite`].
pub(crate) fn commit_staged(files: impl IntoIterator<Item = StagedFile>) -> MedicalResult<()> {
    let mut files = files.into_iter();
    while let Some(file) = files.next() {
        if let Err(e) = file.commit() {
            files.for_each(StagedFile::discard);
            return Err(e);
        }
    }
    Ok(())
}

/// Reads and deserialises a JSON file.
///
/// This uses `serde_path_to_error` to surface a best-effort "path" (e.g. `rows[3].resource.id`)
/// to the failing field when the file does not match the expected schema.
///
/// # Errors
///
/// Returns [`MedicalError::FileRead`] if the file cannot be read and
/// [`MedicalError::Deserialization`] if it does not match `T`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> MedicalResult<T> {
    let contents = fs::read_to_string(path).map_err(MedicalError::FileRead)?;
    let mut deserializer = serde_json::Deserializer::from_str(&contents);

    serde_path_to_error::deserialize::<_, T>(&mut deserializer).map_err(|err| {
        let field = err.path().to_string();
        let field = if field.is_empty() || field == "." {
            "<root>".to_string()
        } else {
            field
        };
        MedicalError::Deserialization {
            path: path.display().to_string(),
            message: format!("schema mismatch at {field}: {}", err.into_inner()),
        }
    })
}

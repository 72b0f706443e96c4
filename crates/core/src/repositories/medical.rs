//! File-backed store for medical data sources and their resources.
//!
//! Each data source lives in its own sharded directory:
//!
//! ```text
//! <data_dir>/medical/<s1>/<s2>/<data_source_uuid>/
//!     data_source.json
//!     resources.json
//! ```
//!
//! The whole store is loaded into memory on [`MedicalStore::open`]. Reads are served from memory;
//! every mutation writes the affected files through to disk while holding the write lock and only
//! then updates the in-memory tables. A mutation that touches several data sources stages all of
//! their files before renaming any into place.

use crate::config::CoreConfig;
use crate::constants::{DATA_SOURCE_FILENAME, DEFAULT_LONG, RESOURCES_FILENAME};
use crate::data_source::{CreateMedicalDataSourceRequest, MedicalDataSource};
use crate::error::{MedicalError, MedicalResult};
use crate::medical_resource::{MedicalResource, UpsertMedicalResourceInternalRequest};
use crate::page_token::PageTokenWrapper;
use crate::read_request::{
    DeleteMedicalResourcesRequest, ReadMedicalResourcesRequest, ReadMedicalResourcesResponse,
};
use crate::page_token::MAX_OFFSET;
use crate::repositories::shared::{
    commit_staged, create_uuid_and_shard_dir, list_shard_leaf_dirs, read_json, stage_json,
    StagedFile,
};
use crate::validation::{validate_data_source_display_name, validate_fhir_base_uri};
use fhir::FhirResource;
use hc_types::PackageName;
use hc_uuid::UuidService;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A resource together with its insertion position.
///
/// `row_id` is assigned on first insert and kept across overwrites; it breaks timestamp ties.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredRow {
    row_id: u64,
    resource: MedicalResource,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResourcesFile {
    rows: Vec<StoredRow>,
}

#[derive(Clone, Debug)]
struct SourceEntry {
    source: MedicalDataSource,
    rows: HashMap<UuidService, StoredRow>,
}

#[derive(Debug, Default)]
struct Tables {
    sources: BTreeMap<UuidService, SourceEntry>,
    /// Resource id to owning data source id.
    index: HashMap<UuidService, UuidService>,
    next_row_id: u64,
}

impl Tables {
    fn take_row_id(&mut self) -> u64 {
        let id = self.next_row_id;
        self.next_row_id += 1;
        id
    }
}

/// Persistent medical data store.
#[derive(Debug)]
pub struct MedicalStore {
    cfg: Arc<CoreConfig>,
    tables: RwLock<Tables>,
}

impl MedicalStore {
    /// Opens the store under `cfg.medical_dir()`, creating the directory if needed.
    ///
    /// Entries whose files cannot be read or parsed are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalError::StorageDirCreation`] if the medical directory cannot be created.
    pub fn open(cfg: Arc<CoreConfig>) -> MedicalResult<Self> {
        let medical_dir = cfg.medical_dir();
        fs::create_dir_all(&medical_dir).map_err(MedicalError::StorageDirCreation)?;

        let mut tables = Tables {
            next_row_id: 1,
            ..Tables::default()
        };

        for dir in list_shard_leaf_dirs(&medical_dir) {
            match load_entry(&dir) {
                Ok(entry) => {
                    let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                    if entry.source.id.to_string() != dir_name {
                        tracing::warn!(
                            "data source id {} does not match directory {}, skipping",
                            entry.source.id,
                            dir.display()
                        );
                        continue;
                    }
                    for (id, row) in &entry.rows {
                        tables.index.insert(*id, entry.source.id);
                        tables.next_row_id = tables.next_row_id.max(row.row_id + 1);
                    }
                    tables.sources.insert(entry.source.id, entry);
                }
                Err(e) => {
                    tracing::warn!("skipping data source at {}: {}", dir.display(), e);
                }
            }
        }

        tracing::info!(
            "opened medical store at {} with {} data sources and {} resources",
            medical_dir.display(),
            tables.sources.len(),
            tables.index.len()
        );

        Ok(Self {
            cfg,
            tables: RwLock::new(tables),
        })
    }

    fn read_tables(&self) -> MedicalResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| MedicalError::LockPoisoned)
    }

    fn write_tables(&self) -> MedicalResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| MedicalError::LockPoisoned)
    }

    fn source_dir(&self, id: &UuidService) -> PathBuf {
        id.sharded_dir(&self.cfg.medical_dir())
    }

    fn stage(&self, entry: &SourceEntry) -> MedicalResult<Vec<StagedFile>> {
        let dir = self.source_dir(&entry.source.id);

        let mut rows: Vec<StoredRow> = entry.rows.values().cloned().collect();
        rows.sort_by_key(|row| row.row_id);

        let resources = stage_json(&dir.join(RESOURCES_FILENAME), &ResourcesFile { rows })?;
        match stage_json(&dir.join(DATA_SOURCE_FILENAME), &entry.source) {
            Ok(source) => Ok(vec![resources, source]),
            Err(e) => {
                resources.discard();
                Err(e)
            }
        }
    }

    fn persist(&self, entry: &SourceEntry) -> MedicalResult<()> {
        commit_staged(self.stage(entry)?)
    }

    /// Writes every entry to disk, or none of them.
    ///
    /// All files are staged before the first rename. If a rename fails, the sources already
    /// renamed into place are rewritten from `originals`.
    fn persist_all<'a>(
        &self,
        originals: &Tables,
        entries: impl IntoIterator<Item = &'a SourceEntry>,
    ) -> MedicalResult<()> {
        let mut staged: Vec<(UuidService, Vec<StagedFile>)> = Vec::new();
        for entry in entries {
            match self.stage(entry) {
                Ok(files) => staged.push((entry.source.id, files)),
                Err(e) => {
                    staged
                        .into_iter()
                        .flat_map(|(_, files)| files)
                        .for_each(StagedFile::discard);
                    return Err(e);
                }
            }
        }

        let mut committed = Vec::with_capacity(staged.len());
        let mut pending = staged.into_iter();
        while let Some((id, files)) = pending.next() {
            committed.push(id);
            if let Err(e) = commit_staged(files) {
                pending
                    .flat_map(|(_, files)| files)
                    .for_each(StagedFile::discard);
                self.restore(originals, &committed);
                return Err(e);
            }
        }
        Ok(())
    }

    fn restore(&self, originals: &Tables, ids: &[UuidService]) {
        for id in ids {
            let Some(entry) = originals.sources.get(id) else {
                continue;
            };
            if let Err(e) = self.persist(entry) {
                tracing::error!("failed to restore data source {} after a failed write: {}", id, e);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Data sources
    // ------------------------------------------------------------------------

    /// Creates a data source owned by `package_name`.
    ///
    /// # Errors
    ///
    /// Returns an input error for an invalid display name or URI, a display name already used
    /// by the package, or a package at its data source limit; storage errors otherwise.
    pub fn create_data_source(
        &self,
        package_name: &PackageName,
        request: &CreateMedicalDataSourceRequest,
    ) -> MedicalResult<MedicalDataSource> {
        let display_name = validate_data_source_display_name(&request.display_name)?;
        validate_fhir_base_uri(&request.fhir_base_uri)?;

        let mut tables = self.write_tables()?;

        let owned: Vec<&MedicalDataSource> = tables
            .sources
            .values()
            .map(|entry| &entry.source)
            .filter(|source| source.is_owned_by(package_name))
            .collect();

        let limit = self.cfg.max_data_sources_per_package();
        if owned.len() >= limit {
            return Err(MedicalError::InvalidInput(format!(
                "{} already owns the maximum of {} data sources",
                package_name, limit
            )));
        }
        if owned.iter().any(|s| s.display_name == display_name) {
            return Err(MedicalError::InvalidInput(format!(
                "display name already exists: '{}'",
                display_name
            )));
        }

        let (id, dir) = create_uuid_and_shard_dir(&self.cfg.medical_dir(), UuidService::new)?;

        let entry = SourceEntry {
            source: MedicalDataSource {
                id,
                package_name: package_name.clone(),
                display_name,
                fhir_base_uri: request.fhir_base_uri.clone(),
                last_data_update_time_millis: None,
            },
            rows: HashMap::new(),
        };

        if let Err(e) = self.persist(&entry) {
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                tracing::error!(
                    "failed to clean up data source directory {}: {}",
                    dir.display(),
                    cleanup
                );
            }
            return Err(e);
        }

        tracing::info!("created data source {} for {}", id, package_name);

        let source = entry.source.clone();
        tables.sources.insert(id, entry);
        Ok(source)
    }

    /// Returns the data sources with the given ids, in id order. Unknown ids are skipped.
    pub fn get_data_sources_by_ids(
        &self,
        ids: &BTreeSet<UuidService>,
    ) -> MedicalResult<Vec<MedicalDataSource>> {
        let tables = self.read_tables()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.sources.get(id))
            .map(|entry| entry.source.clone())
            .collect())
    }

    /// Returns the data sources owned by any of `packages`, or all of them if `packages` is
    /// empty.
    pub fn get_data_sources_by_packages(
        &self,
        packages: &BTreeSet<PackageName>,
    ) -> MedicalResult<Vec<MedicalDataSource>> {
        let tables = self.read_tables()?;
        Ok(tables
            .sources
            .values()
            .filter(|entry| packages.is_empty() || packages.contains(&entry.source.package_name))
            .map(|entry| entry.source.clone())
            .collect())
    }

    /// Deletes a data source owned by `package_name` together with all of its resources.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalError::NotFound`] if the source does not exist or belongs to another
    /// package, and [`MedicalError::DirRemoval`] if its directory cannot be removed.
    pub fn delete_data_source(
        &self,
        package_name: &PackageName,
        id: &UuidService,
    ) -> MedicalResult<()> {
        let mut tables = self.write_tables()?;

        match tables.sources.get(id) {
            Some(entry) if entry.source.is_owned_by(package_name) => {}
            _ => {
                return Err(MedicalError::NotFound(format!(
                    "data source {} does not exist or belongs to a different app",
                    id
                )))
            }
        }

        fs::remove_dir_all(self.source_dir(id)).map_err(MedicalError::DirRemoval)?;

        if let Some(entry) = tables.sources.remove(id) {
            for resource_id in entry.rows.keys() {
                tables.index.remove(resource_id);
            }
            tracing::info!(
                "deleted data source {} with {} resources",
                id,
                entry.rows.len()
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Medical resources
    // ------------------------------------------------------------------------

    /// Inserts or overwrites a batch of validated resources on behalf of `package_name`.
    ///
    /// The whole batch is checked before anything is written: every data source must exist and
    /// be owned by the caller, and no two requests may derive the same resource id. An existing
    /// row with the same id keeps its insertion position.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalError::InvalidInput`] for a bad batch and storage errors otherwise.
    pub fn upsert(
        &self,
        package_name: &PackageName,
        requests: Vec<UpsertMedicalResourceInternalRequest>,
        now_millis: i64,
    ) -> MedicalResult<Vec<MedicalResource>> {
        let mut tables = self.write_tables()?;

        let mut seen = HashSet::with_capacity(requests.len());
        let mut staged = Vec::with_capacity(requests.len());
        for request in requests {
            let data_source_id = UuidService::parse(&request.data_source_id).map_err(|_| {
                MedicalError::InvalidInput(format!(
                    "invalid data source id: '{}'",
                    request.data_source_id
                ))
            })?;
            match tables.sources.get(&data_source_id) {
                Some(entry) if entry.source.is_owned_by(package_name) => {}
                _ => {
                    return Err(MedicalError::InvalidInput(format!(
                        "data source {} does not exist or belongs to a different app",
                        data_source_id
                    )))
                }
            }

            let id = request.uuid();
            if !seen.insert(id) {
                return Err(MedicalError::InvalidInput(format!(
                    "duplicate resource {} with id {} in one request",
                    request.fhir_resource_type, request.fhir_resource_id
                )));
            }

            let fhir_resource = FhirResource::new(
                request.fhir_resource_type,
                request.fhir_resource_id,
                request.data,
            )?;
            staged.push(MedicalResource {
                id,
                medical_resource_type: request.medical_resource_type,
                data_source_id,
                fhir_version: request.fhir_version,
                fhir_resource,
                last_modified_time_millis: now_millis,
            });
        }

        let mut changed: BTreeMap<UuidService, SourceEntry> = BTreeMap::new();
        let mut row_ids = Vec::with_capacity(staged.len());
        for resource in &staged {
            let existing = tables
                .sources
                .get(&resource.data_source_id)
                .and_then(|entry| entry.rows.get(&resource.id))
                .map(|row| row.row_id);
            let row_id = match existing {
                Some(row_id) => row_id,
                None => tables.take_row_id(),
            };
            row_ids.push(row_id);

            if !changed.contains_key(&resource.data_source_id) {
                if let Some(entry) = tables.sources.get(&resource.data_source_id) {
                    changed.insert(resource.data_source_id, entry.clone());
                }
            }
            if let Some(entry) = changed.get_mut(&resource.data_source_id) {
                entry.rows.insert(
                    resource.id,
                    StoredRow {
                        row_id,
                        resource: resource.clone(),
                    },
                );
                entry.source.last_data_update_time_millis = Some(now_millis);
            }
        }

        self.persist_all(&tables, changed.values())?;

        for resource in &staged {
            tables.index.insert(resource.id, resource.data_source_id);
        }
        let sources = changed.len();
        tables.sources.extend(changed);

        tracing::info!(
            "upserted {} medical resources into {} data sources for {}",
            staged.len(),
            sources,
            package_name
        );
        tracing::debug!("assigned row ids {:?}", row_ids);

        Ok(staged)
    }

    /// Returns the resources with the given ids, in request order, keeping only those `visible`
    /// accepts. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first error `visible` reports.
    pub fn read_by_ids(
        &self,
        ids: &[UuidService],
        mut visible: impl FnMut(&MedicalDataSource, &MedicalResource) -> MedicalResult<bool>,
    ) -> MedicalResult<Vec<MedicalResource>> {
        let tables = self.read_tables()?;

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(entry) = tables.index.get(id).and_then(|ds| tables.sources.get(ds)) else {
                continue;
            };
            let Some(row) = entry.rows.get(id) else {
                continue;
            };
            if visible(&entry.source, &row.resource)? {
                found.push(row.resource.clone());
            }
        }
        Ok(found)
    }

    /// Reads one page of resources.
    ///
    /// Rows are ordered by last-modified time in the requested direction, with ties broken by
    /// insertion order ascending in both directions. When `owner` is set only rows in that
    /// package's data sources are considered.
    ///
    /// # Errors
    ///
    /// Returns [`MedicalError::PageToken`] if the next token cannot be built.
    pub fn read(
        &self,
        request: &ReadMedicalResourcesRequest,
        owner: Option<&PackageName>,
    ) -> MedicalResult<ReadMedicalResourcesResponse> {
        let tables = self.read_tables()?;
        let token = request.page_token();
        let is_ascending = token.is_ascending();

        let mut rows: Vec<&StoredRow> = tables
            .sources
            .values()
            .filter(|entry| {
                request.data_source_ids().is_empty()
                    || request.data_source_ids().contains(&entry.source.id)
            })
            .filter(|entry| owner.map_or(true, |p| entry.source.is_owned_by(p)))
            .flat_map(|entry| entry.rows.values())
            .filter(|row| row.resource.medical_resource_type == request.medical_resource_type())
            .filter(|row| {
                if !token.is_timestamp_set() {
                    return true;
                }
                let time = row.resource.last_modified_time_millis;
                let start = token.time_millis() as i64;
                if is_ascending {
                    time >= start
                } else {
                    time <= start
                }
            })
            .collect();

        if is_ascending {
            rows.sort_by_key(|row| (row.resource.last_modified_time_millis, row.row_id));
        } else {
            rows.sort_by_key(|row| (Reverse(row.resource.last_modified_time_millis), row.row_id));
        }

        let skip = if token.is_timestamp_set() {
            token.offset() as usize
        } else {
            0
        };
        let page_size = request.page_size() as usize;

        let after_skip = rows.get(skip..).unwrap_or(&[]);
        let page = &after_skip[..page_size.min(after_skip.len())];
        let remaining_count = after_skip.len() - page.len();

        let next_page_token = match after_skip.get(page.len()) {
            Some(next) => next_token(&token, page, next)?.encode(),
            None => DEFAULT_LONG,
        };

        tracing::debug!(
            "read page of {} {} resources, {} remaining",
            page.len(),
            request.medical_resource_type(),
            remaining_count
        );

        Ok(ReadMedicalResourcesResponse {
            medical_resources: page.iter().map(|row| row.resource.clone()).collect(),
            next_page_token,
            remaining_count,
        })
    }

    /// Deletes the given resources if they belong to `package_name`. Returns how many were
    /// deleted; ids of other packages' resources and unknown ids are ignored.
    pub fn delete_by_ids(
        &self,
        package_name: &PackageName,
        ids: &[UuidService],
        now_millis: i64,
    ) -> MedicalResult<usize> {
        let targets: BTreeSet<UuidService> = ids.iter().copied().collect();
        self.delete_where(package_name, now_millis, |resource| {
            targets.contains(&resource.id)
        })
    }

    /// Deletes the caller's resources matching `request`. Returns how many were deleted.
    pub fn delete_by_request(
        &self,
        package_name: &PackageName,
        request: &DeleteMedicalResourcesRequest,
        now_millis: i64,
    ) -> MedicalResult<usize> {
        self.delete_where(package_name, now_millis, |resource| request.matches(resource))
    }

    fn delete_where(
        &self,
        package_name: &PackageName,
        now_millis: i64,
        matches: impl Fn(&MedicalResource) -> bool,
    ) -> MedicalResult<usize> {
        let mut tables = self.write_tables()?;

        let mut changed = Vec::new();
        let mut removed = Vec::new();
        for entry in tables.sources.values() {
            if !entry.source.is_owned_by(package_name) {
                continue;
            }
            let doomed: Vec<UuidService> = entry
                .rows
                .values()
                .filter(|row| matches(&row.resource))
                .map(|row| row.resource.id)
                .collect();
            if doomed.is_empty() {
                continue;
            }

            let mut updated = entry.clone();
            for id in &doomed {
                updated.rows.remove(id);
            }
            updated.source.last_data_update_time_millis = Some(now_millis);
            changed.push(updated);
            removed.extend(doomed);
        }

        self.persist_all(&tables, &changed)?;

        for id in &removed {
            tables.index.remove(id);
        }
        for entry in changed {
            tables.sources.insert(entry.source.id, entry);
        }

        tracing::info!(
            "deleted {} medical resources for {}",
            removed.len(),
            package_name
        );
        Ok(removed.len())
    }
}

fn load_entry(dir: &Path) -> MedicalResult<SourceEntry> {
    let source: MedicalDataSource = read_json(&dir.join(DATA_SOURCE_FILENAME))?;

    let resources_path = dir.join(RESOURCES_FILENAME);
    let file: ResourcesFile = if resources_path.is_file() {
        read_json(&resources_path)?
    } else {
        ResourcesFile::default()
    };

    let mut rows = HashMap::with_capacity(file.rows.len());
    for row in file.rows {
        if row.resource.data_source_id != source.id {
            return Err(MedicalError::Deserialization {
                path: resources_path.display().to_string(),
                message: format!(
                    "resource {} belongs to data source {}",
                    row.resource.id, row.resource.data_source_id
                ),
            });
        }
        rows.insert(row.resource.id, row);
    }

    Ok(SourceEntry { source, rows })
}

/// Builds the token that resumes after `page`, whose first unreturned row is `next`.
///
/// The offset counts the rows already returned that share `next`'s timestamp. When the
/// previous token pointed at the same timestamp its offset carries over.
///
/// # Errors
///
/// Returns [`MedicalError::PageOffsetOverflow`] if more rows share `next`'s timestamp than a
/// token can skip.
fn next_token(
    previous: &PageTokenWrapper,
    page: &[&StoredRow],
    next: &StoredRow,
) -> MedicalResult<PageTokenWrapper> {
    let next_time = next.resource.last_modified_time_millis;

    let mut offset = page
        .iter()
        .rev()
        .take_while(|row| row.resource.last_modified_time_millis == next_time)
        .count() as i64;
    if previous.is_timestamp_set() && previous.time_millis() as i64 == next_time {
        offset = offset.saturating_add(i64::from(previous.offset()));
    }
    if offset > MAX_OFFSET {
        tracing::error!(
            "{} rows share timestamp {}, more than a page token can skip",
            offset,
            next_time
        );
        return Err(MedicalError::PageOffsetOverflow {
            time_millis: next_time,
            offset,
        });
    }

    Ok(PageTokenWrapper::of(
        previous.is_ascending(),
        next_time,
        offset,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MappingError;
    use crate::medical_resource_type::MedicalResourceType;
    use crate::validation::{MedicalResourceValidator, UpsertMedicalResourceRequest};
    use tempfile::TempDir;

    fn store(temp_dir: &TempDir) -> MedicalStore {
        let cfg = CoreConfig::new(temp_dir.path().to_path_buf(), 3).unwrap();
        MedicalStore::open(Arc::new(cfg)).unwrap()
    }

    fn package(name: &str) -> PackageName {
        PackageName::parse(name).unwrap()
    }

    fn create_source(store: &MedicalStore, owner: &PackageName, name: &str) -> MedicalDataSource {
        store
            .create_data_source(
                owner,
                &CreateMedicalDataSourceRequest::new("https://fhir.example.com/r4", name),
            )
            .unwrap()
    }

    fn immunization(source: &MedicalDataSource, fhir_id: &str) -> UpsertMedicalResourceInternalRequest {
        let data = format!(r#"{{"id":"{fhir_id}","resourceType":"Immunization"}}"#);
        MedicalResourceValidator::new()
            .validate(&UpsertMedicalResourceRequest::new(
                source.id.to_string(),
                "4.0.1",
                data,
            ))
            .unwrap()
    }

    fn read_all(
        store: &MedicalStore,
        ascending: bool,
        page_size: u32,
    ) -> Vec<ReadMedicalResourcesResponse> {
        let mut pages = Vec::new();
        let mut token = DEFAULT_LONG;
        loop {
            let builder = ReadMedicalResourcesRequest::builder(MedicalResourceType::Immunization)
                .page_size(page_size);
            let builder = if token == DEFAULT_LONG {
                builder.ascending(ascending)
            } else {
                builder.page_token(token)
            };
            let page = store.read(&builder.build().unwrap(), None).unwrap();
            token = page.next_page_token;
            pages.push(page);
            if token == DEFAULT_LONG {
                return pages;
            }
        }
    }

    fn fhir_ids(resources: &[MedicalResource]) -> Vec<String> {
        resources
            .iter()
            .map(|r| r.fhir_resource.id().to_string())
            .collect()
    }

    #[test]
    fn test_create_data_source_persists_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");

        let source = create_source(&store, &owner, "Clinic");
        let dir = source.id.sharded_dir(&temp_dir.path().join("medical"));

        assert!(dir.join(DATA_SOURCE_FILENAME).is_file());
        assert!(dir.join(RESOURCES_FILENAME).is_file());
        assert_eq!(source.display_name.as_str(), "Clinic");
        assert_eq!(source.last_data_update_time_millis, None);
    }

    #[test]
    fn test_create_data_source_enforces_unique_names_and_limit() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let other = package("com.other.app");

        create_source(&store, &owner, "Clinic");
        let err = store
            .create_data_source(
                &owner,
                &CreateMedicalDataSourceRequest::new("https://x.org", " Clinic "),
            )
            .unwrap_err();
        assert!(err.to_string().contains("display name already exists"));

        // Another package may reuse the name.
        create_source(&store, &other, "Clinic");

        create_source(&store, &owner, "Second");
        create_source(&store, &owner, "Third");
        let err = store
            .create_data_source(
                &owner,
                &CreateMedicalDataSourceRequest::new("https://x.org", "Fourth"),
            )
            .unwrap_err();
        assert!(err.to_string().contains("maximum of 3"));
    }

    #[test]
    fn test_create_data_source_rejects_bad_input() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");

        assert!(store
            .create_data_source(&owner, &CreateMedicalDataSourceRequest::new("https://x.org", ""))
            .is_err());
        assert!(store
            .create_data_source(&owner, &CreateMedicalDataSourceRequest::new("x.org", "Clinic"))
            .is_err());
    }

    #[test]
    fn test_get_data_sources() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let a = create_source(&store, &package("com.example.a"), "A");
        let b = create_source(&store, &package("com.example.b"), "B");

        let by_ids = store
            .get_data_sources_by_ids(&BTreeSet::from([a.id, UuidService::new()]))
            .unwrap();
        assert_eq!(by_ids, vec![a.clone()]);

        let by_package = store
            .get_data_sources_by_packages(&BTreeSet::from([package("com.example.b")]))
            .unwrap();
        assert_eq!(by_package, vec![b]);

        assert_eq!(
            store
                .get_data_sources_by_packages(&BTreeSet::new())
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_upsert_and_read_by_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        let written = store
            .upsert(
                &owner,
                vec![immunization(&source, "a"), immunization(&source, "b")],
                100,
            )
            .unwrap();
        assert_eq!(written.len(), 2);

        let ids = vec![written[1].id, UuidService::new(), written[0].id];
        let found = store.read_by_ids(&ids, |_, _| Ok(true)).unwrap();
        assert_eq!(fhir_ids(&found), vec!["b", "a"]);

        let sources = store
            .get_data_sources_by_ids(&BTreeSet::from([source.id]))
            .unwrap();
        assert_eq!(sources[0].last_data_update_time_millis, Some(100));

        let none = store.read_by_ids(&ids, |_, _| Ok(false)).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_upsert_rejects_foreign_or_missing_data_source() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        let err = store
            .upsert(&package("com.other.app"), vec![immunization(&source, "a")], 1)
            .unwrap_err();
        assert!(matches!(err, MedicalError::InvalidInput(_)));

        let mut request = immunization(&source, "a");
        request.data_source_id = "ds1".into();
        assert!(store.upsert(&owner, vec![request], 1).is_err());
    }

    #[test]
    fn test_upsert_batch_is_atomic_on_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        let err = store
            .upsert(
                &owner,
                vec![
                    immunization(&source, "a"),
                    immunization(&source, "b"),
                    immunization(&source, "a"),
                ],
                1,
            )
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));

        let page = &read_all(&store, true, 10)[0];
        assert!(page.medical_resources.is_empty());
    }

    #[test]
    fn test_overwrite_keeps_identity_and_position() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        let first = store
            .upsert(
                &owner,
                vec![immunization(&source, "a"), immunization(&source, "b")],
                100,
            )
            .unwrap();

        let mut updated = immunization(&source, "a");
        updated.data = r#"{"id":"a","resourceType":"Immunization","status":"completed"}"#.into();
        let second = store.upsert(&owner, vec![updated], 100).unwrap();
        assert_eq!(second[0].id, first[0].id);

        let page = &read_all(&store, true, 10)[0];
        assert_eq!(fhir_ids(&page.medical_resources), vec!["a", "b"]);
        assert!(page.medical_resources[0]
            .fhir_resource
            .data()
            .contains("completed"));
    }

    #[test]
    fn test_read_orders_by_time_then_insertion() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        store
            .upsert(&owner, vec![immunization(&source, "t2-a")], 2)
            .unwrap();
        store
            .upsert(
                &owner,
                vec![immunization(&source, "t1-a"), immunization(&source, "t1-b")],
                1,
            )
            .unwrap();
        store
            .upsert(&owner, vec![immunization(&source, "t2-b")], 2)
            .unwrap();

        let asc = &read_all(&store, true, 10)[0];
        assert_eq!(
            fhir_ids(&asc.medical_resources),
            vec!["t1-a", "t1-b", "t2-a", "t2-b"]
        );

        // Ties keep insertion order in both directions.
        let desc = &read_all(&store, false, 10)[0];
        assert_eq!(
            fhir_ids(&desc.medical_resources),
            vec!["t2-a", "t2-b", "t1-a", "t1-b"]
        );
    }

    #[test]
    fn test_pagination_resumes_across_ties() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        let batch: Vec<_> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|id| immunization(&source, id))
            .collect();
        store.upsert(&owner, batch, 5).unwrap();
        store
            .upsert(&owner, vec![immunization(&source, "f")], 6)
            .unwrap();

        for ascending in [true, false] {
            let pages = read_all(&store, ascending, 2);
            assert_eq!(pages.len(), 3);
            assert_eq!(pages[0].remaining_count, 4);
            assert_eq!(pages[1].remaining_count, 2);
            assert_eq!(pages[2].remaining_count, 0);

            let ids: Vec<String> = pages
                .iter()
                .flat_map(|p| fhir_ids(&p.medical_resources))
                .collect();
            let expected = if ascending {
                vec!["a", "b", "c", "d", "e", "f"]
            } else {
                vec!["f", "a", "b", "c", "d", "e"]
            };
            assert_eq!(ids, expected);
        }
    }

    #[test]
    fn test_next_token_layout() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");

        let batch: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|id| immunization(&source, id))
            .collect();
        store.upsert(&owner, batch, 7).unwrap();

        let pages = read_all(&store, true, 1);
        let first = PageTokenWrapper::decode(pages[0].next_page_token, false).unwrap();
        assert!(first.is_ascending());
        assert_eq!(first.time_millis(), 7);
        assert_eq!(first.offset(), 1);

        let second = PageTokenWrapper::decode(pages[1].next_page_token, false).unwrap();
        assert_eq!(second.offset(), 2);
        assert_eq!(pages[2].next_page_token, DEFAULT_LONG);
    }

    #[test]
    fn test_read_filters_by_data_source_and_owner() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let a = package("com.example.a");
        let b = package("com.example.b");
        let source_a = create_source(&store, &a, "A");
        let source_b = create_source(&store, &b, "B");

        store.upsert(&a, vec![immunization(&source_a, "x")], 1).unwrap();
        store.upsert(&b, vec![immunization(&source_b, "y")], 2).unwrap();

        let request = ReadMedicalResourcesRequest::builder(MedicalResourceType::Immunization)
            .data_source_ids([source_b.id])
            .build()
            .unwrap();
        assert_eq!(
            fhir_ids(&store.read(&request, None).unwrap().medical_resources),
            vec!["y"]
        );

        let request = ReadMedicalResourcesRequest::builder(MedicalResourceType::Immunization)
            .build()
            .unwrap();
        assert_eq!(
            fhir_ids(&store.read(&request, Some(&a)).unwrap().medical_resources),
            vec!["x"]
        );
        assert_eq!(store.read(&request, None).unwrap().medical_resources.len(), 2);
    }

    #[test]
    fn test_reopen_restores_state() {
        let temp_dir = TempDir::new().unwrap();
        let owner = package("com.example.app");

        let (source, written) = {
            let store = store(&temp_dir);
            let source = create_source(&store, &owner, "Clinic");
            let written = store
                .upsert(
                    &owner,
                    vec![immunization(&source, "a"), immunization(&source, "b")],
                    10,
                )
                .unwrap();
            (source, written)
        };

        let store = store(&temp_dir);
        let found = store
            .read_by_ids(&[written[0].id, written[1].id], |_, _| Ok(true))
            .unwrap();
        assert_eq!(found, written);

        // Row ids continue after the highest persisted one.
        store
            .upsert(&owner, vec![immunization(&source, "c")], 10)
            .unwrap();
        let page = &read_all(&store, true, 10)[0];
        assert_eq!(fhir_ids(&page.medical_resources), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_open_skips_corrupt_entries() {
        let temp_dir = TempDir::new().unwrap();
        let owner = package("com.example.app");
        let corrupt_id = {
            let store = store(&temp_dir);
            create_source(&store, &owner, "Good");
            create_source(&store, &owner, "Bad").id
        };

        let dir = corrupt_id.sharded_dir(&temp_dir.path().join("medical"));
        fs::write(dir.join(DATA_SOURCE_FILENAME), "{ not json").unwrap();

        let store = store(&temp_dir);
        let all = store.get_data_sources_by_packages(&BTreeSet::new()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].display_name.as_str(), "Good");
    }

    #[test]
    fn test_delete_data_source_removes_resources() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");
        let written = store
            .upsert(&owner, vec![immunization(&source, "a")], 1)
            .unwrap();

        let err = store
            .delete_data_source(&package("com.other.app"), &source.id)
            .unwrap_err();
        assert!(matches!(err, MedicalError::NotFound(_)));

        store.delete_data_source(&owner, &source.id).unwrap();
        assert!(!source
            .id
            .sharded_dir(&temp_dir.path().join("medical"))
            .exists());
        assert!(store
            .read_by_ids(&[written[0].id], |_, _| Ok(true))
            .unwrap()
            .is_empty());
        assert!(matches!(
            store.delete_data_source(&owner, &source.id),
            Err(MedicalError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_resources_only_touches_own_data() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let a = package("com.example.a");
        let b = package("com.example.b");
        let source_a = create_source(&store, &a, "A");
        let source_b = create_source(&store, &b, "B");

        let written_a = store
            .upsert(
                &a,
                vec![immunization(&source_a, "x"), immunization(&source_a, "y")],
                1,
            )
            .unwrap();
        let written_b = store.upsert(&b, vec![immunization(&source_b, "z")], 1).unwrap();

        let deleted = store
            .delete_by_ids(&a, &[written_a[0].id, written_b[0].id], 5)
            .unwrap();
        assert_eq!(deleted, 1);

        let request =
            DeleteMedicalResourcesRequest::new(vec![], vec![MedicalResourceType::Immunization])
                .unwrap();
        assert_eq!(store.delete_by_request(&a, &request, 6).unwrap(), 1);

        let remaining = store
            .read_by_ids(&[written_a[1].id, written_b[0].id], |_, _| Ok(true))
            .unwrap();
        assert_eq!(fhir_ids(&remaining), vec!["z"]);

        let source = store
            .get_data_sources_by_ids(&BTreeSet::from([source_a.id]))
            .unwrap();
        assert_eq!(source[0].last_data_update_time_millis, Some(6));
    }

    fn break_source_dir(temp_dir: &TempDir, id: &UuidService) {
        let dir = id.sharded_dir(&temp_dir.path().join("medical"));
        fs::remove_dir_all(&dir).unwrap();
        fs::write(&dir, "not a directory").unwrap();
    }

    /// Two sources of `owner`, in the order mutations visit them.
    fn two_sources(
        store: &MedicalStore,
        owner: &PackageName,
    ) -> (MedicalDataSource, MedicalDataSource) {
        let x = create_source(store, owner, "First");
        let y = create_source(store, owner, "Second");
        if x.id < y.id {
            (x, y)
        } else {
            (y, x)
        }
    }

    #[test]
    fn test_upsert_across_sources_writes_nothing_when_one_fails() {
        let temp_dir = TempDir::new().unwrap();
        let owner = package("com.example.app");

        let (first, ids) = {
            let store = store(&temp_dir);
            let (first, second) = two_sources(&store, &owner);
            break_source_dir(&temp_dir, &second.id);

            let requests = vec![immunization(&first, "a"), immunization(&second, "b")];
            let ids: Vec<UuidService> = requests.iter().map(|r| r.uuid()).collect();
            let err = store.upsert(&owner, requests, 1).unwrap_err();
            assert!(matches!(err, MedicalError::FileWrite(_)));
            assert!(store.read_by_ids(&ids, |_, _| Ok(true)).unwrap().is_empty());
            (first, ids)
        };

        let first_dir = first.id.sharded_dir(&temp_dir.path().join("medical"));
        assert!(!first_dir.join(".resources.json.tmp").exists());
        assert!(!first_dir.join(".data_source.json.tmp").exists());

        let store = store(&temp_dir);
        assert!(store.read_by_ids(&ids, |_, _| Ok(true)).unwrap().is_empty());
        let sources = store
            .get_data_sources_by_ids(&BTreeSet::from([first.id]))
            .unwrap();
        assert_eq!(sources[0].last_data_update_time_millis, None);
    }

    #[test]
    fn test_delete_across_sources_keeps_rows_when_one_fails() {
        let temp_dir = TempDir::new().unwrap();
        let owner = package("com.example.app");

        let written = {
            let store = store(&temp_dir);
            let (first, second) = two_sources(&store, &owner);
            let written = store
                .upsert(
                    &owner,
                    vec![immunization(&first, "a"), immunization(&second, "b")],
                    1,
                )
                .unwrap();
            break_source_dir(&temp_dir, &second.id);

            let request =
                DeleteMedicalResourcesRequest::new(vec![], vec![MedicalResourceType::Immunization])
                    .unwrap();
            assert!(store.delete_by_request(&owner, &request, 2).is_err());
            let kept = store
                .read_by_ids(&[written[0].id, written[1].id], |_, _| Ok(true))
                .unwrap();
            assert_eq!(fhir_ids(&kept), vec!["a", "b"]);
            written
        };

        let store = store(&temp_dir);
        let found = store
            .read_by_ids(&[written[0].id], |_, _| Ok(true))
            .unwrap();
        assert_eq!(fhir_ids(&found), vec!["a"]);
    }

    #[test]
    fn test_read_by_ids_propagates_visibility_errors() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");
        let written = store
            .upsert(&owner, vec![immunization(&source, "a")], 1)
            .unwrap();

        let err = store
            .read_by_ids(&[written[0].id], |_, _| {
                Err(MedicalError::Invariant(MappingError::NoReadPermission(0)))
            })
            .unwrap_err();
        assert!(matches!(err, MedicalError::Invariant(_)));
    }

    #[test]
    fn test_next_token_rejects_offset_past_limit() {
        let temp_dir = TempDir::new().unwrap();
        let store = store(&temp_dir);
        let owner = package("com.example.app");
        let source = create_source(&store, &owner, "Clinic");
        store
            .upsert(
                &owner,
                vec![immunization(&source, "a"), immunization(&source, "b")],
                9,
            )
            .unwrap();

        let tables = store.read_tables().unwrap();
        let mut rows: Vec<&StoredRow> = tables
            .sources
            .values()
            .flat_map(|entry| entry.rows.values())
            .collect();
        rows.sort_by_key(|row| row.row_id);

        let at_limit = PageTokenWrapper::of(true, 9, MAX_OFFSET - 1).unwrap();
        let token = next_token(&at_limit, &rows[..1], rows[1]).unwrap();
        assert_eq!(i64::from(token.offset()), MAX_OFFSET);

        let past_limit = PageTokenWrapper::of(true, 9, MAX_OFFSET).unwrap();
        let err = next_token(&past_limit, &rows[..1], rows[1]).unwrap_err();
        assert!(matches!(
            err,
            MedicalError::PageOffsetOverflow { time_millis: 9, .. }
        ));
        assert_eq!(err.category(), crate::error::ErrorCategory::InvariantViolation);
    }
}

//! Permission-checked entry points for medical data.
//!
//! [`MedicalDataService`] is what the REST and CLI layers talk to. It validates requests,
//! decides what the caller may see or change, stamps writes with the current time and delegates
//! storage to [`MedicalStore`].

use crate::constants::{MAX_IDS_PER_REQUEST, MAX_UPSERT_BATCH_SIZE};
use crate::data_source::{CreateMedicalDataSourceRequest, MedicalDataSource};
use crate::error::{MedicalError, MedicalResult};
use crate::medical_resource::MedicalResource;
use crate::permissions::{read_scope_for, require_write, CallerIdentity, ReadScope};
use crate::read_request::{
    DeleteMedicalResourcesRequest, ReadMedicalResourcesRequest, ReadMedicalResourcesResponse,
};
use crate::repositories::medical::MedicalStore;
use crate::validation::{MedicalResourceValidator, UpsertMedicalResourceRequest};
use crate::CoreConfig;
use hc_types::PackageName;
use hc_uuid::UuidService;
use std::collections::BTreeSet;
use std::sync::Arc;

#[derive(Debug)]
pub struct MedicalDataService {
    store: MedicalStore,
    validator: MedicalResourceValidator,
}

impl MedicalDataService {
    /// Opens the store described by `cfg` with the default validator.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the store cannot be opened.
    pub fn open(cfg: Arc<CoreConfig>) -> MedicalResult<Self> {
        Ok(Self::new(MedicalStore::open(cfg)?, MedicalResourceValidator::new()))
    }

    pub fn new(store: MedicalStore, validator: MedicalResourceValidator) -> Self {
        Self { store, validator }
    }

    fn now_millis() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn check_id_count(len: usize) -> MedicalResult<()> {
        if len > MAX_IDS_PER_REQUEST {
            return Err(MedicalError::InvalidInput(format!(
                "at most {} ids may be given per request, got: {}",
                MAX_IDS_PER_REQUEST, len
            )));
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Data sources
    // ------------------------------------------------------------------------

    pub fn create_medical_data_source(
        &self,
        caller: &CallerIdentity,
        request: &CreateMedicalDataSourceRequest,
    ) -> MedicalResult<MedicalDataSource> {
        require_write(caller)?;
        self.store
            .create_data_source(caller.package_name(), request)
    }

    /// Callers with any medical read permission see every requested source; writers without one
    /// see only their own.
    pub fn get_medical_data_sources_by_ids(
        &self,
        caller: &CallerIdentity,
        ids: &BTreeSet<UuidService>,
    ) -> MedicalResult<Vec<MedicalDataSource>> {
        Self::check_id_count(ids.len())?;
        let sources = self.store.get_data_sources_by_ids(ids)?;
        self.visible_sources(caller, sources)
    }

    /// An empty `packages` set means every package.
    pub fn get_medical_data_sources_by_packages(
        &self,
        caller: &CallerIdentity,
        packages: &BTreeSet<PackageName>,
    ) -> MedicalResult<Vec<MedicalDataSource>> {
        let sources = self.store.get_data_sources_by_packages(packages)?;
        self.visible_sources(caller, sources)
    }

    fn visible_sources(
        &self,
        caller: &CallerIdentity,
        sources: Vec<MedicalDataSource>,
    ) -> MedicalResult<Vec<MedicalDataSource>> {
        if caller.has_any_read_permission() {
            return Ok(sources);
        }
        require_write(caller)?;
        Ok(sources
            .into_iter()
            .filter(|source| source.is_owned_by(caller.package_name()))
            .collect())
    }

    pub fn delete_medical_data_source_with_data(
        &self,
        caller: &CallerIdentity,
        id: &UuidService,
    ) -> MedicalResult<()> {
        require_write(caller)?;
        self.store.delete_data_source(caller.package_name(), id)
    }

    // ------------------------------------------------------------------------
    // Medical resources
    // ------------------------------------------------------------------------

    /// Validates every request, then writes the batch. Nothing is written if any request fails.
    ///
    /// A batch may hold at most [`MAX_UPSERT_BATCH_SIZE`] requests.
    pub fn upsert_medical_resources(
        &self,
        caller: &CallerIdentity,
        requests: &[UpsertMedicalResourceRequest],
    ) -> MedicalResult<Vec<MedicalResource>> {
        require_write(caller)?;
        if requests.is_empty() {
            return Ok(Vec::new());
        }
        if requests.len() > MAX_UPSERT_BATCH_SIZE {
            return Err(MedicalError::InvalidInput(format!(
                "at most {} resources may be upserted per request, got: {}",
                MAX_UPSERT_BATCH_SIZE,
                requests.len()
            )));
        }

        let internal = requests
            .iter()
            .map(|request| self.validator.validate(request))
            .collect::<Result<Vec<_>, _>>()?;

        self.store
            .upsert(caller.package_name(), internal, Self::now_millis())
    }

    /// Returns the readable resources among `ids`, in request order.
    pub fn read_medical_resources_by_ids(
        &self,
        caller: &CallerIdentity,
        ids: &[UuidService],
    ) -> MedicalResult<Vec<MedicalResource>> {
        Self::check_id_count(ids.len())?;
        if !caller.can_write() && !caller.has_any_read_permission() {
            return Err(MedicalError::PermissionDenied(format!(
                "{} holds no medical data permission",
                caller.package_name()
            )));
        }

        self.store.read_by_ids(ids, |source, resource| {
            Ok(caller.can_read_all(resource.medical_resource_type)?
                || (caller.can_write() && source.is_owned_by(caller.package_name())))
        })
    }

    pub fn read_medical_resources(
        &self,
        caller: &CallerIdentity,
        request: &ReadMedicalResourcesRequest,
    ) -> MedicalResult<ReadMedicalResourcesResponse> {
        let owner = match read_scope_for(caller, request.medical_resource_type())? {
            ReadScope::AllPackages => None,
            ReadScope::OwnPackage => Some(caller.package_name()),
        };
        self.store.read(request, owner)
    }

    pub fn delete_medical_resources_by_ids(
        &self,
        caller: &CallerIdentity,
        ids: &[UuidService],
    ) -> MedicalResult<usize> {
        require_write(caller)?;
        Self::check_id_count(ids.len())?;
        self.store
            .delete_by_ids(caller.package_name(), ids, Self::now_millis())
    }

    pub fn delete_medical_resources_by_request(
        &self,
        caller: &CallerIdentity,
        request: &DeleteMedicalResourcesRequest,
    ) -> MedicalResult<usize> {
        require_write(caller)?;
        self.store
            .delete_by_request(caller.package_name(), request, Self::now_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::medical_resource_type::MedicalResourceType;
    use crate::permissions::{READ_MEDICAL_DATA_IMMUNIZATION, WRITE_MEDICAL_DATA};
    use tempfile::TempDir;

    fn service(temp_dir: &TempDir) -> MedicalDataService {
        let cfg = CoreConfig::new(temp_dir.path().to_path_buf(), 5).unwrap();
        MedicalDataService::open(Arc::new(cfg)).unwrap()
    }

    fn caller(package: &str, permissions: &[&str]) -> CallerIdentity {
        CallerIdentity::new(PackageName::parse(package).unwrap(), permissions.iter().copied())
    }

    fn writer(package: &str) -> CallerIdentity {
        caller(package, &[WRITE_MEDICAL_DATA])
    }

    fn upsert(service: &MedicalDataService, who: &CallerIdentity, name: &str, ids: &[&str]) -> (MedicalDataSource, Vec<MedicalResource>) {
        let source = service
            .create_medical_data_source(
                who,
                &CreateMedicalDataSourceRequest::new("https://fhir.example.com", name),
            )
            .unwrap();
        let requests: Vec<_> = ids
            .iter()
            .map(|id| {
                UpsertMedicalResourceRequest::new(
                    source.id.to_string(),
                    "4.0.1",
                    format!(r#"{{"id":"{id}","resourceType":"Immunization"}}"#),
                )
            })
            .collect();
        let written = service.upsert_medical_resources(who, &requests).unwrap();
        (source, written)
    }

    fn read_immunizations(
        service: &MedicalDataService,
        who: &CallerIdentity,
    ) -> MedicalResult<Vec<String>> {
        let request = ReadMedicalResourcesRequest::builder(MedicalResourceType::Immunization)
            .build()?;
        Ok(service
            .read_medical_resources(who, &request)?
            .medical_resources
            .iter()
            .map(|r| r.fhir_resource.id().to_string())
            .collect())
    }

    #[test]
    fn test_writes_need_write_permission() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let reader = caller("com.example.reader", &[READ_MEDICAL_DATA_IMMUNIZATION]);

        let err = service
            .create_medical_data_source(
                &reader,
                &CreateMedicalDataSourceRequest::new("https://x.org", "X"),
            )
            .unwrap_err();
        assert!(matches!(err, MedicalError::PermissionDenied(_)));

        let err = service
            .upsert_medical_resources(&reader, &[])
            .unwrap_err();
        assert!(matches!(err, MedicalError::PermissionDenied(_)));
    }

    #[test]
    fn test_upsert_validation_failure_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let app = writer("com.example.app");
        let (source, _) = upsert(&service, &app, "Clinic", &[]);

        let requests = vec![
            UpsertMedicalResourceRequest::new(
                source.id.to_string(),
                "4.0.1",
                r#"{"id":"ok","resourceType":"Immunization"}"#,
            ),
            UpsertMedicalResourceRequest::new(
                source.id.to_string(),
                "4.0.1",
                r#"{"id":"bad","resourceType":"Patient"}"#,
            ),
        ];
        let err = service.upsert_medical_resources(&app, &requests).unwrap_err();
        assert!(matches!(
            err,
            MedicalError::Validation(ValidationError::UnsupportedResourceType { .. })
        ));
        assert!(read_immunizations(&service, &app).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_rejects_oversized_batch() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let app = writer("com.example.app");
        let (source, _) = upsert(&service, &app, "Clinic", &[]);

        // Checked before validation, so identical entries never reach the duplicate check.
        let request = UpsertMedicalResourceRequest::new(
            source.id.to_string(),
            "4.0.1",
            r#"{"id":"a","resourceType":"Immunization"}"#,
        );
        let requests = vec![request; MAX_UPSERT_BATCH_SIZE + 1];

        let err = service.upsert_medical_resources(&app, &requests).unwrap_err();
        assert!(matches!(err, MedicalError::InvalidInput(_)));
        assert!(err.to_string().contains("at most 5000 resources"));
        assert!(read_immunizations(&service, &app).unwrap().is_empty());
    }

    #[test]
    fn test_read_scope_follows_permissions() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let a = writer("com.example.a");
        let b = writer("com.example.b");
        upsert(&service, &a, "A", &["x"]);
        upsert(&service, &b, "B", &["y"]);

        assert_eq!(read_immunizations(&service, &a).unwrap(), vec!["x"]);

        let reader = caller("com.example.reader", &[READ_MEDICAL_DATA_IMMUNIZATION]);
        assert_eq!(read_immunizations(&service, &reader).unwrap(), vec!["x", "y"]);

        let nobody = caller("com.example.nobody", &[]);
        assert!(matches!(
            read_immunizations(&service, &nobody),
            Err(MedicalError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_read_by_ids_filters_foreign_rows_for_writers() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let a = writer("com.example.a");
        let b = writer("com.example.b");
        let (_, written_a) = upsert(&service, &a, "A", &["x"]);
        let (_, written_b) = upsert(&service, &b, "B", &["y"]);
        let ids = [written_b[0].id, written_a[0].id];

        let found = service.read_medical_resources_by_ids(&a, &ids).unwrap();
        assert_eq!(found, written_a);

        let reader = caller("com.example.reader", &[READ_MEDICAL_DATA_IMMUNIZATION]);
        let found = service.read_medical_resources_by_ids(&reader, &ids).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], written_b[0]);

        let too_many = vec![UuidService::new(); MAX_IDS_PER_REQUEST + 1];
        assert!(matches!(
            service.read_medical_resources_by_ids(&reader, &too_many),
            Err(MedicalError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_data_source_visibility() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let a = writer("com.example.a");
        let b = writer("com.example.b");
        let (source_a, _) = upsert(&service, &a, "A", &[]);
        let (source_b, _) = upsert(&service, &b, "B", &[]);
        let ids = BTreeSet::from([source_a.id, source_b.id]);

        let seen = service.get_medical_data_sources_by_ids(&a, &ids).unwrap();
        assert_eq!(seen, vec![source_a.clone()]);

        let reader = caller("com.example.reader", &[READ_MEDICAL_DATA_IMMUNIZATION]);
        assert_eq!(
            service
                .get_medical_data_sources_by_packages(&reader, &BTreeSet::new())
                .unwrap()
                .len(),
            2
        );

        let nobody = caller("com.example.nobody", &[]);
        assert!(service
            .get_medical_data_sources_by_ids(&nobody, &ids)
            .is_err());
    }

    #[test]
    fn test_delete_operations() {
        let temp_dir = TempDir::new().unwrap();
        let service = service(&temp_dir);
        let a = writer("com.example.a");
        let (source, written) = upsert(&service, &a, "A", &["x", "y"]);

        assert_eq!(
            service
                .delete_medical_resources_by_ids(&a, &[written[0].id])
                .unwrap(),
            1
        );

        let request = DeleteMedicalResourcesRequest::new([source.id], []).unwrap();
        assert_eq!(
            service
                .delete_medical_resources_by_request(&a, &request)
                .unwrap(),
            1
        );

        service
            .delete_medical_data_source_with_data(&a, &source.id)
            .unwrap();
        assert!(service
            .get_medical_data_sources_by_ids(&a, &BTreeSet::from([source.id]))
            .unwrap()
            .is_empty());
    }
}

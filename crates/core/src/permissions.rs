//! Permission categories, read permissions and caller access checks.
//!
//! Two separate bidirectional tables connect [`MedicalResourceType`] to the access-control
//! world:
//! - type <-> [`MedicalPermissionCategory`], used for grouping consent prompts
//! - type <-> read permission string, used for enforcement
//!
//! They are kept apart because a category may come to cover several types while permissions
//! stay per-type. Both tables are built once on first use and are immutable afterwards.
//! A failed lookup is a [`MappingError`]: every storable type must appear in both tables.

use crate::error::{MappingError, MedicalError, MedicalResult};
use crate::medical_resource_type::MedicalResourceType;
use hc_types::PackageName;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::OnceLock;

/// Permission needed to create data sources and write medical resources.
pub const WRITE_MEDICAL_DATA: &str = "android.permission.health.WRITE_MEDICAL_DATA";

/// Permission needed to read immunization resources written by any app.
pub const READ_MEDICAL_DATA_IMMUNIZATION: &str =
    "android.permission.health.READ_MEDICAL_DATA_IMMUNIZATION";

/// Groups of medical resource types presented to the user as one consent choice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MedicalPermissionCategory {
    Unknown = 0,
    Immunization = 1,
}

impl MedicalPermissionCategory {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Unknown),
            1 => Some(Self::Immunization),
            _ => None,
        }
    }
}

struct BiMap<A, B> {
    forward: HashMap<A, B>,
    backward: HashMap<B, A>,
}

impl<A, B> BiMap<A, B>
where
    A: Copy + Eq + Hash,
    B: Copy + Eq + Hash,
{
    fn from_pairs(pairs: &[(A, B)]) -> Self {
        let mut forward = HashMap::with_capacity(pairs.len());
        let mut backward = HashMap::with_capacity(pairs.len());
        for &(a, b) in pairs {
            forward.insert(a, b);
            backward.insert(b, a);
        }
        Self { forward, backward }
    }
}

/// Maps medical resource types to permission categories and back.
pub struct MedicalResourceTypePermissionCategoryMapper;

impl MedicalResourceTypePermissionCategoryMapper {
    fn table() -> &'static BiMap<MedicalResourceType, MedicalPermissionCategory> {
        static TABLE: OnceLock<BiMap<MedicalResourceType, MedicalPermissionCategory>> =
            OnceLock::new();
        TABLE.get_or_init(|| {
            BiMap::from_pairs(&[(
                MedicalResourceType::Immunization,
                MedicalPermissionCategory::Immunization,
            )])
        })
    }

    /// # Errors
    ///
    /// Returns [`MappingError::NoPermissionCategory`] for types outside the supported set.
    pub fn category_for(
        medical_resource_type: MedicalResourceType,
    ) -> Result<MedicalPermissionCategory, MappingError> {
        Self::table()
            .forward
            .get(&medical_resource_type)
            .copied()
            .ok_or(MappingError::NoPermissionCategory(medical_resource_type.code()))
    }

    /// # Errors
    ///
    /// Returns [`MappingError::NoMedicalResourceTypeForCategory`] for categories without a type.
    pub fn medical_resource_type_for(
        category: MedicalPermissionCategory,
    ) -> Result<MedicalResourceType, MappingError> {
        Self::table()
            .backward
            .get(&category)
            .copied()
            .ok_or(MappingError::NoMedicalResourceTypeForCategory(category.code()))
    }

    /// Code-level form of [`Self::category_for`], for callers holding raw integer codes.
    pub fn category_code_for(medical_resource_type: i32) -> Result<i32, MappingError> {
        let t = MedicalResourceType::from_code(medical_resource_type)
            .ok_or(MappingError::NoPermissionCategory(medical_resource_type))?;
        Self::category_for(t).map(MedicalPermissionCategory::code)
    }

    /// Code-level form of [`Self::medical_resource_type_for`].
    pub fn medical_resource_type_code_for(category: i32) -> Result<i32, MappingError> {
        let c = MedicalPermissionCategory::from_code(category)
            .ok_or(MappingError::NoMedicalResourceTypeForCategory(category))?;
        Self::medical_resource_type_for(c).map(MedicalResourceType::code)
    }
}

/// Maps medical resource types to the read permission that guards them, and back.
pub struct MedicalResourceTypePermissionMapper;

impl MedicalResourceTypePermissionMapper {
    fn table() -> &'static BiMap<MedicalResourceType, &'static str> {
        static TABLE: OnceLock<BiMap<MedicalResourceType, &'static str>> = OnceLock::new();
        TABLE.get_or_init(|| {
            BiMap::from_pairs(&[(
                MedicalResourceType::Immunization,
                READ_MEDICAL_DATA_IMMUNIZATION,
            )])
        })
    }

    /// # Errors
    ///
    /// Returns [`MappingError::NoReadPermission`] for types outside the supported set.
    pub fn read_permission_for(
        medical_resource_type: MedicalResourceType,
    ) -> Result<&'static str, MappingError> {
        Self::table()
            .forward
            .get(&medical_resource_type)
            .copied()
            .ok_or(MappingError::NoReadPermission(medical_resource_type.code()))
    }

    /// # Errors
    ///
    /// Returns [`MappingError::NoMedicalResourceTypeForPermission`] if `permission` is not a
    /// medical read permission.
    pub fn medical_resource_type_for(
        permission: &str,
    ) -> Result<MedicalResourceType, MappingError> {
        Self::table()
            .backward
            .get(permission)
            .copied()
            .ok_or_else(|| MappingError::NoMedicalResourceTypeForPermission(permission.to_owned()))
    }

    /// Every medical read permission.
    pub fn read_permissions() -> impl Iterator<Item = &'static str> {
        Self::table().backward.keys().copied()
    }
}

/// Who is calling, and what they have been granted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallerIdentity {
    package_name: PackageName,
    granted_permissions: HashSet<String>,
}

impl CallerIdentity {
    pub fn new<I, S>(package_name: PackageName, granted_permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            package_name,
            granted_permissions: granted_permissions.into_iter().map(Into::into).collect(),
        }
    }

    /// A caller holding the write permission and every medical read permission.
    pub fn with_all_medical_permissions(package_name: PackageName) -> Self {
        let permissions = std::iter::once(WRITE_MEDICAL_DATA)
            .chain(MedicalResourceTypePermissionMapper::read_permissions());
        Self::new(package_name, permissions)
    }

    pub fn package_name(&self) -> &PackageName {
        &self.package_name
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.granted_permissions.contains(permission)
    }

    pub fn can_write(&self) -> bool {
        self.has_permission(WRITE_MEDICAL_DATA)
    }

    pub fn has_any_read_permission(&self) -> bool {
        MedicalResourceTypePermissionMapper::read_permissions().any(|p| self.has_permission(p))
    }

    /// Whether the caller may read rows of `medical_resource_type` written by other apps.
    pub fn can_read_all(&self, medical_resource_type: MedicalResourceType) -> MedicalResult<bool> {
        let permission = MedicalResourceTypePermissionMapper::read_permission_for(
            medical_resource_type,
        )
        .inspect_err(|e| tracing::error!("permission lookup failed: {}", e))?;
        Ok(self.has_permission(permission))
    }
}

/// Which rows a read may return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadScope {
    /// Rows from every app's data sources.
    AllPackages,
    /// Only rows in data sources owned by the caller.
    OwnPackage,
}

/// Decides the read scope for `medical_resource_type`.
///
/// # Errors
///
/// - [`MedicalError::Invariant`] if the type has no read permission mapping.
/// - [`MedicalError::PermissionDenied`] if the caller holds neither the type's read permission
///   nor the write permission.
pub fn read_scope_for(
    caller: &CallerIdentity,
    medical_resource_type: MedicalResourceType,
) -> MedicalResult<ReadScope> {
    if caller.can_read_all(medical_resource_type)? {
        return Ok(ReadScope::AllPackages);
    }
    if caller.can_write() {
        return Ok(ReadScope::OwnPackage);
    }
    Err(MedicalError::PermissionDenied(format!(
        "{} may not read {} resources",
        caller.package_name(),
        medical_resource_type
    )))
}

/// # Errors
///
/// Returns [`MedicalError::PermissionDenied`] unless the caller holds [`WRITE_MEDICAL_DATA`].
pub fn require_write(caller: &CallerIdentity) -> MedicalResult<()> {
    if caller.can_write() {
        Ok(())
    } else {
        Err(MedicalError::PermissionDenied(format!(
            "{} does not hold {}",
            caller.package_name(),
            WRITE_MEDICAL_DATA
        )))
    }
}

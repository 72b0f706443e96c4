//! Name-based (version 3) UUID derivation.
//!
//! The algorithm matches `java.util.UUID.nameUUIDFromBytes`: MD5 over the raw name bytes with
//! **no namespace prefix**, then the version nibble is forced to `3` and the variant bits to the
//! RFC 4122 layout. `Uuid::new_v3` is not used because it hashes a namespace UUID ahead of the
//! name, which would produce different ids for the same input.

use md5::{Digest, Md5};
use uuid::Uuid;

/// Byte 6 high nibble carries the version.
const VERSION_BYTE: usize = 6;
const VERSION_3: u8 = 0x30;

/// Byte 8 top two bits carry the variant.
const VARIANT_BYTE: usize = 8;
const VARIANT_RFC4122: u8 = 0x80;

/// Computes a version 3 UUID directly from `name`.
pub fn name_uuid_from_bytes(name: &[u8]) -> Uuid {
    let digest = Md5::digest(name);

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);

    bytes[VERSION_BYTE] = (bytes[VERSION_BYTE] & 0x0f) | VERSION_3;
    bytes[VARIANT_BYTE] = (bytes[VARIANT_BYTE] & 0x3f) | VARIANT_RFC4122;

    Uuid::from_bytes(bytes)
}

/// Derives the storage identity of a medical resource.
///
/// The name bytes are the UTF-8 encodings of the three arguments concatenated in this fixed
/// order, with no separator bytes:
///
/// ```text
/// fhir_resource_id || fhir_resource_type || data_source_id
/// ```
///
/// `fhir_resource_type` is expected to be the canonical upper-case type name (for example
/// `IMMUNIZATION`), so the casing chosen by the submitting app does not change the identity.
///
/// The same three inputs always produce the same UUID; this is a storage-format contract.
pub fn derive_medical_resource_uuid(
    fhir_resource_id: &str,
    fhir_resource_type: &str,
    data_source_id: &str,
) -> Uuid {
    let mut name = Vec::with_capacity(
        fhir_resource_id.len() + fhir_resource_type.len() + data_source_id.len(),
    );
    name.extend_from_slice(fhir_resource_id.as_bytes());
    name.extend_from_slice(fhir_resource_type.as_bytes());
    name.extend_from_slice(data_source_id.as_bytes());

    name_uuid_from_bytes(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_java_name_uuid_from_bytes() {
        // Reference values produced by java.util.UUID.nameUUIDFromBytes.
        assert_eq!(
            name_uuid_from_bytes(b"abcIMMUNIZATIONds1").to_string(),
            "227fcecc-2140-34c7-a246-2b5d337a9e1f"
        );
        assert_eq!(
            name_uuid_from_bytes(b"").to_string(),
            "d41d8cd9-8f00-3204-a980-0998ecf8427e"
        );
    }

    #[test]
    fn test_derived_uuid_is_version_3_rfc4122() {
        let uuid = derive_medical_resource_uuid("abc", "IMMUNIZATION", "ds1");

        assert_eq!(uuid.get_version_num(), 3);
        assert_eq!(uuid.get_variant(), uuid::Variant::RFC4122);
    }

    #[test]
    fn test_derivation_concatenates_without_separator() {
        assert_eq!(
            derive_medical_resource_uuid("abc", "IMMUNIZATION", "ds1"),
            name_uuid_from_bytes(b"abcIMMUNIZATIONds1")
        );
        // Shifting characters between fields does not change the name bytes.
        assert_eq!(
            derive_medical_resource_uuid("ab", "cIMMUNIZATION", "ds1"),
            derive_medical_resource_uuid("abc", "IMMUNIZATION", "ds1")
        );
    }

    #[test]
    fn test_derivation_is_reproducible_and_source_sensitive() {
        let first = derive_medical_resource_uuid("abc", "IMMUNIZATION", "ds1");
        let again = derive_medical_resource_uuid("abc", "IMMUNIZATION", "ds1");
        let other_source = derive_medical_resource_uuid("abc", "IMMUNIZATION", "ds2");

        assert_eq!(first, again);
        assert_ne!(first, other_source);
        assert_eq!(
            other_source.to_string(),
            "19776abd-be20-3f22-8245-269cff95e51d"
        );
    }

    #[test]
    fn test_derivation_with_canonical_data_source_id() {
        assert_eq!(
            derive_medical_resource_uuid(
                "immunization-1",
                "IMMUNIZATION",
                "3f2504e04f8941d39a0c0305e82c3301"
            )
            .to_string(),
            "e963f235-47a4-3e94-97b8-8b7a6398a893"
        );
    }
}

//! Raw FHIR resources as submitted by apps.

use crate::{FhirError, FhirResourceType, FhirResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A FHIR resource in its raw JSON form, together with the identity fields extracted from it.
///
/// Invariants enforced at construction:
/// - `resource_type` is a recognised type (never [`FhirResourceType::Unknown`])
/// - `id` is non-empty
/// - `data` is non-empty
///
/// `data` is kept byte-for-byte as supplied; it is the canonical persisted representation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FhirResourceWire", into = "FhirResourceWire")]
pub struct FhirResource {
    resource_type: FhirResourceType,
    id: String,
    data: String,
}

impl FhirResource {
    /// Creates a resource after checking the construction invariants.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidResource`] if the type is unknown or `id`/`data` is empty.
    pub fn new(
        resource_type: FhirResourceType,
        id: impl Into<String>,
        data: impl Into<String>,
    ) -> FhirResult<Self> {
        let id = id.into();
        let data = data.into();

        if !resource_type.is_known() {
            return Err(FhirError::InvalidResource(
                "resource type must be a recognised FHIR resource type".into(),
            ));
        }
        if id.is_empty() {
            return Err(FhirError::InvalidResource("id cannot be empty".into()));
        }
        if data.is_empty() {
            return Err(FhirError::InvalidResource("data cannot be empty".into()));
        }

        Ok(Self {
            resource_type,
            id,
            data,
        })
    }

    pub fn resource_type(&self) -> FhirResourceType {
        self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    /// A short human-readable label derived from the raw data.
    ///
    /// For immunizations this is `vaccineCode.text`, falling back to the first non-empty
    /// `vaccineCode.coding[].display`. Anything else, including data that no longer parses,
    /// yields `"<resourceType>/<id>"`. Never fails.
    pub fn display_name(&self) -> String {
        let parsed: Option<Value> = serde_json::from_str(&self.data).ok();

        let label = parsed.as_ref().and_then(|value| match self.resource_type {
            FhirResourceType::Immunization => immunization_label(value),
            _ => None,
        });

        label.unwrap_or_else(|| {
            let type_name = parsed
                .as_ref()
                .and_then(|v| v.get("resourceType"))
                .and_then(Value::as_str)
                .unwrap_or(self.resource_type.name());
            format!("{}/{}", type_name, self.id)
        })
    }
}

fn immunization_label(value: &Value) -> Option<String> {
    let vaccine_code = value.get("vaccineCode")?;

    let non_empty = |v: &Value| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };

    if let Some(text) = vaccine_code.get("text").and_then(non_empty) {
        return Some(text);
    }

    vaccine_code
        .get("coding")?
        .as_array()?
        .iter()
        .find_map(|coding| coding.get("display").and_then(non_empty))
}

/// On-disk shape of a [`FhirResource`]. Deserialisation re-checks the invariants.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FhirResourceWire {
    resource_type: FhirResourceType,
    id: String,
    data: String,
}

impl TryFrom<FhirResourceWire> for FhirResource {
    type Error = FhirError;

    fn try_from(wire: FhirResourceWire) -> Result<Self, Self::Error> {
        FhirResource::new(wire.resource_type, wire.id, wire.data)
    }
}

impl From<FhirResource> for FhirResourceWire {
    fn from(resource: FhirResource) -> Self {
        Self {
            resource_type: resource.resource_type,
            id: resource.id,
            data: resource.data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn immunization(data: &str) -> FhirResource {
        FhirResource::new(FhirResourceType::Immunization, "imm-1", data).unwrap()
    }

    #[test]
    fn test_new_enforces_invariants() {
        assert!(FhirResource::new(FhirResourceType::Unknown, "a", "{}").is_err());
        assert!(FhirResource::new(FhirResourceType::Immunization, "", "{}").is_err());
        assert!(FhirResource::new(FhirResourceType::Immunization, "a", "").is_err());
        assert!(FhirResource::new(FhirResourceType::Observation, "a", "{}").is_ok());
    }

    #[test]
    fn test_display_name_prefers_vaccine_code_text() {
        let resource = immunization(
            r#"{"resourceType":"Immunization","id":"imm-1","vaccineCode":{"text":"MMR","coding":[{"display":"Measles"}]}}"#,
        );
        assert_eq!(resource.display_name(), "MMR");
    }

    #[test]
    fn test_display_name_falls_back_to_coding_display() {
        let resource = immunization(
            r#"{"resourceType":"Immunization","id":"imm-1","vaccineCode":{"text":"  ","coding":[{"code":"03"},{"display":"Measles"}]}}"#,
        );
        assert_eq!(resource.display_name(), "Measles");
    }

    #[test]
    fn test_display_name_falls_back_to_type_and_id() {
        let resource = immunization(r#"{"resourceType":"Immunization","id":"imm-1"}"#);
        assert_eq!(resource.display_name(), "Immunization/imm-1");

        let unparsable = immunization("not json");
        assert_eq!(unparsable.display_name(), "IMMUNIZATION/imm-1");
    }

    #[test]
    fn test_serde_round_trip_keeps_data_verbatim() {
        let data = "{\"id\" : \"imm-1\",\n \"resourceType\":\"Immunization\"}";
        let resource = immunization(data);

        let json = serde_json::to_string(&resource).unwrap();
        let back: FhirResource = serde_json::from_str(&json).unwrap();

        assert_eq!(back, resource);
        assert_eq!(back.data(), data);
    }

    #[test]
    fn test_deserialize_rechecks_invariants() {
        let json = r#"{"resource_type":1,"id":"","data":"{}"}"#;
        assert!(serde_json::from_str::<FhirResource>(json).is_err());

        let json = r#"{"resource_type":0,"id":"a","data":"{}"}"#;
        assert!(serde_json::from_str::<FhirResource>(json).is_err());
    }
}

//! DIF Presentation Exchange shapes used by OID4VP requests, restricted to
//! what an mdoc presentation needs.

use serde::{Deserialize, Serialize};

/// A Presentation Definition (DIF PE v2). Each input descriptor's `id` names
/// the requested `docType`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PresentationDefinition {
    pub id: String,

    pub input_descriptors: Vec<InputDescriptor>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputDescriptor {
    /// For mdoc requests, the `docType` of the requested document.
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<serde_json::Value>,

    pub constraints: Constraints,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Constraints {
    /// When `"required"`, only the fields listed below may be disclosed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_disclosure: Option<LimitDisclosure>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<Field>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LimitDisclosure {
    Required,
    Preferred,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    /// JSONPath-style selectors; for mdocs, `$['namespace']['element']`.
    pub path: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent_to_retain: Option<bool>,
}

impl InputDescriptor {
    /// The `(namespace, elementIdentifier)` pairs this descriptor selects.
    pub fn requested_elements(&self) -> Vec<(String, String)> {
        self.constraints
            .fields
            .iter()
            .flatten()
            .flat_map(|field| field.path.iter())
            .filter_map(|path| parse_mdoc_path(path))
            .collect()
    }

    pub fn limit_disclosure_required(&self) -> bool {
        matches!(
            self.constraints.limit_disclosure,
            Some(LimitDisclosure::Required)
        )
    }
}

/// Parse a `$['namespace']['element']` selector.
pub fn parse_mdoc_path(path: &str) -> Option<(String, String)> {
    let rest = path.strip_prefix("$['")?;
    let (namespace, rest) = rest.split_once("']['")?;
    let element = rest.strip_suffix("']")?;
    if namespace.is_empty() || element.is_empty() || element.contains("']['") {
        return None;
    }
    Some((namespace.to_string(), element.to_string()))
}

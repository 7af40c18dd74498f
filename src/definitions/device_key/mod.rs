//! The holder's device key, as carried in the MSO's `deviceKeyInfo`.

pub mod cose_key;

use ciborium::Value;
use serde::{Deserialize, Serialize};

pub use cose_key::{CoseKey, EC2Curve, OKPCurve, EC2Y};

use crate::definitions::helpers::{NonEmptyMap, NonEmptyVec};

/// Information about the device key: the key itself plus optional
/// authorizations limiting what it may sign over.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceKeyInfo {
    pub device_key: CoseKey,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_authorizations: Option<KeyAuthorizations>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_info: Option<Value>,
}

impl From<CoseKey> for DeviceKeyInfo {
    fn from(device_key: CoseKey) -> Self {
        Self {
            device_key,
            key_authorizations: None,
            key_info: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAuthorizations {
    #[serde(skip_serializing_if = "Option::is_none", rename = "nameSpaces")]
    pub namespaces: Option<NonEmptyVec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_elements: Option<NonEmptyMap<String, NonEmptyVec<String>>>,
}

impl KeyAuthorizations {
    /// A namespace authorized as a whole cannot also appear in the
    /// per-element authorizations.
    pub fn validate(&self) -> Result<(), Error> {
        let Some(data_elements) = &self.data_elements else {
            return Ok(());
        };
        if let Some(namespaces) = &self.namespaces {
            for namespace in namespaces.iter() {
                if data_elements.get(namespace).is_some() {
                    return Err(Error::DoubleAuthorized(namespace.clone()));
                }
            }
        }
        Ok(())
    }

    /// Whether the key is permitted to sign over the designated element.
    pub fn permitted(&self, namespace: &str, element_identifier: &str) -> bool {
        if let Some(namespaces) = self.namespaces.as_ref() {
            if namespaces.iter().any(|ns| ns == namespace) {
                return true;
            }
        }
        if let Some(data_elements) = self.data_elements.as_ref() {
            if let Some(elements) = data_elements.get(namespace) {
                return elements.iter().any(|el| el == element_identifier);
            }
        }
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(
        "namespace '{0}' cannot be present in both authorized namespaces and authorized data elements"
    )]
    DoubleAuthorized(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn double_authorization_is_rejected() {
        let auth = KeyAuthorizations {
            namespaces: Some(NonEmptyVec::new("ns".to_string())),
            data_elements: Some(NonEmptyMap::new(
                "ns".to_string(),
                NonEmptyVec::new("element".to_string()),
            )),
        };
        assert!(auth.validate().is_err());
    }

    #[test]
    fn permitted_elements() {
        let auth = KeyAuthorizations {
            namespaces: Some(NonEmptyVec::new("ns-a".to_string())),
            data_elements: Some(NonEmptyMap::new(
                "ns-b".to_string(),
                NonEmptyVec::new("element".to_string()),
            )),
        };
        assert!(auth.permitted("ns-a", "anything"));
        assert!(auth.permitted("ns-b", "element"));
        assert!(!auth.permitted("ns-b", "other"));
        assert!(!auth.permitted("ns-c", "element"));
    }
}

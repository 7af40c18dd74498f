//! The top-level `DeviceResponse` envelope (ISO/IEC 18013-5 §8.3.2.1.2.2).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cbor;
use crate::definitions::{
    helpers::{NonEmptyMap, NonEmptyVec},
    DeviceSigned, IssuerSigned,
};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceResponse {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub documents: Option<Documents>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_errors: Option<DocumentErrors>,
    pub status: Status,
}

pub type Documents = NonEmptyVec<Document>;

/// A presented document. `device_signed` is absent for bare issuer-signed
/// documents, e.g. an OID4VCI payload re-wrapped for transport.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub doc_type: String,
    pub issuer_signed: IssuerSigned,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_signed: Option<DeviceSigned>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Errors>,
}

pub type Errors = NonEmptyMap<String, NonEmptyMap<String, i128>>;

pub type DocumentErrors = NonEmptyVec<HashMap<String, i128>>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "u64", into = "u64")]
pub enum Status {
    OK,
    GeneralError,
    CborDecodingError,
    CborValidationError,
}

impl DeviceResponse {
    pub const VERSION: &'static str = "1.0";

    /// Wrap documents in a success response.
    pub fn new(documents: Documents) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            documents: Some(documents),
            document_errors: None,
            status: Status::OK,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, cbor::CborError> {
        cbor::to_vec(self)
    }
}

impl From<Status> for u64 {
    fn from(s: Status) -> u64 {
        match s {
            Status::OK => 0,
            Status::GeneralError => 10,
            Status::CborDecodingError => 11,
            Status::CborValidationError => 12,
        }
    }
}

impl TryFrom<u64> for Status {
    type Error = String;

    fn try_from(n: u64) -> Result<Status, String> {
        match n {
            0 => Ok(Status::OK),
            10 => Ok(Status::GeneralError),
            11 => Ok(Status::CborDecodingError),
            12 => Ok(Status::CborValidationError),
            _ => Err(format!("unrecognised status code: {n}")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(u64::from(Status::OK), 0);
        assert_eq!(Status::try_from(11).unwrap(), Status::CborDecodingError);
        assert!(Status::try_from(1).is_err());
    }

    #[test]
    fn version_is_fixed() {
        // A response built by this crate always reports protocol 1.0.
        let value = cbor::into_value(&Status::OK).unwrap();
        assert_eq!(value.as_integer().unwrap(), 0.into());
        assert_eq!(DeviceResponse::VERSION, "1.0");
    }
}

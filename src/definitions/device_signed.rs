//! The device-signed half of a presented mdoc: the (usually empty) device
//! namespaces and the device authentication over the session transcript.

use std::collections::BTreeMap;

use ciborium::Value;
use coset::{CoseMac0, CoseSign1};
use serde::{ser, Deserialize, Serialize, Serializer};

use crate::cose::MaybeTagged;
use crate::definitions::helpers::{NonEmptyMap, Tag24};
use crate::definitions::session::SessionTranscript;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSigned {
    #[serde(rename = "nameSpaces")]
    pub namespaces: DeviceNamespacesBytes,
    pub device_auth: DeviceAuth,
}

pub type DeviceNamespacesBytes = Tag24<DeviceNamespaces>;
pub type DeviceNamespaces = BTreeMap<String, DeviceSignedItems>;
pub type DeviceSignedItems = NonEmptyMap<String, Value>;

/// Either an ECDSA/EdDSA signature or an HMAC tag over the
/// `DeviceAuthentication` bytes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceAuth {
    DeviceSignature(MaybeTagged<CoseSign1>),
    DeviceMac(MaybeTagged<CoseMac0>),
}

/// The detached structure a device authentication is computed over
/// (ISO/IEC 18013-5 §9.1.3):
/// `["DeviceAuthentication", SessionTranscript, docType, DeviceNameSpacesBytes]`.
///
/// Only ever built and encoded, never parsed: the verifier reconstructs it
/// from its own copy of the session transcript.
#[derive(Clone, Debug)]
pub struct DeviceAuthentication {
    session_transcript: SessionTranscript,
    doc_type: String,
    namespaces_bytes: DeviceNamespacesBytes,
}

impl DeviceAuthentication {
    pub fn new(
        session_transcript: SessionTranscript,
        doc_type: String,
        namespaces_bytes: DeviceNamespacesBytes,
    ) -> Self {
        Self {
            session_transcript,
            doc_type,
            namespaces_bytes,
        }
    }
}

impl Serialize for DeviceAuthentication {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let transcript =
            crate::cbor::into_value(&self.session_transcript).map_err(ser::Error::custom)?;
        Value::Array(vec![
            Value::Text("DeviceAuthentication".to_string()),
            transcript,
            Value::Text(self.doc_type.clone()),
            self.namespaces_bytes.clone().into(),
        ])
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;
    use crate::definitions::session::OID4VPHandover;

    #[test]
    fn device_authentication_layout() {
        let handover = OID4VPHandover::compute(
            "https://verifier.example.com",
            "https://verifier.example.com/response",
            "verifier-nonce",
            "device-nonce",
        );
        let transcript = SessionTranscript::for_oid4vp(handover);
        let namespaces = Tag24::new(DeviceNamespaces::new()).unwrap();
        let auth =
            DeviceAuthentication::new(transcript, "org.iso.18013.5.1.mDL".to_string(), namespaces);

        let value = cbor::into_value(&auth).unwrap();
        let array = value.into_array().unwrap();
        assert_eq!(array.len(), 4);
        assert_eq!(array[0].as_text().unwrap(), "DeviceAuthentication");
        // OID4VP transcripts carry no device engagement or reader key.
        let transcript = array[1].as_array().unwrap();
        assert!(transcript[0].is_null());
        assert!(transcript[1].is_null());
        assert_eq!(array[2].as_text().unwrap(), "org.iso.18013.5.1.mDL");
        // Tag 24 of the empty device namespaces map.
        let Value::Tag(24, inner) = &array[3] else {
            panic!("expected tag 24");
        };
        assert_eq!(inner.as_bytes().unwrap().as_slice(), &[0xa0]);
    }
}

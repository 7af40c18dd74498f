//! Issuing mdocs: the document builder and the issued document type.

mod builder;

use std::collections::BTreeMap;

use ciborium::Value;

use crate::definitions::{helpers::Tag24, Document, IssuerSigned, Mso};

pub use builder::{
    DeviceKey, DocumentBuilder, Error, ExternalSigner, IssuerKey, SignContext, SignOptions,
    ValidityArgs,
};

/// An issued document: the issuer-signed namespaces and `IssuerAuth`,
/// bound to a `docType`.
///
/// This is the shape OID4VCI delivers (without the `docType`, which the
/// credential configuration carries out of band) and the input to a
/// presentation.
#[derive(Debug, Clone)]
pub struct IssuerSignedDocument {
    pub doc_type: String,
    pub issuer_signed: IssuerSigned,
}

impl IssuerSignedDocument {
    /// Decode the MSO from the `IssuerAuth` payload.
    pub fn mso(&self) -> Result<Mso, Error> {
        let payload = self
            .issuer_signed
            .issuer_auth
            .inner
            .payload
            .as_ref()
            .ok_or(Error::DetachedIssuerAuth)?;
        let mso: Tag24<Mso> = crate::cbor::from_slice(payload).map_err(Error::InvalidMso)?;
        Ok(mso.into_inner())
    }

    /// The namespaces with disclosed elements, in stored order.
    pub fn namespaces(&self) -> Vec<String> {
        self.issuer_signed
            .namespaces
            .as_ref()
            .map(|ns| ns.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// The disclosed elements of one namespace, keyed by element identifier.
    pub fn get_issuer_namespace(&self, namespace: &str) -> Option<BTreeMap<String, Value>> {
        let items = self.issuer_signed.namespaces.as_ref()?.get(namespace)?;
        Some(
            items
                .iter()
                .map(|item| {
                    let item = item.as_ref();
                    (item.element_identifier.clone(), item.element_value.clone())
                })
                .collect(),
        )
    }

    /// Encode the bare `{nameSpaces, issuerAuth}` structure for OID4VCI.
    pub fn encode_issuer_signed(&self) -> Result<Vec<u8>, crate::oid4vci::Error> {
        crate::oid4vci::encode_issuer_signed(self)
    }

    /// Wrap into a `DeviceResponse` document with no device authentication.
    pub fn into_document(self) -> Document {
        Document {
            doc_type: self.doc_type,
            issuer_signed: self.issuer_signed,
            device_signed: None,
            errors: None,
        }
    }
}

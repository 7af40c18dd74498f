//! The bare `IssuerSigned` carrier used by OID4VCI (§A.2.4): a two-key CBOR
//! map `{nameSpaces, issuerAuth}`, base64url-encoded without padding, with
//! the `docType` carried out of band.

use ciborium::Value;

use crate::cbor;
use crate::definitions::IssuerSigned;
use crate::issuance::IssuerSignedDocument;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to decode IssuerSigned payload: {0}")]
    Decode(#[source] cbor::CborError),
    #[error("Unable to encode IssuerSigned payload: {0}")]
    Encode(#[source] cbor::CborError),
    #[error("Invalid IssuerSigned structure: missing nameSpaces or issuerAuth")]
    MissingFields,
    #[error("Invalid IssuerSigned structure: expected a CBOR map")]
    NotAMap,
    #[error("Invalid base64url payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("the issuer auth does not carry an MSO payload")]
    MissingMsoPayload,
    #[error("unable to decode the MSO: {0}")]
    InvalidMso(String),
    #[error("docType mismatch: expected '{expected}', found '{found}'")]
    DocTypeMismatch { expected: String, found: String },
    #[error("unsupported MSO version: '{0}'")]
    UnsupportedVersion(String),
}

/// Encode the exact `{nameSpaces, issuerAuth}` map. The `docType` is never
/// included.
pub fn encode_issuer_signed(document: &IssuerSignedDocument) -> Result<Vec<u8>, Error> {
    cbor::to_vec(&document.issuer_signed).map_err(Error::Encode)
}

/// [encode_issuer_signed], base64url-encoded without padding.
pub fn encode_issuer_signed_base64url(document: &IssuerSignedDocument) -> Result<String, Error> {
    Ok(base64::encode_config(
        encode_issuer_signed(document)?,
        base64::URL_SAFE_NO_PAD,
    ))
}

/// Parse an OID4VCI `IssuerSigned` payload into a document with the given
/// `docType`.
///
/// The payload must be a CBOR map carrying both `nameSpaces` and
/// `issuerAuth`; the MSO inside the issuer auth must declare version 1.0
/// and the same `docType` the credential configuration promised.
pub fn parse_issuer_signed(bytes: &[u8], doc_type: &str) -> Result<IssuerSignedDocument, Error> {
    let value: Value = cbor::from_slice(bytes).map_err(Error::Decode)?;
    let Value::Map(entries) = &value else {
        return Err(Error::NotAMap);
    };

    let has_key = |name: &str| {
        entries
            .iter()
            .any(|(k, _)| matches!(k, Value::Text(t) if t == name))
    };
    if !has_key("nameSpaces") || !has_key("issuerAuth") {
        return Err(Error::MissingFields);
    }

    let issuer_signed: IssuerSigned = cbor::from_value(value).map_err(Error::Decode)?;
    let document = IssuerSignedDocument {
        doc_type: doc_type.to_string(),
        issuer_signed,
    };

    let mso = match &document.issuer_signed.issuer_auth.inner.payload {
        None => return Err(Error::MissingMsoPayload),
        Some(_) => document
            .mso()
            .map_err(|e| Error::InvalidMso(e.to_string()))?,
    };
    if mso.version != "1.0" {
        return Err(Error::UnsupportedVersion(mso.version));
    }
    if mso.doc_type != doc_type {
        return Err(Error::DocTypeMismatch {
            expected: doc_type.to_string(),
            found: mso.doc_type,
        });
    }

    Ok(document)
}

/// [parse_issuer_signed] over a base64url payload without padding.
pub fn parse_issuer_signed_base64url(
    payload: &str,
    doc_type: &str,
) -> Result<IssuerSignedDocument, Error> {
    let bytes = base64::decode_config(payload, base64::URL_SAFE_NO_PAD)?;
    parse_issuer_signed(&bytes, doc_type)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn garbage_fails_to_parse() {
        let err = parse_issuer_signed(b"invalid", "org.iso.18013.5.1.mDL").unwrap_err();
        assert!(matches!(err, Error::Decode(_) | Error::NotAMap));
    }

    #[test]
    fn missing_namespaces_is_reported() {
        // A map carrying only issuerAuth.
        let map = Value::Map(vec![(
            Value::Text("issuerAuth".to_string()),
            Value::Array(vec![]),
        )]);
        let bytes = cbor::to_vec(&map).unwrap();
        let err = parse_issuer_signed(&bytes, "org.iso.18013.5.1.mDL").unwrap_err();
        assert!(err
            .to_string()
            .contains("missing nameSpaces or issuerAuth"));
    }
}

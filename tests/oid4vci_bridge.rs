//! The OID4VCI bare-IssuerSigned bridge: encode, re-parse, and re-present
//! as a DeviceResponse.

mod common;

use ciborium::Value;
use mdoc::definitions::helpers::NonEmptyVec;
use mdoc::definitions::{DeviceResponse, Status};
use mdoc::{cbor, oid4vci, parse_issuer_signed, parse_issuer_signed_base64url};

use common::{issue_document, DOC_TYPE, NAMESPACE};

fn device_public_key() -> p256::PublicKey {
    p256::SecretKey::random(&mut rand_core::OsRng).public_key()
}

#[test]
fn encoded_issuer_signed_has_exactly_two_keys() {
    let document = issue_document(device_public_key());
    let bytes = document.encode_issuer_signed().unwrap();

    let value: Value = cbor::from_slice(&bytes).unwrap();
    let mut keys: Vec<String> = value
        .into_map()
        .expect("IssuerSigned should decode to a map")
        .into_iter()
        .map(|(k, _)| k.into_text().unwrap())
        .collect();
    keys.sort();
    // No docType on the wire.
    assert_eq!(keys, vec!["issuerAuth", "nameSpaces"]);
}

#[test]
fn base64url_payload_is_unpadded() {
    let document = issue_document(device_public_key());
    let payload = oid4vci::encode_issuer_signed_base64url(&document).unwrap();
    assert!(!payload.contains('+'));
    assert!(!payload.contains('/'));
    assert!(!payload.contains('='));

    let reparsed = parse_issuer_signed_base64url(&payload, DOC_TYPE).unwrap();
    assert_eq!(reparsed.doc_type, DOC_TYPE);
}

#[test]
fn parse_issuer_signed_roundtrip() {
    let document = issue_document(device_public_key());
    let bytes = document.encode_issuer_signed().unwrap();

    let reparsed = parse_issuer_signed(&bytes, DOC_TYPE).unwrap();
    assert_eq!(reparsed.doc_type, DOC_TYPE);
    assert_eq!(reparsed.namespaces(), vec![NAMESPACE.to_string()]);
    let elements = reparsed.get_issuer_namespace(NAMESPACE).unwrap();
    assert_eq!(elements["given_name"], Value::Text("John".into()));

    // Same MSO, same items, same signature bytes.
    assert_eq!(
        reparsed.issuer_signed.issuer_auth.inner.signature,
        document.issuer_signed.issuer_auth.inner.signature
    );
    assert_eq!(
        reparsed.encode_issuer_signed().unwrap(),
        bytes,
        "re-encoding the parsed document must reproduce the payload"
    );
}

#[test]
fn parse_enforces_the_doc_type() {
    let document = issue_document(device_public_key());
    let bytes = document.encode_issuer_signed().unwrap();
    let err = parse_issuer_signed(&bytes, "org.example.other").unwrap_err();
    assert!(err.to_string().contains("docType mismatch"));
}

#[test]
fn invalid_bytes_fail_to_parse() {
    assert!(parse_issuer_signed(b"invalid", DOC_TYPE).is_err());
}

#[test]
fn map_without_namespaces_is_rejected_with_a_specific_message() {
    let map = Value::Map(vec![(
        Value::Text("issuerAuth".to_string()),
        Value::Array(vec![]),
    )]);
    let bytes = cbor::to_vec(&map).unwrap();
    let err = parse_issuer_signed(&bytes, DOC_TYPE).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid IssuerSigned structure: missing nameSpaces or issuerAuth"
    );
}

#[test]
fn parsed_document_re_presents_as_a_device_response() {
    let document = issue_document(device_public_key());
    let bytes = document.encode_issuer_signed().unwrap();
    let reparsed = parse_issuer_signed(&bytes, DOC_TYPE).unwrap();

    let response = DeviceResponse::new(NonEmptyVec::new(reparsed.into_document()));
    let encoded = response.encode().unwrap();

    let decoded = mdoc::parse(&encoded).unwrap();
    assert_eq!(decoded.version, "1.0");
    assert_eq!(decoded.status, Status::OK);
    let documents = decoded.documents.expect("documents must be present");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].doc_type, DOC_TYPE);
    assert!(documents[0].issuer_signed.namespaces.is_some());
    assert!(documents[0].device_signed.is_none());

    // Top-level keys of the encoded response.
    let value: Value = cbor::from_slice(&encoded).unwrap();
    let mut keys: Vec<String> = value
        .into_map()
        .unwrap()
        .into_iter()
        .map(|(k, _)| k.into_text().unwrap())
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["documents", "status", "version"]);
}

//! Builds an OID4VP-bound `DeviceResponse` from issued documents.

use std::collections::BTreeMap;

use coset::iana;
use signature::Signer as _;

use crate::cbor::{self, CborError};
use crate::cose::mac0::PreparedCoseMac0;
use crate::cose::sign1::PreparedCoseSign1;
use crate::definitions::{
    helpers::{tag24, NonEmptyVec, Tag24},
    issuer_signed::IssuerNamespaces,
    oid4vp::PresentationDefinition,
    session::{self, derive_device_mac_key, OID4VPHandover},
    DeviceAuth, DeviceAuthentication, DeviceNamespaces, DeviceResponse, DeviceSigned, Document,
    SessionTranscript,
};
use crate::issuance::IssuerSignedDocument;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to decode device response: {0}")]
    Decode(#[source] CborError),
    #[error("the device response carries no documents")]
    NoDocuments,
    #[error("no document matched the presentation definition")]
    NothingToDisclose,
    #[error("a session transcript is required before authenticating")]
    MissingSessionTranscript,
    #[error("a device authentication method is required before signing")]
    MissingDeviceAuth,
    #[error("the device key cannot produce '{0:?}' signatures")]
    KeyAlgorithmMismatch(iana::Algorithm),
    #[error("unable to derive the device MAC key: {0}")]
    MacKeyDerivation(#[from] session::Error),
    #[error("unable to encode value as CBOR: {0}")]
    CborEncoding(#[from] CborError),
    #[error("unable to encode value as a tagged data item: {0}")]
    Tag24Encoding(#[from] tag24::Error),
    #[error("unable to prepare device signature: {0}")]
    CoseSign1(#[from] crate::cose::sign1::Error),
    #[error("unable to prepare device MAC: {0}")]
    CoseMac0(#[from] crate::cose::mac0::Error),
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// The holder's device key for signature-based device authentication.
pub enum DeviceSigningKey {
    P256(p256::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl From<p256::SecretKey> for DeviceSigningKey {
    fn from(key: p256::SecretKey) -> Self {
        DeviceSigningKey::P256(key)
    }
}

impl From<ed25519_dalek::SigningKey> for DeviceSigningKey {
    fn from(key: ed25519_dalek::SigningKey) -> Self {
        DeviceSigningKey::Ed25519(key)
    }
}

enum AuthMethod {
    Signature {
        key: DeviceSigningKey,
        alg: iana::Algorithm,
    },
    Mac {
        device_key: Box<p256::SecretKey>,
        reader_public_key: p256::PublicKey,
    },
}

struct Session {
    transcript: SessionTranscript,
    transcript_bytes: Vec<u8>,
}

/// Assembles a `DeviceResponse` for presentation.
///
/// The issuer's items are carried through bit-identically in their tag-24
/// encoding; this builder never re-encodes them, so the MSO digests remain
/// valid for whatever subset is disclosed.
pub struct DeviceResponseBuilder {
    documents: Vec<IssuerSignedDocument>,
    presentation_definition: Option<PresentationDefinition>,
    session: Option<Session>,
    auth: Option<AuthMethod>,
}

impl DeviceResponseBuilder {
    /// Start from encoded `DeviceResponse` bytes, e.g. a stored credential.
    pub fn from_bytes(issuer_mdoc_bytes: &[u8]) -> Result<Self> {
        let response: DeviceResponse =
            cbor::from_slice(issuer_mdoc_bytes).map_err(Error::Decode)?;
        let documents = response
            .documents
            .ok_or(Error::NoDocuments)?
            .into_iter()
            .map(|document| IssuerSignedDocument {
                doc_type: document.doc_type,
                issuer_signed: document.issuer_signed,
            })
            .collect();
        Ok(Self::new(documents))
    }

    /// Start from an already-parsed document.
    pub fn from_document(document: IssuerSignedDocument) -> Self {
        Self::new(vec![document])
    }

    fn new(documents: Vec<IssuerSignedDocument>) -> Self {
        Self {
            documents,
            presentation_definition: None,
            session: None,
            auth: None,
        }
    }

    /// Restrict disclosure per a DIF Presentation Exchange definition.
    pub fn using_presentation_definition(mut self, pd: PresentationDefinition) -> Self {
        self.presentation_definition = Some(pd);
        self
    }

    /// Bind the response to an OID4VP request per ISO 18013-7.
    pub fn using_session_transcript_for_oid4vp(
        mut self,
        mdoc_generated_nonce: &str,
        client_id: &str,
        response_uri: &str,
        verifier_generated_nonce: &str,
    ) -> Result<Self> {
        let handover = OID4VPHandover::compute(
            client_id,
            response_uri,
            verifier_generated_nonce,
            mdoc_generated_nonce,
        );
        let transcript = SessionTranscript::for_oid4vp(handover);
        let transcript_bytes = transcript.to_bytes()?;
        self.session = Some(Session {
            transcript,
            transcript_bytes,
        });
        Ok(self)
    }

    /// Authenticate with an ECDSA/EdDSA device signature.
    pub fn authenticate_with_signature(
        mut self,
        device_private_key: impl Into<DeviceSigningKey>,
        alg: iana::Algorithm,
    ) -> Self {
        self.auth = Some(AuthMethod::Signature {
            key: device_private_key.into(),
            alg,
        });
        self
    }

    /// Authenticate with an HMAC-SHA256 tag keyed by
    /// ECDH(device key, reader ephemeral key) via HKDF ("EMacKey").
    pub fn authenticate_with_mac(
        mut self,
        device_private_key: p256::SecretKey,
        ephemeral_reader_public_key: p256::PublicKey,
    ) -> Self {
        self.auth = Some(AuthMethod::Mac {
            device_key: Box::new(device_private_key),
            reader_public_key: ephemeral_reader_public_key,
        });
        self
    }

    /// Assemble and authenticate the response.
    pub fn sign(self) -> Result<DeviceResponse> {
        let session = self.session.ok_or(Error::MissingSessionTranscript)?;
        let auth = self.auth.ok_or(Error::MissingDeviceAuth)?;

        let mut documents = Vec::new();
        for document in self.documents {
            let Some(namespaces) =
                filter_namespaces(&document, self.presentation_definition.as_ref())
            else {
                tracing::warn!(
                    doc_type = %document.doc_type,
                    "document not requested by the presentation definition, skipping"
                );
                continue;
            };

            let device_namespaces = Tag24::new(DeviceNamespaces::new())?;
            let device_authentication = DeviceAuthentication::new(
                session.transcript.clone(),
                document.doc_type.clone(),
                device_namespaces.clone(),
            );
            let detached_payload = cbor::to_vec(&Tag24::new(device_authentication)?)?;

            let device_auth = match &auth {
                AuthMethod::Signature { key, alg } => {
                    device_signature(key, *alg, &detached_payload)?
                }
                AuthMethod::Mac {
                    device_key,
                    reader_public_key,
                } => device_mac(
                    device_key,
                    reader_public_key,
                    &session.transcript_bytes,
                    &detached_payload,
                )?,
            };

            documents.push(Document {
                doc_type: document.doc_type,
                issuer_signed: crate::definitions::IssuerSigned {
                    namespaces: Some(namespaces),
                    issuer_auth: document.issuer_signed.issuer_auth,
                },
                device_signed: Some(DeviceSigned {
                    namespaces: device_namespaces,
                    device_auth,
                }),
                errors: None,
            });
        }

        let documents = NonEmptyVec::try_from(documents).map_err(|_| Error::NothingToDisclose)?;
        Ok(DeviceResponse::new(documents))
    }
}

fn device_signature(
    key: &DeviceSigningKey,
    alg: iana::Algorithm,
    detached_payload: &[u8],
) -> Result<DeviceAuth> {
    let protected = coset::HeaderBuilder::new().algorithm(alg).build();
    let builder = coset::CoseSign1Builder::new().protected(protected);
    let prepared = PreparedCoseSign1::new(builder, Some(detached_payload), None, false)?;

    let signature = match (key, alg) {
        (DeviceSigningKey::P256(key), iana::Algorithm::ES256) => {
            let signer = p256::ecdsa::SigningKey::from(key);
            let signature: p256::ecdsa::Signature = signer.sign(prepared.signature_payload());
            signature.to_bytes().to_vec()
        }
        (DeviceSigningKey::Ed25519(key), iana::Algorithm::EdDSA) => {
            key.sign(prepared.signature_payload()).to_bytes().to_vec()
        }
        _ => return Err(Error::KeyAlgorithmMismatch(alg)),
    };

    Ok(DeviceAuth::DeviceSignature(prepared.finalize(signature)))
}

fn device_mac(
    device_key: &p256::SecretKey,
    reader_public_key: &p256::PublicKey,
    transcript_bytes: &[u8],
    detached_payload: &[u8],
) -> Result<DeviceAuth> {
    let e_mac_key = derive_device_mac_key(device_key, reader_public_key, transcript_bytes)?;
    let protected = coset::HeaderBuilder::new()
        .algorithm(iana::Algorithm::HMAC_256_256)
        .build();
    let builder = coset::CoseMac0Builder::new().protected(protected);
    let prepared = PreparedCoseMac0::new(builder, Some(detached_payload), None, false)?;
    Ok(DeviceAuth::DeviceMac(prepared.compute(e_mac_key.as_ref())?))
}

/// Select the items to disclose for one document.
///
/// With no presentation definition everything is disclosed. With one, the
/// input descriptor whose `id` equals the `docType` governs: all items
/// unless `limit_disclosure` is `"required"`, in which case only items whose
/// `(namespace, elementIdentifier)` matches a requested field path. Items
/// are cloned, never re-encoded.
fn filter_namespaces(
    document: &IssuerSignedDocument,
    pd: Option<&PresentationDefinition>,
) -> Option<IssuerNamespaces> {
    let namespaces = document.issuer_signed.namespaces.clone()?;

    let Some(pd) = pd else {
        return Some(namespaces);
    };
    let descriptor = pd
        .input_descriptors
        .iter()
        .find(|descriptor| descriptor.id == document.doc_type)?;
    if !descriptor.limit_disclosure_required() {
        return Some(namespaces);
    }

    let requested = descriptor.requested_elements();
    let mut filtered = BTreeMap::new();
    for (namespace, items) in namespaces.into_inner() {
        let kept: Vec<_> = items
            .into_inner()
            .into_iter()
            .filter(|item| {
                requested.iter().any(|(ns, element)| {
                    *ns == namespace && *element == item.as_ref().element_identifier
                })
            })
            .collect();
        if let Some(kept) = NonEmptyVec::maybe_new(kept) {
            filtered.insert(namespace, kept);
        }
    }
    IssuerNamespaces::maybe_new(filtered)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::definitions::oid4vp::{
        Constraints, Field, InputDescriptor, LimitDisclosure, PresentationDefinition,
    };
    use ciborium::Value;

    fn pd(limit: Option<LimitDisclosure>, paths: &[&str]) -> PresentationDefinition {
        PresentationDefinition {
            id: "test".to_string(),
            input_descriptors: vec![InputDescriptor {
                id: "org.iso.18013.5.1.mDL".to_string(),
                name: None,
                purpose: None,
                format: None,
                constraints: Constraints {
                    limit_disclosure: limit,
                    fields: Some(
                        paths
                            .iter()
                            .map(|path| Field {
                                path: vec![path.to_string()],
                                purpose: None,
                                intent_to_retain: Some(false),
                            })
                            .collect(),
                    ),
                },
            }],
            name: None,
            purpose: None,
        }
    }

    fn issued_document() -> IssuerSignedDocument {
        use crate::definitions::{
            helpers::{ByteStr, NonEmptyMap},
            DigestId, IssuerSignedItem,
        };
        let items = ["family_name", "given_name", "birth_date"]
            .iter()
            .enumerate()
            .map(|(i, element)| {
                Tag24::new(IssuerSignedItem {
                    digest_id: DigestId::new(i as i32),
                    random: ByteStr::from(vec![i as u8; 16]),
                    element_identifier: element.to_string(),
                    element_value: Value::Text("value".to_string()),
                })
                .unwrap()
            })
            .collect::<Vec<_>>();
        let namespaces = NonEmptyMap::new(
            "org.iso.18013.5.1".to_string(),
            NonEmptyVec::try_from(items).unwrap(),
        );
        let protected = coset::HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .build();
        let issuer_auth = PreparedCoseSign1::new(
            coset::CoseSign1Builder::new()
                .protected(protected)
                .payload(vec![0x00]),
            None,
            None,
            false,
        )
        .unwrap()
        .finalize(vec![0x42; 64]);
        IssuerSignedDocument {
            doc_type: "org.iso.18013.5.1.mDL".to_string(),
            issuer_signed: crate::definitions::IssuerSigned {
                namespaces: Some(namespaces),
                issuer_auth,
            },
        }
    }

    #[test]
    fn limit_disclosure_required_keeps_only_requested_items() {
        let document = issued_document();
        let pd = pd(
            Some(LimitDisclosure::Required),
            &["$['org.iso.18013.5.1']['family_name']"],
        );
        let filtered = filter_namespaces(&document, Some(&pd)).unwrap();
        let items = &filtered["org.iso.18013.5.1"];
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().element_identifier, "family_name");
    }

    #[test]
    fn limit_disclosure_preferred_keeps_everything() {
        let document = issued_document();
        let pd = pd(
            Some(LimitDisclosure::Preferred),
            &["$['org.iso.18013.5.1']['family_name']"],
        );
        let filtered = filter_namespaces(&document, Some(&pd)).unwrap();
        assert_eq!(filtered["org.iso.18013.5.1"].len(), 3);
    }

    #[test]
    fn unmatched_doc_type_is_skipped() {
        let mut document = issued_document();
        document.doc_type = "org.example.other".to_string();
        let pd = pd(Some(LimitDisclosure::Required), &[]);
        assert!(filter_namespaces(&document, Some(&pd)).is_none());
    }

    #[test]
    fn filtered_items_keep_their_bytes() {
        let document = issued_document();
        let original_bytes: Vec<Vec<u8>> = document.issuer_signed.namespaces.as_ref().unwrap()
            ["org.iso.18013.5.1"]
            .iter()
            .map(|item| cbor::to_vec(item).unwrap())
            .collect();
        let pd = pd(
            Some(LimitDisclosure::Required),
            &["$['org.iso.18013.5.1']['birth_date']"],
        );
        let filtered = filter_namespaces(&document, Some(&pd)).unwrap();
        let kept = cbor::to_vec(&filtered["org.iso.18013.5.1"][0]).unwrap();
        assert!(original_bytes.contains(&kept));
    }

    #[test]
    fn sign_requires_a_session_transcript() {
        let builder = DeviceResponseBuilder::from_document(issued_document())
            .authenticate_with_signature(
                p256::SecretKey::random(&mut rand_core::OsRng),
                iana::Algorithm::ES256,
            );
        assert!(matches!(
            builder.sign(),
            Err(Error::MissingSessionTranscript)
        ));
    }

    #[test]
    fn sign_requires_device_auth() {
        let builder = DeviceResponseBuilder::from_document(issued_document())
            .using_session_transcript_for_oid4vp("mdoc-nonce", "client", "uri", "nonce")
            .unwrap();
        assert!(matches!(builder.sign(), Err(Error::MissingDeviceAuth)));
    }
}

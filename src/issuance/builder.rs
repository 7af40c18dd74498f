//! The document builder: collects namespaces, computes the digest
//! commitment and signs the MSO.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use ciborium::Value;
use coset::iana;
use rand::Rng;
use signature::Signer as _;

use crate::cbor::CborError;
use crate::cose::sign1::PreparedCoseSign1;
use crate::definitions::{
    helpers::{tag24, NonEmptyMap, NonEmptyVec, Tag24},
    issuer_signed::{IssuerNamespaces, IssuerSignedItemBytes},
    x509::{X5Chain, X5CHAIN_HEADER_LABEL},
    CoseKey, DeviceKeyInfo, DigestAlgorithm, DigestId, DigestIds, IssuerSigned, IssuerSignedItem,
    Mso, ValidityInfo,
};
use crate::issuance::IssuerSignedDocument;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot provide both issuerPrivateKey and signer")]
    BothPrivateKeyAndSigner,
    #[error("Either issuerPrivateKey or signer must be provided")]
    NoPrivateKeyOrSigner,
    #[error("a digest algorithm must be selected before signing")]
    DigestAlgorithmUnset,
    #[error("validity info must be provided before signing")]
    ValidityInfoUnset,
    #[error("device key info must be provided before signing")]
    DeviceKeyInfoUnset,
    #[error("at least one namespace with at least one element is required")]
    NoNamespaces,
    #[error("digest ID collision in namespace '{0}'")]
    DigestIdCollision(String),
    #[error("the signing key cannot produce '{0:?}' signatures")]
    KeyAlgorithmMismatch(iana::Algorithm),
    #[error("invalid device key: {0}")]
    InvalidDeviceKey(crate::definitions::device_key::cose_key::Error),
    #[error("invalid validity info: {0}")]
    InvalidValidityInfo(#[from] crate::definitions::validity_info::Error),
    #[error("invalid key authorizations: {0}")]
    InvalidKeyAuthorizations(#[from] crate::definitions::device_key::Error),
    #[error("unable to encode value as CBOR: {0}")]
    CborEncoding(#[from] CborError),
    #[error("unable to encode value as a tagged data item: {0}")]
    Tag24Encoding(#[from] tag24::Error),
    #[error("unable to prepare COSE_Sign1: {0}")]
    CoseSign1(#[from] crate::cose::sign1::Error),
    #[error("the external signer failed: {0}")]
    ExternalSigner(#[source] anyhow::Error),
    #[error("the issuer auth payload was lost during preparation")]
    DetachedIssuerAuth,
    #[error("unable to decode the issuer auth payload as an MSO: {0}")]
    InvalidMso(#[source] CborError),
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// The issuer's signing key, held in-process.
pub enum IssuerKey {
    P256(p256::SecretKey),
    P384(p384::SecretKey),
    Ed25519(ed25519_dalek::SigningKey),
}

/// Context handed to a contextual external signer.
pub struct SignContext<'a> {
    /// The Sig_structure bytes the signature must cover.
    pub signature_payload: &'a [u8],
    pub protected: &'a coset::Header,
    pub unprotected: &'a coset::Header,
    pub algorithm: iana::Algorithm,
    /// The attached payload (the tag-24 wrapped MSO).
    pub payload: &'a [u8],
}

/// An out-of-process signer, e.g. an HSM.
///
/// The variant is chosen by the caller; there is no shape inspection and no
/// fallback between the two. A basic signer receives only the Sig_structure
/// bytes; a contextual signer additionally receives the headers, algorithm
/// and payload. Both return the raw signature (r||s for ES*, 64 bytes for
/// Ed25519).
pub enum ExternalSigner {
    Basic(Box<dyn Fn(&[u8]) -> anyhow::Result<Vec<u8>> + Send + Sync>),
    Contextual(Box<dyn Fn(SignContext<'_>) -> anyhow::Result<Vec<u8>> + Send + Sync>),
}

/// The device key accepted by [DocumentBuilder::add_device_key_info].
pub enum DeviceKey {
    Jwk(ssi_jwk::JWK),
    Cose(CoseKey),
}

impl From<ssi_jwk::JWK> for DeviceKey {
    fn from(jwk: ssi_jwk::JWK) -> Self {
        DeviceKey::Jwk(jwk)
    }
}

impl From<CoseKey> for DeviceKey {
    fn from(key: CoseKey) -> Self {
        DeviceKey::Cose(key)
    }
}

impl From<p256::PublicKey> for DeviceKey {
    fn from(key: p256::PublicKey) -> Self {
        DeviceKey::Cose(key.into())
    }
}

/// Arguments to [DocumentBuilder::add_validity_info]. `valid_from` defaults
/// to `signed` and `valid_until` to one year after `signed`.
#[derive(Debug, Clone)]
pub struct ValidityArgs {
    pub signed: DateTime<Utc>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub expected_update: Option<DateTime<Utc>>,
}

pub struct SignOptions {
    pub issuer_private_key: Option<IssuerKey>,
    pub signer: Option<ExternalSigner>,
    pub x5chain: X5Chain,
    pub alg: iana::Algorithm,
    pub kid: Option<Vec<u8>>,
}

/// Builds an [IssuerSignedDocument].
///
/// ```ignore
/// let document = DocumentBuilder::new("org.iso.18013.5.1.mDL")
///     .add_issuer_namespace("org.iso.18013.5.1", elements)
///     .use_digest_algorithm(DigestAlgorithm::SHA256)
///     .add_validity_info(validity)
///     .add_device_key_info(device_jwk)
///     .sign(options)?;
/// ```
pub struct DocumentBuilder {
    doc_type: String,
    namespaces: Vec<(String, Vec<(String, Value)>)>,
    digest_algorithm: Option<DigestAlgorithm>,
    validity: Option<ValidityArgs>,
    device_key: Option<DeviceKey>,
    key_authorizations: Option<crate::definitions::KeyAuthorizations>,
}

impl DocumentBuilder {
    pub fn new(doc_type: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            namespaces: Vec::new(),
            digest_algorithm: None,
            validity: None,
            device_key: None,
            key_authorizations: None,
        }
    }

    /// Append elements to a namespace, preserving insertion order.
    pub fn add_issuer_namespace(
        mut self,
        namespace: impl Into<String>,
        elements: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        let namespace = namespace.into();
        if let Some((_, existing)) = self.namespaces.iter_mut().find(|(ns, _)| *ns == namespace) {
            existing.extend(elements);
        } else {
            self.namespaces.push((namespace, elements.into_iter().collect()));
        }
        self
    }

    pub fn use_digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = Some(algorithm);
        self
    }

    pub fn add_validity_info(mut self, validity: ValidityArgs) -> Self {
        self.validity = Some(validity);
        self
    }

    pub fn add_device_key_info(mut self, device_key: impl Into<DeviceKey>) -> Self {
        self.device_key = Some(device_key.into());
        self
    }

    pub fn add_key_authorizations(
        mut self,
        authorizations: crate::definitions::KeyAuthorizations,
    ) -> Self {
        self.key_authorizations = Some(authorizations);
        self
    }

    pub fn sign(self, options: SignOptions) -> Result<IssuerSignedDocument> {
        let signer = match (options.issuer_private_key, options.signer) {
            (Some(_), Some(_)) => return Err(Error::BothPrivateKeyAndSigner),
            (None, None) => return Err(Error::NoPrivateKeyOrSigner),
            (Some(key), None) => Dispatch::Internal(key),
            (None, Some(signer)) => Dispatch::External(signer),
        };

        let digest_algorithm = self.digest_algorithm.ok_or(Error::DigestAlgorithmUnset)?;
        let validity = self.validity.ok_or(Error::ValidityInfoUnset)?;
        let validity_info = ValidityInfo::new(
            validity.signed,
            validity.valid_from,
            validity.valid_until,
            validity.expected_update,
        )?;

        let device_key = match self.device_key.ok_or(Error::DeviceKeyInfoUnset)? {
            DeviceKey::Cose(key) => key,
            DeviceKey::Jwk(jwk) => jwk.try_into().map_err(Error::InvalidDeviceKey)?,
        };
        if let Some(authorizations) = &self.key_authorizations {
            authorizations.validate()?;
        }
        let device_key_info = DeviceKeyInfo {
            device_key,
            key_authorizations: self.key_authorizations,
            key_info: None,
        };

        let issuer_namespaces = to_issuer_namespaces(self.namespaces)?;
        let value_digests = digest_namespaces(&issuer_namespaces, digest_algorithm)?;

        let mso = Mso {
            version: "1.0".to_string(),
            digest_algorithm,
            value_digests,
            device_key_info,
            doc_type: self.doc_type.clone(),
            validity_info,
        };
        let payload = crate::cbor::to_vec(&Tag24::new(mso)?)?;

        let protected = coset::HeaderBuilder::new().algorithm(options.alg).build();
        let mut unprotected =
            coset::HeaderBuilder::new().value(X5CHAIN_HEADER_LABEL, options.x5chain.into_cbor());
        if let Some(kid) = options.kid {
            unprotected = unprotected.key_id(kid);
        }
        let builder = coset::CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected.build())
            .payload(payload);
        let prepared = PreparedCoseSign1::new(builder, None, None, false)?;

        let signature = signer.sign(&prepared, options.alg)?;
        let issuer_auth = prepared.finalize(signature);

        Ok(IssuerSignedDocument {
            doc_type: self.doc_type,
            issuer_signed: IssuerSigned {
                namespaces: Some(issuer_namespaces),
                issuer_auth,
            },
        })
    }
}

enum Dispatch {
    Internal(IssuerKey),
    External(ExternalSigner),
}

impl Dispatch {
    fn sign(&self, prepared: &PreparedCoseSign1, alg: iana::Algorithm) -> Result<Vec<u8>> {
        let signature_payload = prepared.signature_payload();
        match self {
            Dispatch::Internal(IssuerKey::P256(key)) => {
                if alg != iana::Algorithm::ES256 {
                    return Err(Error::KeyAlgorithmMismatch(alg));
                }
                let signer = p256::ecdsa::SigningKey::from(key);
                let signature: p256::ecdsa::Signature = signer.sign(signature_payload);
                Ok(signature.to_bytes().to_vec())
            }
            Dispatch::Internal(IssuerKey::P384(key)) => {
                if alg != iana::Algorithm::ES384 {
                    return Err(Error::KeyAlgorithmMismatch(alg));
                }
                let signer = p384::ecdsa::SigningKey::from(key);
                let signature: p384::ecdsa::Signature = signer.sign(signature_payload);
                Ok(signature.to_bytes().to_vec())
            }
            Dispatch::Internal(IssuerKey::Ed25519(key)) => {
                if alg != iana::Algorithm::EdDSA {
                    return Err(Error::KeyAlgorithmMismatch(alg));
                }
                let signature = key.sign(signature_payload);
                Ok(signature.to_bytes().to_vec())
            }
            Dispatch::External(ExternalSigner::Basic(sign)) => {
                sign(signature_payload).map_err(Error::ExternalSigner)
            }
            Dispatch::External(ExternalSigner::Contextual(sign)) => {
                let context = SignContext {
                    signature_payload,
                    protected: prepared.protected(),
                    unprotected: prepared.unprotected(),
                    algorithm: alg,
                    payload: prepared.payload().ok_or(Error::DetachedIssuerAuth)?,
                };
                sign(context).map_err(Error::ExternalSigner)
            }
        }
    }
}

fn to_issuer_namespaces(
    namespaces: Vec<(String, Vec<(String, Value)>)>,
) -> Result<IssuerNamespaces> {
    let mut result = BTreeMap::new();
    for (namespace, elements) in namespaces {
        if elements.is_empty() {
            continue;
        }
        let mut used_ids = HashSet::new();
        let items = elements
            .into_iter()
            .map(|(element_identifier, element_value)| {
                let digest_id = generate_digest_id(&mut used_ids)
                    .ok_or_else(|| Error::DigestIdCollision(namespace.clone()))?;
                let random = rand::thread_rng().gen::<[u8; 16]>().to_vec().into();
                Tag24::new(IssuerSignedItem {
                    digest_id,
                    random,
                    element_identifier,
                    element_value,
                })
                .map_err(Error::from)
            })
            .collect::<Result<Vec<IssuerSignedItemBytes>>>()?;
        let items = NonEmptyVec::try_from(items).map_err(|_| Error::NoNamespaces)?;
        result.insert(namespace, items);
    }
    NonEmptyMap::try_from(result).map_err(|_| Error::NoNamespaces)
}

fn digest_namespaces(
    namespaces: &IssuerNamespaces,
    digest_algorithm: DigestAlgorithm,
) -> Result<BTreeMap<String, DigestIds>> {
    namespaces
        .iter()
        .map(|(namespace, items)| Ok((namespace.clone(), digest_namespace(items, digest_algorithm)?)))
        .collect()
}

fn digest_namespace(
    items: &[IssuerSignedItemBytes],
    digest_algorithm: DigestAlgorithm,
) -> Result<DigestIds> {
    let mut digests = DigestIds::new();
    for item in items {
        let digest_id = item.as_ref().digest_id;
        let bytes = crate::cbor::to_vec(item)?;
        if digests
            .insert(digest_id, digest_algorithm.digest(&bytes).into())
            .is_some()
        {
            return Err(Error::DigestIdCollision(
                item.as_ref().element_identifier.clone(),
            ));
        }
    }
    Ok(digests)
}

/// Draw random digest IDs until an unused one is found.
///
/// Returns None only if the id space is exhausted, which is unreachable for
/// realistic namespaces; bounded to keep the loop total.
fn generate_digest_id(used_ids: &mut HashSet<DigestId>) -> Option<DigestId> {
    for _ in 0..u16::MAX {
        // Shift keeps the id within the [0, 2^31 - 1] range DigestId requires.
        let digest_id = DigestId::new((rand::thread_rng().gen::<u32>() >> 1) as i32);
        if used_ids.insert(digest_id) {
            return Some(digest_id);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    static ISSUER_CERT: &[u8] = include_bytes!("../../test/issuance/issuer-cert.pem");
    static ISSUER_KEY: &str = include_str!("../../test/issuance/issuer-key.pem");

    fn builder() -> DocumentBuilder {
        let elements = [
            ("family_name".to_string(), Value::Text("Doe".into())),
            ("given_name".to_string(), Value::Text("John".into())),
        ];
        DocumentBuilder::new("org.iso.18013.5.1.mDL")
            .add_issuer_namespace("org.iso.18013.5.1", elements)
            .use_digest_algorithm(DigestAlgorithm::SHA256)
            .add_validity_info(ValidityArgs {
                signed: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
                valid_from: None,
                valid_until: None,
                expected_update: None,
            })
            .add_device_key_info(
                p256::SecretKey::random(&mut rand_core::OsRng).public_key(),
            )
    }

    fn sign_options() -> SignOptions {
        SignOptions {
            issuer_private_key: Some(IssuerKey::P256(
                p256::SecretKey::from_sec1_pem(ISSUER_KEY)
                    .or_else(|_| {
                        use p256::pkcs8::DecodePrivateKey;
                        p256::SecretKey::from_pkcs8_pem(ISSUER_KEY)
                    })
                    .unwrap(),
            )),
            signer: None,
            x5chain: X5Chain::builder()
                .with_pem(ISSUER_CERT)
                .unwrap()
                .build()
                .unwrap(),
            alg: iana::Algorithm::ES256,
            kid: None,
        }
    }

    #[test]
    fn issue_minimal_document() {
        let document = builder().sign(sign_options()).expect("failed to issue");
        assert_eq!(document.doc_type, "org.iso.18013.5.1.mDL");
        let mso = document.mso().unwrap();
        assert_eq!(mso.version, "1.0");
        assert_eq!(mso.doc_type, "org.iso.18013.5.1.mDL");
        assert_eq!(mso.value_digests["org.iso.18013.5.1"].len(), 2);
    }

    #[test]
    fn digests_cover_the_tagged_item_bytes() {
        let document = builder().sign(sign_options()).unwrap();
        let mso = document.mso().unwrap();
        let items = &document.issuer_signed.namespaces.as_ref().unwrap()["org.iso.18013.5.1"];
        for item in items.iter() {
            let bytes = crate::cbor::to_vec(item).unwrap();
            let expected = mso.digest_algorithm.digest(&bytes);
            let committed = &mso.value_digests["org.iso.18013.5.1"][&item.as_ref().digest_id];
            assert_eq!(committed.as_ref(), expected.as_slice());
        }
    }

    #[test]
    fn both_key_and_signer_is_an_error() {
        let mut options = sign_options();
        options.signer = Some(ExternalSigner::Basic(Box::new(|_| Ok(vec![0x42; 64]))));
        let err = builder().sign(options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot provide both issuerPrivateKey and signer"
        );
    }

    #[test]
    fn neither_key_nor_signer_is_an_error() {
        let mut options = sign_options();
        options.issuer_private_key = None;
        let err = builder().sign(options).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Either issuerPrivateKey or signer must be provided"
        );
    }

    #[test]
    fn missing_digest_algorithm_is_an_error() {
        let builder = DocumentBuilder::new("org.iso.18013.5.1.mDL")
            .add_issuer_namespace(
                "org.iso.18013.5.1",
                [("family_name".to_string(), Value::Text("Doe".into()))],
            )
            .add_validity_info(ValidityArgs {
                signed: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
                valid_from: None,
                valid_until: None,
                expected_update: None,
            })
            .add_device_key_info(p256::SecretKey::random(&mut rand_core::OsRng).public_key());
        assert!(matches!(
            builder.sign(sign_options()),
            Err(Error::DigestAlgorithmUnset)
        ));
    }

    #[test]
    fn external_basic_signer_controls_the_signature_bytes() {
        let mut options = sign_options();
        options.issuer_private_key = None;
        options.signer = Some(ExternalSigner::Basic(Box::new(|_| Ok(vec![0x42; 64]))));
        let document = builder().sign(options).unwrap();
        assert_eq!(
            document.issuer_signed.issuer_auth.inner.signature,
            vec![0x42; 64]
        );
    }

    #[test]
    fn external_contextual_signer_sees_the_headers() {
        let mut options = sign_options();
        options.issuer_private_key = None;
        options.kid = Some(b"test-kid".to_vec());
        options.signer = Some(ExternalSigner::Contextual(Box::new(|context| {
            assert_eq!(context.algorithm, iana::Algorithm::ES256);
            assert_eq!(context.unprotected.key_id, b"test-kid".to_vec());
            assert!(!context.payload.is_empty());
            Ok(vec![0x17; 64])
        })));
        let document = builder().sign(options).unwrap();
        assert_eq!(
            document.issuer_signed.issuer_auth.inner.signature,
            vec![0x17; 64]
        );
    }
}

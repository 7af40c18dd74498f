//! The `x5chain` unprotected header (RFC 9360, label 33) and the
//! certificate chain it carries.

use ciborium::Value;
use const_oid::{AssociatedOid, ObjectIdentifier};
use elliptic_curve::{
    sec1::{FromEncodedPoint, ModulusSize, ToEncodedPoint},
    AffinePoint, CurveArithmetic, FieldBytesSize, PublicKey,
};
use p256::NistP256;
use p384::NistP384;
use serde::{Deserialize, Serialize};
use signature::Verifier;
use x509_cert::{
    certificate::Certificate,
    der::{referenced::OwnedToRef, Decode, Encode},
};

use crate::definitions::helpers::NonEmptyVec;
use crate::definitions::x509::error::Error;

pub const X5CHAIN_HEADER_LABEL: i64 = 33;

/// id-Ed25519 (RFC 8410).
const ED25519_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

/// A DER-encoded certificate.
#[derive(Debug, Clone, Serialize, Deserialize, Hash, Eq, PartialEq)]
pub struct X509 {
    #[serde(with = "serde_bytes")]
    pub bytes: Vec<u8>,
}

impl X509 {
    pub fn from_pem(data: &[u8]) -> Result<Self, Error> {
        let (_, bytes) = pem_rfc7468::decode_vec(data)
            .map_err(|e| Error::DecodingError(format!("unable to parse pem: {e}")))?;
        Self::from_der(&bytes)
    }

    pub fn from_der(data: &[u8]) -> Result<Self, Error> {
        // Parse and re-encode so the stored bytes are exactly one cert.
        let cert = Certificate::from_der(data)?;
        Ok(Self {
            bytes: cert.to_der()?,
        })
    }

    pub fn certificate(&self) -> Result<Certificate, Error> {
        Ok(Certificate::from_der(&self.bytes)?)
    }

    pub fn public_key<C>(&self) -> Result<PublicKey<C>, Error>
    where
        C: AssociatedOid + CurveArithmetic,
        AffinePoint<C>: FromEncodedPoint<C> + ToEncodedPoint<C>,
        FieldBytesSize<C>: ModulusSize,
    {
        let cert = self.certificate()?;
        cert.tbs_certificate
            .subject_public_key_info
            .owned_to_ref()
            .try_into()
            .map_err(|e| {
                Error::ValidationError(format!("could not parse public key from spki: {e}"))
            })
    }

    pub fn ed25519_public_key(&self) -> Result<ed25519_dalek::VerifyingKey, Error> {
        let cert = self.certificate()?;
        let spki = &cert.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != ED25519_OID {
            return Err(Error::ValidationError(
                "certificate does not carry an Ed25519 public key".to_string(),
            ));
        }
        let bytes: [u8; 32] = spki.subject_public_key.raw_bytes().try_into().map_err(|_| {
            Error::ValidationError("Ed25519 public key must be 32 bytes".to_string())
        })?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::ValidationError(format!("invalid Ed25519 public key: {e}")))
    }
}

/// An ordered, non-empty certificate chain: the signer's certificate first,
/// each subsequent certificate certifying the one before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X5Chain(NonEmptyVec<X509>);

impl From<NonEmptyVec<X509>> for X5Chain {
    fn from(v: NonEmptyVec<X509>) -> Self {
        Self(v)
    }
}

impl AsRef<[X509]> for X5Chain {
    fn as_ref(&self) -> &[X509] {
        self.0.as_ref()
    }
}

impl X5Chain {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// The signer's certificate.
    pub fn leaf(&self) -> &X509 {
        &self.0[0]
    }

    /// The header value: a single bstr, or an array of bstr for a chain.
    pub fn into_cbor(&self) -> Value {
        match self.0.as_ref() {
            [cert] => Value::Bytes(cert.bytes.clone()),
            certs => Value::Array(
                certs
                    .iter()
                    .map(|x509| Value::Bytes(x509.bytes.clone()))
                    .collect(),
            ),
        }
    }

    /// Parse the value of an `x5chain` header.
    pub fn from_cbor(value: &Value) -> Result<Self, Error> {
        let certs = match value {
            Value::Bytes(bytes) => vec![X509::from_der(bytes)?],
            Value::Array(values) => values
                .iter()
                .map(|v| match v {
                    Value::Bytes(bytes) => X509::from_der(bytes),
                    other => Err(Error::DecodingError(format!(
                        "unexpected item in x5chain array: {other:?}"
                    ))),
                })
                .collect::<Result<_, _>>()?,
            other => {
                return Err(Error::DecodingError(format!(
                    "unexpected type for x5chain header: {other:?}"
                )))
            }
        };
        NonEmptyVec::try_from(certs)
            .map(Self)
            .map_err(|_| Error::DecodingError("empty x5chain".to_string()))
    }
}

/// Verify that `issuer`'s subject key signed `target`.
pub fn check_signature(target: &X509, issuer: &X509) -> Result<(), Error> {
    let child = target.certificate()?;
    let tbs = child
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::DecodingError(e.to_string()))?;
    let sig_bytes = child.signature.raw_bytes();

    if let Ok(public_key) = issuer.public_key::<NistP256>() {
        let verifying_key = p256::ecdsa::VerifyingKey::from(public_key);
        let signature = ecdsa::Signature::<NistP256>::from_der(sig_bytes)?;
        return verifying_key.verify(&tbs, &signature).map_err(Into::into);
    }
    if let Ok(public_key) = issuer.public_key::<NistP384>() {
        let verifying_key = p384::ecdsa::VerifyingKey::from(public_key);
        let signature = ecdsa::Signature::<NistP384>::from_der(sig_bytes)?;
        return verifying_key.verify(&tbs, &signature).map_err(Into::into);
    }
    if let Ok(verifying_key) = issuer.ed25519_public_key() {
        // Ed25519 certificate signatures are the raw 64 bytes, not DER.
        let signature = ed25519_dalek::Signature::from_slice(sig_bytes)?;
        return verifying_key.verify(&tbs, &signature).map_err(Into::into);
    }
    Err(Error::ValidationError(
        "issuer certificate does not carry a supported public key".to_string(),
    ))
}

#[derive(Default, Debug, Clone)]
pub struct Builder {
    certs: Vec<X509>,
}

impl Builder {
    pub fn with_pem(mut self, data: &[u8]) -> Result<Builder, Error> {
        self.certs.push(X509::from_pem(data)?);
        Ok(self)
    }

    pub fn with_der(mut self, data: &[u8]) -> Result<Builder, Error> {
        self.certs.push(X509::from_der(data)?);
        Ok(self)
    }

    pub fn build(self) -> Result<X5Chain, Error> {
        self.certs
            .try_into()
            .map(X5Chain)
            .map_err(|_| {
                Error::ValidationError(
                    "at least one certificate must be given to the builder".to_string(),
                )
            })
    }
}

//! COSE_Sign1 and COSE_Mac0 construction and verification (RFC 8152).

pub mod mac0;
pub mod sign1;

use ciborium::Value;
use coset::{iana, AsCborValue, TaggedCborSerializable};
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use std::ops::{Deref, DerefMut};

/// Trait to represent the signature algorithm of a signer or verifier.
pub trait SignatureAlgorithm {
    fn algorithm(&self) -> iana::Algorithm;
}

/// A COSE message that may or may not carry its CBOR tag on the wire.
///
/// ISO/IEC 18013-5 embeds COSE_Sign1 and COSE_Mac0 untagged, but tagged
/// messages are accepted on decode and the taggedness is preserved on
/// re-encode.
#[derive(Debug, Clone, PartialEq)]
pub struct MaybeTagged<T> {
    tagged: bool,
    pub inner: T,
}

impl<T> MaybeTagged<T> {
    pub fn new(tagged: bool, inner: T) -> Self {
        Self { tagged, inner }
    }

    pub fn is_tagged(&self) -> bool {
        self.tagged
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Deref for MaybeTagged<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for MaybeTagged<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T: Clone + AsCborValue + TaggedCborSerializable> Serialize for MaybeTagged<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = self
            .inner
            .clone()
            .to_cbor_value()
            .map_err(ser::Error::custom)?;
        let value = if self.tagged {
            Value::Tag(T::TAG, Box::new(value))
        } else {
            value
        };
        value.serialize(serializer)
    }
}

impl<'de, T: AsCborValue + TaggedCborSerializable> Deserialize<'de> for MaybeTagged<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Tag(tag, inner) if tag == T::TAG => T::from_cbor_value(*inner)
                .map(|inner| MaybeTagged::new(true, inner))
                .map_err(de::Error::custom),
            untagged => T::from_cbor_value(untagged)
                .map(|inner| MaybeTagged::new(false, inner))
                .map_err(de::Error::custom),
        }
    }
}

/// Result of verifying a COSE_Sign1 signature or COSE_Mac0 tag.
#[derive(Debug)]
pub enum VerificationResult {
    Success,
    /// The message is inauthentic, or a header disagrees with the verifier.
    Failure(String),
    /// The verification algorithm could not be run.
    Error(sign1::Error),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationResult::Success)
    }

    /// Translate to a std::result::Result, stringifying failure reasons.
    pub fn into_result(self) -> Result<(), String> {
        match self {
            VerificationResult::Success => Ok(()),
            VerificationResult::Failure(reason) => Err(reason),
            VerificationResult::Error(e) => Err(format!("{e}")),
        }
    }
}

mod p256 {
    use super::SignatureAlgorithm;
    use coset::iana;
    use p256::ecdsa::{SigningKey, VerifyingKey};

    impl SignatureAlgorithm for SigningKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES256
        }
    }

    impl SignatureAlgorithm for VerifyingKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES256
        }
    }
}

mod p384 {
    use super::SignatureAlgorithm;
    use coset::iana;
    use p384::ecdsa::{SigningKey, VerifyingKey};

    impl SignatureAlgorithm for SigningKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES384
        }
    }

    impl SignatureAlgorithm for VerifyingKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::ES384
        }
    }
}

mod ed25519 {
    use super::SignatureAlgorithm;
    use coset::iana;
    use ed25519_dalek::{SigningKey, VerifyingKey};

    impl SignatureAlgorithm for SigningKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::EdDSA
        }
    }

    impl SignatureAlgorithm for VerifyingKey {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::EdDSA
        }
    }
}

mod hmac {
    use super::SignatureAlgorithm;
    use coset::iana;
    use hmac::Hmac;
    use sha2::Sha256;

    impl SignatureAlgorithm for Hmac<Sha256> {
        fn algorithm(&self) -> iana::Algorithm {
            iana::Algorithm::HMAC_256_256
        }
    }
}

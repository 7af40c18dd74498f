//! The OID4VP session transcript (ISO/IEC 18013-7) and the ECDH-HKDF
//! derivation of the device MAC key.

use ciborium::Value;
use hkdf::Hkdf;
use p256::{NistP256, PublicKey, SecretKey};
use serde::{de, ser, Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::cbor;
use crate::definitions::helpers::ByteStr;

/// `SessionTranscript = [DeviceEngagementBytes, EReaderKeyBytes, Handover]`.
///
/// In the OID4VP profile there is no device engagement and no reader
/// ephemeral key exchange at the mdoc layer, so the first two entries are
/// null and the handover carries the binding to the OID4VP request.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionTranscript {
    pub handover: OID4VPHandover,
}

impl SessionTranscript {
    pub fn for_oid4vp(handover: OID4VPHandover) -> Self {
        Self { handover }
    }

    /// The plain CBOR encoding of the transcript array, used as HKDF salt
    /// input and by verifiers reconstructing `DeviceAuthentication`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, cbor::CborError> {
        cbor::to_vec(self)
    }
}

impl Serialize for SessionTranscript {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let handover = cbor::into_value(&self.handover).map_err(ser::Error::custom)?;
        Value::Array(vec![Value::Null, Value::Null, handover]).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SessionTranscript {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let array = value
            .into_array()
            .map_err(|_| de::Error::custom("SessionTranscript is not an array"))?;
        let [_engagement, _reader_key, handover] = <[Value; 3]>::try_from(array)
            .map_err(|_| de::Error::custom("SessionTranscript must have three entries"))?;
        let handover = cbor::from_value(handover).map_err(de::Error::custom)?;
        Ok(Self { handover })
    }
}

/// `OID4VPHandover = [clientIdHash, responseUriHash, nonce]` where the
/// hashes blind the verifier identifiers with the mdoc-generated nonce.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OID4VPHandover(ByteStr, ByteStr, String);

impl OID4VPHandover {
    /// Compute the handover for a request, per ISO 18013-7:
    /// `clientIdHash = SHA-256(cbor([clientId, mdocGeneratedNonce]))` and
    /// `responseUriHash = SHA-256(cbor([responseUri, mdocGeneratedNonce]))`.
    pub fn compute(
        client_id: &str,
        response_uri: &str,
        verifier_generated_nonce: &str,
        mdoc_generated_nonce: &str,
    ) -> Self {
        Self(
            hash_pair(client_id, mdoc_generated_nonce),
            hash_pair(response_uri, mdoc_generated_nonce),
            verifier_generated_nonce.to_string(),
        )
    }

    pub fn nonce(&self) -> &str {
        &self.2
    }
}

fn hash_pair(value: &str, nonce: &str) -> ByteStr {
    let array = Value::Array(vec![
        Value::Text(value.to_string()),
        Value::Text(nonce.to_string()),
    ]);
    // Arrays encode identically under every deterministic profile, so this
    // cannot fail once the values are plain text.
    let bytes = cbor::to_vec(&array).unwrap_or_default();
    Sha256::digest(&bytes).to_vec().into()
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to encode the session transcript: {0}")]
    Transcript(#[from] cbor::CborError),
    #[error("the MAC key derivation produced an invalid length")]
    KeyDerivation,
}

/// Derive the `EMacKey` for device authentication:
/// HKDF-SHA256(salt = SHA-256(SessionTranscript bytes), ikm = ECDH Z,
/// info = "EMacKey", L = 32).
///
/// The caller's private key half may be the device key (signing side) or the
/// reader's ephemeral key (verifying side); ECDH makes both derivations
/// agree. The returned key is zeroized on drop.
pub fn derive_device_mac_key(
    private_key: &SecretKey,
    public_key: &PublicKey,
    session_transcript_bytes: &[u8],
) -> Result<Zeroizing<[u8; 32]>, Error> {
    let shared_secret = elliptic_curve::ecdh::diffie_hellman::<NistP256>(
        private_key.to_nonzero_scalar(),
        public_key.as_affine(),
    );
    let salt = Sha256::digest(session_transcript_bytes);
    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret.raw_secret_bytes());
    let mut okm = Zeroizing::new([0u8; 32]);
    hkdf.expand(b"EMacKey", okm.as_mut())
        .map_err(|_| Error::KeyDerivation)?;
    Ok(okm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handover_hashes_are_blinded_by_the_mdoc_nonce() {
        let a = OID4VPHandover::compute("client", "uri", "nonce", "mdoc-nonce-1");
        let b = OID4VPHandover::compute("client", "uri", "nonce", "mdoc-nonce-2");
        assert_ne!(a, b);
        assert_eq!(a.nonce(), "nonce");
    }

    #[test]
    fn transcript_roundtrip() {
        let handover = OID4VPHandover::compute("client", "uri", "nonce", "mdoc-nonce");
        let transcript = SessionTranscript::for_oid4vp(handover);
        let bytes = transcript.to_bytes().unwrap();
        let decoded: SessionTranscript = cbor::from_slice(&bytes).unwrap();
        assert_eq!(transcript, decoded);
    }

    #[test]
    fn both_sides_derive_the_same_mac_key() {
        let device = SecretKey::random(&mut rand_core::OsRng);
        let reader = SecretKey::random(&mut rand_core::OsRng);
        let transcript_bytes = SessionTranscript::for_oid4vp(OID4VPHandover::compute(
            "client", "uri", "nonce", "mdoc-nonce",
        ))
        .to_bytes()
        .unwrap();

        let device_side =
            derive_device_mac_key(&device, &reader.public_key(), &transcript_bytes).unwrap();
        let reader_side =
            derive_device_mac_key(&reader, &device.public_key(), &transcript_bytes).unwrap();
        assert_eq!(device_side.as_ref(), reader_side.as_ref());
    }

    #[test]
    fn mac_key_depends_on_the_transcript() {
        let device = SecretKey::random(&mut rand_core::OsRng);
        let reader = SecretKey::random(&mut rand_core::OsRng);
        let k1 = derive_device_mac_key(&device, &reader.public_key(), b"transcript-1").unwrap();
        let k2 = derive_device_mac_key(&device, &reader.public_key(), b"transcript-2").unwrap();
        assert_ne!(k1.as_ref(), k2.as_ref());
    }
}

//! Prepared `COSE_Mac0` messages.
//!
//! Mirrors [crate::cose::sign1]: build the MAC_structure first, then attach
//! the tag. ISO/IEC 18013-5 device authentication uses HMAC-SHA256 over a
//! detached `DeviceAuthenticationBytes` payload.

use coset::{mac_structure_data, CoseMac0, MacContext, RegisteredLabelWithPrivate};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::cose::{sign1, MaybeTagged, VerificationResult};

type HmacSha256 = Hmac<Sha256>;

/// A `COSE_Mac0` with its MAC_structure built but its tag not yet computed.
#[derive(Debug, Clone)]
pub struct PreparedCoseMac0 {
    cose_mac0: MaybeTagged<CoseMac0>,
    mac_payload: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the COSE_Mac0 has an attached payload but a detached payload was also provided")]
    DoublePayload,
    #[error("the COSE_Mac0 has a detached payload which was not provided")]
    NoPayload,
    #[error("the protected headers do not carry a MAC algorithm")]
    NoAlgorithm,
    #[error("only HMAC-SHA256 (HS256) tags are supported, found {0:?}")]
    UnsupportedAlgorithm(coset::Algorithm),
    #[error("the MAC key has an invalid length")]
    InvalidKeyLength,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl PreparedCoseMac0 {
    pub fn new(
        builder: coset::CoseMac0Builder,
        detached_payload: Option<&[u8]>,
        aad: Option<&[u8]>,
        tagged: bool,
    ) -> Result<Self> {
        let cose_mac0 = builder.build();

        let payload = match (cose_mac0.payload.as_ref(), detached_payload) {
            (Some(_), Some(_)) => return Err(Error::DoublePayload),
            (None, None) => return Err(Error::NoPayload),
            (Some(payload), None) => payload.clone(),
            (None, Some(payload)) => payload.to_vec(),
        };

        match cose_mac0.protected.header.alg.as_ref() {
            None => return Err(Error::NoAlgorithm),
            Some(RegisteredLabelWithPrivate::Assigned(coset::iana::Algorithm::HMAC_256_256)) => {}
            Some(other) => return Err(Error::UnsupportedAlgorithm(other.clone())),
        }

        let mac_payload = mac_structure_data(
            MacContext::CoseMac0,
            cose_mac0.protected.clone(),
            aad.unwrap_or_default(),
            &payload,
        );

        Ok(Self {
            cose_mac0: MaybeTagged::new(tagged, cose_mac0),
            mac_payload,
        })
    }

    /// The MAC_structure bytes that the tag is computed over.
    pub fn mac_payload(&self) -> &[u8] {
        &self.mac_payload
    }

    /// Compute the HMAC-SHA256 tag with the given key and finalize.
    pub fn compute(self, key: &[u8]) -> Result<MaybeTagged<CoseMac0>> {
        let mut mac = HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidKeyLength)?;
        mac.update(&self.mac_payload);
        let tag = mac.finalize().into_bytes().to_vec();

        let mut cose_mac0 = self.cose_mac0;
        cose_mac0.inner.tag = tag;
        Ok(cose_mac0)
    }
}

impl MaybeTagged<CoseMac0> {
    /// Verify the HMAC-SHA256 tag of a COSE_Mac0 in constant time.
    pub fn verify_tag(
        &self,
        key: &[u8],
        detached_payload: Option<&[u8]>,
        external_aad: Option<&[u8]>,
    ) -> VerificationResult {
        if let Some(RegisteredLabelWithPrivate::Assigned(alg)) =
            self.inner.protected.header.alg.as_ref()
        {
            if *alg != coset::iana::Algorithm::HMAC_256_256 {
                return VerificationResult::Failure(format!(
                    "unsupported MAC algorithm in protected headers: {alg:?}"
                ));
            }
        }

        let payload = match (self.inner.payload.as_ref(), detached_payload) {
            (None, None) => return VerificationResult::Error(sign1::Error::NoPayload),
            (Some(attached), None) => attached.as_slice(),
            (None, Some(detached)) => detached,
            _ => return VerificationResult::Error(sign1::Error::DoublePayload),
        };

        let mac_payload = mac_structure_data(
            MacContext::CoseMac0,
            self.inner.protected.clone(),
            external_aad.unwrap_or_default(),
            payload,
        );

        let mut mac = match HmacSha256::new_from_slice(key) {
            Ok(mac) => mac,
            Err(e) => return VerificationResult::Failure(format!("invalid MAC key: {e}")),
        };
        mac.update(&mac_payload);
        match mac.verify_slice(&self.inner.tag) {
            Ok(()) => VerificationResult::Success,
            Err(_) => VerificationResult::Failure("MAC tag is not authentic".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;
    use coset::iana;

    fn prepared(detached: &[u8]) -> PreparedCoseMac0 {
        let protected = coset::HeaderBuilder::new()
            .algorithm(iana::Algorithm::HMAC_256_256)
            .build();
        let builder = coset::CoseMac0Builder::new().protected(protected);
        PreparedCoseMac0::new(builder, Some(detached), None, false).unwrap()
    }

    #[test]
    fn compute_and_verify() {
        let key = [0x42u8; 32];
        let cose_mac0 = prepared(b"device authentication bytes")
            .compute(&key)
            .unwrap();
        cose_mac0
            .verify_tag(&key, Some(b"device authentication bytes"), None)
            .into_result()
            .expect("tag did not verify");
        assert!(!cose_mac0
            .verify_tag(&key, Some(b"other bytes"), None)
            .is_success());
        assert!(!cose_mac0
            .verify_tag(&[0u8; 32], Some(b"device authentication bytes"), None)
            .is_success());
    }

    #[test]
    fn serialized_roundtrip() {
        let key = [0x17u8; 32];
        let cose_mac0 = prepared(b"payload").compute(&key).unwrap();
        let bytes = cbor::to_vec(&cose_mac0).unwrap();
        let parsed: MaybeTagged<CoseMac0> = cbor::from_slice(&bytes).unwrap();
        assert_eq!(cbor::to_vec(&parsed).unwrap(), bytes);
        parsed
            .verify_tag(&key, Some(b"payload"), None)
            .into_result()
            .expect("parsed tag did not verify");
    }

    #[test]
    fn rejects_non_hmac_algorithms() {
        let protected = coset::HeaderBuilder::new()
            .algorithm(iana::Algorithm::ES256)
            .build();
        let builder = coset::CoseMac0Builder::new().protected(protected);
        assert!(matches!(
            PreparedCoseMac0::new(builder, Some(b"payload"), None, false),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }
}

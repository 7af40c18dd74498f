//! Prepared `COSE_Sign1` messages for local or remote signing.
//!
//! To produce a `COSE_Sign1`:
//!
//! 1. Build the headers with [coset::HeaderBuilder], setting `alg` in the
//!    protected header.
//! 2. Call [PreparedCoseSign1::new] with an attached or detached payload;
//!    the Sig_structure bytes are available from
//!    [PreparedCoseSign1::signature_payload].
//! 3. Produce the raw signature over those bytes (locally or via an
//!    external signer/HSM) and pass it to [PreparedCoseSign1::finalize].

use coset::{
    sig_structure_data, CoseSign1, RegisteredLabelWithPrivate, SignatureContext,
};
use signature::Verifier;

use crate::cose::{MaybeTagged, SignatureAlgorithm, VerificationResult};

/// A `COSE_Sign1` with its Sig_structure built but its signature not yet set.
#[derive(Debug, Clone)]
pub struct PreparedCoseSign1 {
    cose_sign1: MaybeTagged<CoseSign1>,
    signature_payload: Vec<u8>,
}

/// Errors that can occur when building, signing or verifying a COSE_Sign1.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("the COSE_Sign1 has an attached payload but a detached payload was also provided")]
    DoublePayload,
    #[error("the COSE_Sign1 has a detached payload which was not provided")]
    NoPayload,
    #[error("the protected headers do not carry a signature algorithm")]
    NoAlgorithm,
    #[error("signature did not match the structure expected by the verifier: {0}")]
    MalformedSignature(signature::Error),
    #[error("error occurred when signing COSE_Sign1: {0}")]
    Signing(anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl PreparedCoseSign1 {
    pub fn new(
        builder: coset::CoseSign1Builder,
        detached_payload: Option<&[u8]>,
        aad: Option<&[u8]>,
        tagged: bool,
    ) -> Result<Self> {
        let cose_sign1 = builder.build();

        // The payload is exclusively attached or detached.
        let payload = match (cose_sign1.payload.as_ref(), detached_payload) {
            (Some(_), Some(_)) => return Err(Error::DoublePayload),
            (None, None) => return Err(Error::NoPayload),
            (Some(payload), None) => payload.clone(),
            (None, Some(payload)) => payload.to_vec(),
        };

        if cose_sign1.protected.header.alg.is_none() {
            return Err(Error::NoAlgorithm);
        }

        let signature_payload = sig_structure_data(
            SignatureContext::CoseSign1,
            cose_sign1.protected.clone(),
            None,
            aad.unwrap_or_default(),
            &payload,
        );

        Ok(Self {
            cose_sign1: MaybeTagged::new(tagged, cose_sign1),
            signature_payload,
        })
    }

    /// The Sig_structure bytes that the signature is computed over.
    pub fn signature_payload(&self) -> &[u8] {
        &self.signature_payload
    }

    /// The signature algorithm declared in the protected headers.
    pub fn algorithm(&self) -> Option<coset::iana::Algorithm> {
        match self.cose_sign1.inner.protected.header.alg.as_ref() {
            Some(RegisteredLabelWithPrivate::Assigned(alg)) => Some(*alg),
            _ => None,
        }
    }

    pub fn protected(&self) -> &coset::Header {
        &self.cose_sign1.inner.protected.header
    }

    pub fn unprotected(&self) -> &coset::Header {
        &self.cose_sign1.inner.unprotected
    }

    /// The payload the signature covers, if attached.
    pub fn payload(&self) -> Option<&[u8]> {
        self.cose_sign1.inner.payload.as_deref()
    }

    /// Finalize by setting the raw signature bytes (r||s for ES*, 64 bytes
    /// for Ed25519).
    pub fn finalize(self, signature: Vec<u8>) -> MaybeTagged<CoseSign1> {
        let mut cose_sign1 = self.cose_sign1;
        cose_sign1.inner.signature = signature;
        cose_sign1
    }
}

impl MaybeTagged<CoseSign1> {
    /// Verify that the signature of a COSE_Sign1 is authentic.
    pub fn verify<'a, V, S>(
        &'a self,
        verifier: &V,
        detached_payload: Option<&[u8]>,
        external_aad: Option<&[u8]>,
    ) -> VerificationResult
    where
        V: Verifier<S> + SignatureAlgorithm,
        S: TryFrom<&'a [u8]>,
        S::Error: Into<signature::Error>,
    {
        if let Some(RegisteredLabelWithPrivate::Assigned(alg)) =
            self.inner.protected.header.alg.as_ref()
        {
            if verifier.algorithm() != *alg {
                return VerificationResult::Failure(
                    "algorithm in protected headers did not match verifier's algorithm".into(),
                );
            }
        }

        let payload = match (self.inner.payload.as_ref(), detached_payload) {
            (None, None) => return VerificationResult::Error(Error::NoPayload),
            (Some(attached), None) => attached.as_slice(),
            (None, Some(detached)) => detached,
            _ => return VerificationResult::Error(Error::DoublePayload),
        };

        let signature = match S::try_from(self.inner.signature.as_ref())
            .map_err(Into::into)
            .map_err(Error::MalformedSignature)
        {
            Ok(sig) => sig,
            Err(e) => return VerificationResult::Error(e),
        };

        let signature_payload = sig_structure_data(
            SignatureContext::CoseSign1,
            self.inner.protected.clone(),
            None,
            external_aad.unwrap_or_default(),
            payload,
        );

        match verifier.verify(&signature_payload, &signature) {
            Ok(()) => VerificationResult::Success,
            Err(e) => VerificationResult::Failure(format!("signature is not authentic: {e}")),
        }
    }

    /// The signature algorithm declared in the protected headers.
    pub fn algorithm(&self) -> Option<coset::iana::Algorithm> {
        match self.inner.protected.header.alg.as_ref() {
            Some(RegisteredLabelWithPrivate::Assigned(alg)) => Some(*alg),
            _ => None,
        }
    }
}

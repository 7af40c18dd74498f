//! The verifier pipeline: trust chain, issuer signature, value digests,
//! validity window and device authentication, with per-check diagnostics.

mod diagnostics;

use chrono::{DateTime, Utc};
use coset::{iana, Label};

use crate::cbor;
use crate::cose::MaybeTagged;
use crate::definitions::{
    helpers::Tag24,
    x509::{trust_anchor::validate_x5chain, TrustAnchorRegistry, X5Chain, X5CHAIN_HEADER_LABEL},
    DeviceAuth, DeviceAuthentication, DeviceResponse, Document, Mso, SessionTranscript, Status,
};

pub use diagnostics::{
    CertificateInfo, CheckCategory, CheckRecord, CheckStatus, DiagnosticInformation,
    DocumentDiagnostics,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unable to decode device response: {0}")]
    Decode(String),
    #[error("device response verification failed: {0}")]
    Verification(String),
}

/// Options for a single verification run.
#[derive(Default)]
pub struct VerificationOptions {
    /// The reader's ephemeral P-256 key, required to check MAC device auth.
    pub ephemeral_reader_key: Option<p256::SecretKey>,
    /// The CBOR bytes of the session transcript the device authenticated
    /// over, required to check device auth.
    pub encoded_session_transcript: Option<Vec<u8>>,
    /// The verification time; defaults to the current time.
    pub now: Option<DateTime<Utc>>,
}

/// Verifies `DeviceResponse` payloads against a set of trust anchors.
pub struct Verifier {
    trust_anchors: TrustAnchorRegistry,
}

impl Verifier {
    pub fn new(trust_anchors: TrustAnchorRegistry) -> Self {
        Self { trust_anchors }
    }

    /// Run the full pipeline and return the decoded response on success.
    ///
    /// Independent checks are all run and accumulated; the returned error
    /// summarizes every failed check, with per-check detail available from
    /// [Verifier::get_diagnostic_information].
    pub fn verify(
        &self,
        bytes: &[u8],
        options: &VerificationOptions,
    ) -> Result<DeviceResponse, Error> {
        let (response, diagnostics) = self.run(bytes, options);
        match response {
            None => Err(Error::Decode(diagnostics.failure_summary())),
            Some(response) if diagnostics.is_success() => Ok(response),
            Some(_) => Err(Error::Verification(diagnostics.failure_summary())),
        }
    }

    /// Run the full pipeline and report every check, even on failure.
    pub fn get_diagnostic_information(
        &self,
        bytes: &[u8],
        options: &VerificationOptions,
    ) -> DiagnosticInformation {
        self.run(bytes, options).1
    }

    fn run(
        &self,
        bytes: &[u8],
        options: &VerificationOptions,
    ) -> (Option<DeviceResponse>, DiagnosticInformation) {
        let mut diagnostics = DiagnosticInformation::default();
        let now = options.now.unwrap_or_else(Utc::now);

        let response: DeviceResponse = match cbor::from_slice(bytes) {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("unable to decode DeviceResponse bytes as cbor: {e}");
                diagnostics.record(
                    CheckCategory::Parsing,
                    None,
                    CheckStatus::Invalid,
                    Some(format!("Unable to decode device response: {e}")),
                );
                return (None, diagnostics);
            }
        };

        if response.version != DeviceResponse::VERSION {
            diagnostics.record(
                CheckCategory::Parsing,
                None,
                CheckStatus::Invalid,
                Some(format!(
                    "unsupported DeviceResponse version: {}",
                    response.version
                )),
            );
        } else if response.status != Status::OK {
            diagnostics.record(
                CheckCategory::Parsing,
                None,
                CheckStatus::Invalid,
                Some(format!("device responded with an error: {:?}", response.status)),
            );
        } else {
            diagnostics.record(CheckCategory::Parsing, None, CheckStatus::Valid, None);
        }

        match response.documents.as_ref() {
            None => {
                diagnostics.record(
                    CheckCategory::Parsing,
                    None,
                    CheckStatus::Invalid,
                    Some("the device response carries no documents".to_string()),
                );
            }
            Some(documents) => {
                for document in documents.iter() {
                    self.verify_document(document, options, &now, &mut diagnostics);
                }
            }
        }

        (Some(response), diagnostics)
    }

    fn verify_document(
        &self,
        document: &Document,
        options: &VerificationOptions,
        now: &DateTime<Utc>,
        diagnostics: &mut DiagnosticInformation,
    ) {
        let doc_type = document.doc_type.as_str();
        let mut doc_diag = DocumentDiagnostics {
            doc_type: doc_type.to_string(),
            ..Default::default()
        };
        let issuer_auth = &document.issuer_signed.issuer_auth;

        // Trust chain.
        let x5chain = match extract_x5chain(issuer_auth) {
            Ok(x5chain) => {
                describe_certificates(&x5chain, &mut doc_diag);
                let errors = validate_x5chain(&x5chain, &self.trust_anchors, now);
                if errors.is_empty() {
                    diagnostics.record(
                        CheckCategory::TrustChain,
                        Some(doc_type),
                        CheckStatus::Valid,
                        None,
                    );
                } else {
                    let detail = errors
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ");
                    diagnostics.record(
                        CheckCategory::TrustChain,
                        Some(doc_type),
                        CheckStatus::Invalid,
                        Some(detail),
                    );
                }
                Some(x5chain)
            }
            Err(e) => {
                diagnostics.record(
                    CheckCategory::TrustChain,
                    Some(doc_type),
                    CheckStatus::Invalid,
                    Some(e),
                );
                None
            }
        };

        // Issuer signature, with the leaf certificate's subject key.
        if let Some(x5chain) = &x5chain {
            let result = verify_issuer_signature(issuer_auth, x5chain);
            diagnostics.record(
                CheckCategory::IssuerSignature,
                Some(doc_type),
                if result.is_ok() {
                    CheckStatus::Valid
                } else {
                    CheckStatus::Invalid
                },
                result.err(),
            );
        } else {
            diagnostics.record(
                CheckCategory::IssuerSignature,
                Some(doc_type),
                CheckStatus::Unchecked,
                Some("no certificate chain available".to_string()),
            );
        }

        // The MSO gates the remaining checks.
        let mso = match decode_mso(issuer_auth) {
            Ok(mso) => mso,
            Err(e) => {
                tracing::error!(doc_type, "unable to decode the MSO: {e}");
                diagnostics.record(
                    CheckCategory::Parsing,
                    Some(doc_type),
                    CheckStatus::Invalid,
                    Some(e),
                );
                diagnostics.documents.push(doc_diag);
                return;
            }
        };
        doc_diag.digest_algorithm = Some(format!("{:?}", mso.digest_algorithm));
        for (namespace, digests) in &mso.value_digests {
            doc_diag
                .committed_digests
                .insert(namespace.clone(), digests.len());
        }

        if mso.doc_type != doc_type {
            diagnostics.record(
                CheckCategory::Parsing,
                Some(doc_type),
                CheckStatus::Invalid,
                Some(format!(
                    "docType mismatch: document says '{doc_type}', MSO says '{}'",
                    mso.doc_type
                )),
            );
        }

        // Value digests over the disclosed items.
        let digests_result = check_value_digests(document, &mso, &mut doc_diag);
        diagnostics.record(
            CheckCategory::ValueDigests,
            Some(doc_type),
            if digests_result.is_ok() {
                CheckStatus::Valid
            } else {
                CheckStatus::Invalid
            },
            digests_result.err(),
        );

        // Validity window.
        let validity = &mso.validity_info;
        if validity.validate().is_err() {
            diagnostics.record(
                CheckCategory::Validity,
                Some(doc_type),
                CheckStatus::Invalid,
                Some("validity dates are out of order".to_string()),
            );
        } else if !validity.contains(now) {
            diagnostics.record(
                CheckCategory::Validity,
                Some(doc_type),
                CheckStatus::Invalid,
                Some(format!(
                    "document is not valid at {now}: window is [{}, {}]",
                    validity.valid_from, validity.valid_until
                )),
            );
        } else {
            diagnostics.record(
                CheckCategory::Validity,
                Some(doc_type),
                CheckStatus::Valid,
                None,
            );
        }

        // Device authentication.
        self.verify_device_auth(document, &mso, options, &mut doc_diag, diagnostics);

        diagnostics.documents.push(doc_diag);
    }

    fn verify_device_auth(
        &self,
        document: &Document,
        mso: &Mso,
        options: &VerificationOptions,
        doc_diag: &mut DocumentDiagnostics,
        diagnostics: &mut DiagnosticInformation,
    ) {
        let doc_type = document.doc_type.as_str();
        let Some(device_signed) = document.device_signed.as_ref() else {
            diagnostics.record(
                CheckCategory::DeviceAuth,
                Some(doc_type),
                CheckStatus::Unchecked,
                Some("bare issuer-signed document, no device authentication".to_string()),
            );
            return;
        };
        doc_diag.device_auth_type = Some(
            match device_signed.device_auth {
                DeviceAuth::DeviceSignature(_) => "signature",
                DeviceAuth::DeviceMac(_) => "mac",
            }
            .to_string(),
        );

        let Some(transcript_bytes) = options.encoded_session_transcript.as_ref() else {
            diagnostics.record(
                CheckCategory::DeviceAuth,
                Some(doc_type),
                CheckStatus::Invalid,
                Some("device authentication present but no session transcript provided".to_string()),
            );
            return;
        };

        let result = check_device_auth(
            device_signed,
            mso,
            doc_type,
            transcript_bytes,
            options.ephemeral_reader_key.as_ref(),
        );
        diagnostics.record(
            CheckCategory::DeviceAuth,
            Some(doc_type),
            if result.is_ok() {
                CheckStatus::Valid
            } else {
                CheckStatus::Invalid
            },
            result.err(),
        );
    }
}

fn extract_x5chain(issuer_auth: &MaybeTagged<coset::CoseSign1>) -> Result<X5Chain, String> {
    let value = issuer_auth
        .inner
        .unprotected
        .rest
        .iter()
        .find(|(label, _)| *label == Label::Int(X5CHAIN_HEADER_LABEL))
        .map(|(_, value)| value)
        .ok_or_else(|| "missing x5chain header".to_string())?;
    X5Chain::from_cbor(value).map_err(|e| e.to_string())
}

fn describe_certificates(x5chain: &X5Chain, doc_diag: &mut DocumentDiagnostics) {
    for x509 in x5chain.as_ref() {
        if let Ok(cert) = x509.certificate() {
            let validity = &cert.tbs_certificate.validity;
            doc_diag.certificates.push(CertificateInfo {
                subject: cert.tbs_certificate.subject.to_string(),
                issuer: cert.tbs_certificate.issuer.to_string(),
                not_before: validity.not_before.to_unix_duration().as_secs() as i64,
                not_after: validity.not_after.to_unix_duration().as_secs() as i64,
            });
        }
    }
}

fn verify_issuer_signature(
    issuer_auth: &MaybeTagged<coset::CoseSign1>,
    x5chain: &X5Chain,
) -> Result<(), String> {
    let leaf = x5chain.leaf();
    match issuer_auth.algorithm() {
        Some(iana::Algorithm::ES256) => {
            let public_key = leaf
                .public_key::<p256::NistP256>()
                .map_err(|e| e.to_string())?;
            let verifying_key = p256::ecdsa::VerifyingKey::from(public_key);
            issuer_auth
                .verify::<_, p256::ecdsa::Signature>(&verifying_key, None, None)
                .into_result()
        }
        Some(iana::Algorithm::ES384) => {
            let public_key = leaf
                .public_key::<p384::NistP384>()
                .map_err(|e| e.to_string())?;
            let verifying_key = p384::ecdsa::VerifyingKey::from(public_key);
            issuer_auth
                .verify::<_, p384::ecdsa::Signature>(&verifying_key, None, None)
                .into_result()
        }
        Some(iana::Algorithm::EdDSA) => {
            let verifying_key = leaf.ed25519_public_key().map_err(|e| e.to_string())?;
            issuer_auth
                .verify::<_, ed25519_dalek::Signature>(&verifying_key, None, None)
                .into_result()
        }
        Some(other) => Err(format!("unsupported issuer auth algorithm: {other:?}")),
        None => Err("issuer auth does not declare an algorithm".to_string()),
    }
}

fn decode_mso(issuer_auth: &MaybeTagged<coset::CoseSign1>) -> Result<Mso, String> {
    let payload = issuer_auth
        .inner
        .payload
        .as_ref()
        .ok_or("issuer auth has no payload")?;
    let mso: Tag24<Mso> = cbor::from_slice(payload)
        .map_err(|e| format!("unable to decode the MSO from the issuer auth payload: {e}"))?;
    Ok(mso.into_inner())
}

/// Every disclosed item must digest to its committed value; items committed
/// in the MSO but not disclosed are fine.
fn check_value_digests(
    document: &Document,
    mso: &Mso,
    doc_diag: &mut DocumentDiagnostics,
) -> Result<(), String> {
    let Some(namespaces) = document.issuer_signed.namespaces.as_ref() else {
        return Ok(());
    };
    let mut failures = Vec::new();
    for (namespace, items) in namespaces.iter() {
        doc_diag
            .disclosed_items
            .insert(namespace.clone(), items.len());
        let mut attributes = serde_json::Map::new();
        for item in items.iter() {
            let inner = item.as_ref();
            attributes.insert(
                inner.element_identifier.clone(),
                cbor::to_json(&inner.element_value),
            );
            let digest_id = inner.digest_id;
            let Some(committed) = mso
                .value_digests
                .get(namespace)
                .and_then(|digests| digests.get(&digest_id))
            else {
                failures.push(format!(
                    "'{namespace}/{}' (digest id {}) is not committed in the MSO",
                    inner.element_identifier,
                    digest_id.value()
                ));
                continue;
            };
            let bytes = match cbor::to_vec(item) {
                Ok(bytes) => bytes,
                Err(e) => {
                    failures.push(format!(
                        "'{namespace}/{}' could not be re-encoded: {e}",
                        inner.element_identifier
                    ));
                    continue;
                }
            };
            if mso.digest_algorithm.digest(&bytes) != committed.as_ref() {
                failures.push(format!(
                    "digest mismatch for '{namespace}/{}'",
                    inner.element_identifier
                ));
            }
        }
        doc_diag
            .disclosed_attributes
            .insert(namespace.clone(), serde_json::Value::Object(attributes));
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}

fn check_device_auth(
    device_signed: &crate::definitions::DeviceSigned,
    mso: &Mso,
    doc_type: &str,
    transcript_bytes: &[u8],
    ephemeral_reader_key: Option<&p256::SecretKey>,
) -> Result<(), String> {
    let transcript: SessionTranscript = cbor::from_slice(transcript_bytes)
        .map_err(|e| format!("unable to decode the session transcript: {e}"))?;
    let device_authentication = DeviceAuthentication::new(
        transcript,
        doc_type.to_string(),
        device_signed.namespaces.clone(),
    );
    let detached_payload = Tag24::new(device_authentication)
        .map_err(|e| e.to_string())
        .and_then(|tagged| cbor::to_vec(&tagged).map_err(|e| e.to_string()))?;

    let device_key = &mso.device_key_info.device_key;
    match &device_signed.device_auth {
        DeviceAuth::DeviceSignature(signature) => match device_key.signature_algorithm() {
            Some(iana::Algorithm::ES256) => {
                let public_key: p256::PublicKey =
                    device_key.try_into().map_err(|e| format!("{e}"))?;
                let verifying_key = p256::ecdsa::VerifyingKey::from(public_key);
                signature
                    .verify::<_, p256::ecdsa::Signature>(
                        &verifying_key,
                        Some(&detached_payload),
                        None,
                    )
                    .into_result()
            }
            Some(iana::Algorithm::EdDSA) => {
                let verifying_key: ed25519_dalek::VerifyingKey =
                    device_key.try_into().map_err(|e| format!("{e}"))?;
                signature
                    .verify::<_, ed25519_dalek::Signature>(
                        &verifying_key,
                        Some(&detached_payload),
                        None,
                    )
                    .into_result()
            }
            other => Err(format!("unsupported device key algorithm: {other:?}")),
        },
        DeviceAuth::DeviceMac(mac) => {
            let reader_key = ephemeral_reader_key
                .ok_or("device MAC present but no ephemeral reader key provided")?;
            let device_public: p256::PublicKey =
                device_key.try_into().map_err(|e| format!("{e}"))?;
            let e_mac_key =
                crate::definitions::session::derive_device_mac_key(
                    reader_key,
                    &device_public,
                    transcript_bytes,
                )
                .map_err(|e| e.to_string())?;
            mac.verify_tag(e_mac_key.as_ref(), Some(&detached_payload), None)
                .into_result()
        }
    }
}

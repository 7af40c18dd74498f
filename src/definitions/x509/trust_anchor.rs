//! Trust anchor registry and chain validation against it.

use chrono::{DateTime, Utc};
use x509_cert::certificate::Certificate;

use crate::definitions::x509::error::Error;
use crate::definitions::x509::x5chain::{check_signature, X5Chain, X509};

/// The verifier's set of trusted issuing authority certificates.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorRegistry {
    pub anchors: Vec<X509>,
}

impl TrustAnchorRegistry {
    pub fn from_pem_certificates(certs: &[&[u8]]) -> Result<Self, Error> {
        Ok(Self {
            anchors: certs
                .iter()
                .map(|pem| X509::from_pem(pem))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn from_der_certificates(certs: &[&[u8]]) -> Result<Self, Error> {
        Ok(Self {
            anchors: certs
                .iter()
                .map(|der| X509::from_der(der))
                .collect::<Result<_, _>>()?,
        })
    }

    /// Find the anchor whose subject matches the given certificate's issuer.
    fn find_anchor(&self, certificate: &Certificate) -> Option<&X509> {
        let issuer = &certificate.tbs_certificate.issuer;
        self.anchors.iter().find(|anchor| {
            anchor
                .certificate()
                .map(|cert| &cert.tbs_certificate.subject == issuer)
                .unwrap_or(false)
        })
    }
}

/// Check that `now` falls within the certificate's validity period.
pub fn check_validity_period(
    certificate: &Certificate,
    now: &DateTime<Utc>,
) -> Result<(), Error> {
    let validity = &certificate.tbs_certificate.validity;
    let now = now.timestamp();
    if (validity.not_after.to_unix_duration().as_secs() as i64) < now {
        return Err(Error::ValidationError(format!(
            "expired certificate with subject: {}",
            certificate.tbs_certificate.subject
        )));
    }
    if (validity.not_before.to_unix_duration().as_secs() as i64) > now {
        return Err(Error::ValidationError(format!(
            "not yet valid certificate with subject: {}",
            certificate.tbs_certificate.subject
        )));
    }
    Ok(())
}

/// Validate an `x5chain` against a trust anchor registry at time `now`.
///
/// Checks, accumulating every failure rather than stopping at the first:
/// pairwise chain signatures, each certificate's validity period, an anchor
/// whose subject matches the last certificate's issuer, the anchor's
/// signature over the last certificate, and the anchor's own validity.
pub fn validate_x5chain(
    x5chain: &X5Chain,
    registry: &TrustAnchorRegistry,
    now: &DateTime<Utc>,
) -> Vec<Error> {
    let mut errors: Vec<Error> = vec![];
    let certs = x5chain.as_ref();

    for pair in certs.windows(2) {
        if let Err(e) = check_signature(&pair[0], &pair[1]) {
            errors.push(e);
        }
    }

    for x509 in certs {
        match x509.certificate() {
            Ok(cert) => {
                if let Err(e) = check_validity_period(&cert, now) {
                    errors.push(e);
                }
            }
            Err(e) => errors.push(e),
        }
    }

    // The last certificate in the chain must descend from a trust anchor.
    let Some(last) = certs.last() else {
        errors.push(Error::ValidationError(
            "empty certificate chain".to_string(),
        ));
        return errors;
    };
    let cert = match last.certificate() {
        Ok(cert) => cert,
        Err(e) => {
            errors.push(e);
            return errors;
        }
    };
    let Some(anchor) = registry.find_anchor(&cert) else {
        errors.push(Error::ValidationError(
            "the certificate issuer does not match any known trusted issuer".to_string(),
        ));
        return errors;
    };
    if let Err(e) = check_signature(last, anchor) {
        errors.push(e);
    }
    match anchor.certificate() {
        Ok(anchor_cert) => {
            if let Err(e) = check_validity_period(&anchor_cert, now) {
                errors.push(e);
            }
        }
        Err(e) => errors.push(e),
    }

    errors
}

//! ISO/IEC 18013-5 mdoc credentials: issuance, selective-disclosure
//! presentation and verification, over CBOR with COSE signatures.
//!
//! Three roles are served:
//!
//! * an **issuer** signs credential attributes into a Mobile Security
//!   Object bound to a device key ([issuance::DocumentBuilder]);
//! * a **device/holder** discloses a subset of attributes and proves
//!   possession of the device key over an OID4VP session transcript
//!   ([presentation::DeviceResponseBuilder]);
//! * a **verifier/reader** validates the trust chain, issuer signature,
//!   value digests, validity window and device authentication
//!   ([verification::Verifier]).
//!
//! Two carrier envelopes interoperate: the full `DeviceResponse` of ISO
//! 18013-5 ([definitions::DeviceResponse]) and the bare `IssuerSigned`
//! payload of OID4VCI ([oid4vci]).

pub mod cbor;
pub mod cose;
pub mod definitions;
pub mod issuance;
pub mod oid4vci;
pub mod presentation;
pub mod verification;

use definitions::DeviceResponse;

pub use cbor::{get_cbor_options, set_cbor_options, CborOptions};
pub use issuance::{DocumentBuilder, IssuerSignedDocument};
pub use oid4vci::{parse_issuer_signed, parse_issuer_signed_base64url};
pub use presentation::DeviceResponseBuilder;
pub use verification::{VerificationOptions, Verifier};

/// Decode a `DeviceResponse` from its CBOR bytes, without verifying it.
pub fn parse(bytes: &[u8]) -> Result<DeviceResponse, verification::Error> {
    cbor::from_slice(bytes)
        .map_err(|e| verification::Error::Decode(e.to_string()))
}

//! CBOR data structures defined by ISO/IEC 18013-5 and the carrier
//! envelopes built from them.

pub mod device_key;
pub mod device_response;
pub mod device_signed;
pub mod fulldate;
pub mod helpers;
pub mod issuer_signed;
pub mod mso;
pub mod oid4vp;
pub mod session;
pub mod validity_info;
pub mod x509;

pub use device_key::{CoseKey, DeviceKeyInfo, KeyAuthorizations};
pub use device_response::{DeviceResponse, Document, Status};
pub use device_signed::{
    DeviceAuth, DeviceAuthentication, DeviceNamespaces, DeviceNamespacesBytes, DeviceSigned,
};
pub use fulldate::FullDate;
pub use issuer_signed::{IssuerNamespaces, IssuerSigned, IssuerSignedItem, IssuerSignedItemBytes};
pub use mso::{DigestAlgorithm, DigestId, DigestIds, Mso};
pub use session::{OID4VPHandover, SessionTranscript};
pub use validity_info::ValidityInfo;

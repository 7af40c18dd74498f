//! The `MSO` (Mobile Security Object) is the issuer's signed commitment to
//! the digests of the credential's data elements. It travels as the tag-24
//! payload of the `IssuerAuth` COSE_Sign1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::definitions::{helpers::ByteStr, DeviceKeyInfo, ValidityInfo};

/// DigestId is an unsigned integer between `0` and `(2^31 - 1)` inclusive,
/// represented as an `i32` that is enforced to be positive.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, Ord, PartialEq, PartialOrd, Copy, Hash)]
pub struct DigestId(i32);

pub type DigestIds = BTreeMap<DigestId, ByteStr>;

/// The Mobile Security Object.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mso {
    /// Always `"1.0"`.
    pub version: String,

    /// The algorithm all value digests were computed with.
    pub digest_algorithm: DigestAlgorithm,

    /// Per-namespace map of digest ID to digest over the item's tag-24
    /// encoded bytes.
    pub value_digests: BTreeMap<String, DigestIds>,

    /// The holder's device key and its authorizations.
    pub device_key_info: DeviceKeyInfo,

    pub doc_type: String,

    pub validity_info: ValidityInfo,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum DigestAlgorithm {
    #[serde(rename = "SHA-256")]
    SHA256,
    #[serde(rename = "SHA-384")]
    SHA384,
    #[serde(rename = "SHA-512")]
    SHA512,
}

impl DigestAlgorithm {
    pub fn digest(&self, bytes: &[u8]) -> Vec<u8> {
        match self {
            DigestAlgorithm::SHA256 => Sha256::digest(bytes).to_vec(),
            DigestAlgorithm::SHA384 => Sha384::digest(bytes).to_vec(),
            DigestAlgorithm::SHA512 => Sha512::digest(bytes).to_vec(),
        }
    }
}

impl DigestId {
    pub fn new(i: i32) -> DigestId {
        DigestId(if i.is_negative() { -i } else { i })
    }

    pub fn value(&self) -> i32 {
        self.0
    }
}

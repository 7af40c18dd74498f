//! The issuer-signed half of an mdoc: the disclosed data elements and the
//! `IssuerAuth` COSE_Sign1 over the MSO.

use ciborium::Value;
use coset::CoseSign1;
use serde::{Deserialize, Serialize};

use crate::cose::MaybeTagged;
use crate::definitions::{
    helpers::{ByteStr, NonEmptyMap, NonEmptyVec, Tag24},
    DigestId,
};

/// The `IssuerSigned` structure from ISO/IEC 18013-5 §8.3.2.1.2.2.
///
/// `namespaces` is absent when no data elements are disclosed;
/// `issuer_auth` is the COSE_Sign1 whose payload is the tag-24 wrapped MSO.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSigned {
    #[serde(skip_serializing_if = "Option::is_none", rename = "nameSpaces")]
    pub namespaces: Option<IssuerNamespaces>,
    pub issuer_auth: MaybeTagged<CoseSign1>,
}

pub type IssuerNamespaces = NonEmptyMap<String, NonEmptyVec<IssuerSignedItemBytes>>;
pub type IssuerSignedItemBytes = Tag24<IssuerSignedItem>;

/// A single signed data element.
///
/// The digest committed to in the MSO is computed over the tag-24 encoded
/// bytes of this record, salted by `random`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuerSignedItem {
    #[serde(rename = "digestID")]
    pub digest_id: DigestId,

    /// Unpredictable salt, at least 16 bytes, unique per item.
    pub random: ByteStr,

    pub element_identifier: String,

    pub element_value: Value,
}

use chrono::{DateTime, TimeZone, Utc};
use ciborium::Value;
use coset::iana;
use p256::pkcs8::DecodePrivateKey;

use mdoc::definitions::x509::X5Chain;
use mdoc::definitions::DigestAlgorithm;
use mdoc::issuance::{DocumentBuilder, IssuerKey, SignOptions, ValidityArgs};
use mdoc::IssuerSignedDocument;

pub static ISSUER_CERT: &[u8] = include_bytes!("../test/issuance/issuer-cert.pem");
pub static ISSUER_KEY: &str = include_str!("../test/issuance/issuer-key.pem");

pub const DOC_TYPE: &str = "org.iso.18013.5.1.mDL";
pub const NAMESPACE: &str = "org.iso.18013.5.1";

/// A fixed verification time inside both the document's and the test
/// certificate's validity windows.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2027, 7, 1, 0, 0, 0).unwrap()
}

pub fn issuer_secret_key() -> p256::SecretKey {
    p256::SecretKey::from_pkcs8_pem(ISSUER_KEY).expect("unable to parse issuer key")
}

pub fn sign_options() -> SignOptions {
    SignOptions {
        issuer_private_key: Some(IssuerKey::P256(issuer_secret_key())),
        signer: None,
        x5chain: X5Chain::builder()
            .with_pem(ISSUER_CERT)
            .expect("unable to parse issuer cert")
            .build()
            .expect("unable to build x5chain"),
        alg: iana::Algorithm::ES256,
        kid: Some(b"test-kid".to_vec()),
    }
}

/// Issue the specification's example mDL, bound to the given device key.
pub fn issue_document(device_key: p256::PublicKey) -> IssuerSignedDocument {
    let elements = [
        ("given_name".to_string(), Value::Text("John".into())),
        ("family_name".to_string(), Value::Text("Doe".into())),
        (
            "birth_date".to_string(),
            Value::Tag(1004, Box::new(Value::Text("1990-01-01".into()))),
        ),
    ];
    DocumentBuilder::new(DOC_TYPE)
        .add_issuer_namespace(NAMESPACE, elements)
        .use_digest_algorithm(DigestAlgorithm::SHA256)
        .add_validity_info(ValidityArgs {
            signed: Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 0).unwrap(),
            valid_from: None,
            valid_until: Some(Utc.with_ymd_and_hms(2028, 1, 1, 0, 0, 0).unwrap()),
            expected_update: None,
        })
        .add_device_key_info(device_key)
        .sign(sign_options())
        .expect("failed to issue document")
}

//! An implementation of RFC 8152 `COSE_Key` restricted to the requirements
//! of ISO/IEC 18013-5:2021.

use ciborium::Value;
use coset::iana::Algorithm;
use p256::EncodedPoint;
use serde::{Deserialize, Serialize};
use ssi_jwk::JWK;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "Value", into = "Value")]
pub enum CoseKey {
    EC2 { crv: EC2Curve, x: Vec<u8>, y: EC2Y },
    OKP { crv: OKPCurve, x: Vec<u8> },
}

/// The value, or sign bit, of the y-coordinate of an EC point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EC2Y {
    Value(Vec<u8>),
    SignBit(bool),
}

/// The RFC 8152 curve identifier, for the EC2 key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EC2Curve {
    P256,
    P384,
    P521,
}

/// The RFC 8152 curve identifier, for the OKP key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OKPCurve {
    X25519,
    X448,
    Ed25519,
    Ed448,
}

/// Errors that can occur when converting a COSE_Key.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("COSE_Key of kty 'EC2' missing x coordinate")]
    EC2MissingX,
    #[error("COSE_Key of kty 'EC2' missing y coordinate")]
    EC2MissingY,
    #[error("Expected to parse a CBOR bool or bstr for the y-coordinate, received: '{0:?}'")]
    InvalidTypeY(Box<Value>),
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(Box<Value>),
    #[error("Unable to discern the elliptic curve")]
    UnknownCurve,
    #[error("This implementation supports only P-256, P-384, P-521, Ed25519 and Ed448 curves")]
    UnsupportedCurve,
    #[error("This implementation supports only EC2 and OKP keys")]
    UnsupportedKeyType,
    #[error("Could not reconstruct a point from the provided COSE_Key")]
    InvalidCoseKey,
    #[error("Constructing a JWK from a point-compressed CoseKey is not supported")]
    UnsupportedFormat,
}

impl CoseKey {
    /// The signature algorithm this key verifies, where it can sign at all.
    pub fn signature_algorithm(&self) -> Option<Algorithm> {
        match self {
            CoseKey::EC2 {
                crv: EC2Curve::P256,
                ..
            } => Some(Algorithm::ES256),
            CoseKey::EC2 {
                crv: EC2Curve::P384,
                ..
            } => Some(Algorithm::ES384),
            CoseKey::EC2 {
                crv: EC2Curve::P521,
                ..
            } => Some(Algorithm::ES512),
            CoseKey::OKP {
                crv: OKPCurve::Ed25519 | OKPCurve::Ed448,
                ..
            } => Some(Algorithm::EdDSA),
            _ => None,
        }
    }
}

impl From<CoseKey> for Value {
    fn from(key: CoseKey) -> Value {
        let mut map = Vec::new();
        match key {
            CoseKey::EC2 { crv, x, y } => {
                // kty: 1, EC2: 2
                map.push((Value::Integer(1.into()), Value::Integer(2.into())));
                // crv: -1
                let crv_id: i64 = match crv {
                    EC2Curve::P256 => 1,
                    EC2Curve::P384 => 2,
                    EC2Curve::P521 => 3,
                };
                map.push((Value::Integer((-1).into()), Value::Integer(crv_id.into())));
                // x: -2
                map.push((Value::Integer((-2).into()), Value::Bytes(x)));
                // y: -3
                let y = match y {
                    EC2Y::Value(v) => Value::Bytes(v),
                    EC2Y::SignBit(b) => Value::Bool(b),
                };
                map.push((Value::Integer((-3).into()), y));
            }
            CoseKey::OKP { crv, x } => {
                // kty: 1, OKP: 1
                map.push((Value::Integer(1.into()), Value::Integer(1.into())));
                // crv: -1
                let crv_id: i64 = match crv {
                    OKPCurve::X25519 => 4,
                    OKPCurve::X448 => 5,
                    OKPCurve::Ed25519 => 6,
                    OKPCurve::Ed448 => 7,
                };
                map.push((Value::Integer((-1).into()), Value::Integer(crv_id.into())));
                // x: -2
                map.push((Value::Integer((-2).into()), Value::Bytes(x)));
            }
        }
        Value::Map(map)
    }
}

impl TryFrom<Value> for CoseKey {
    type Error = Error;

    fn try_from(v: Value) -> Result<Self, Error> {
        let Value::Map(map) = v else {
            return Err(Error::NotAMap(Box::new(v)));
        };
        let mut kty = None;
        let mut crv_id = None;
        let mut x = None;
        let mut y = None;
        for (key, value) in map {
            let Value::Integer(label) = key else { continue };
            match i128::from(label) {
                1 => kty = value.as_integer().map(i128::from),
                -1 => crv_id = value.as_integer().map(i128::from),
                -2 => x = value.into_bytes().ok(),
                -3 => y = Some(value),
                _ => {}
            }
        }
        match (kty, crv_id, x) {
            // EC2
            (Some(2), Some(crv_id), Some(x)) => {
                let crv = match crv_id {
                    1 => EC2Curve::P256,
                    2 => EC2Curve::P384,
                    3 => EC2Curve::P521,
                    _ => return Err(Error::UnsupportedCurve),
                };
                let y = match y.ok_or(Error::EC2MissingY)? {
                    Value::Bytes(y) => EC2Y::Value(y),
                    Value::Bool(b) => EC2Y::SignBit(b),
                    other => return Err(Error::InvalidTypeY(Box::new(other))),
                };
                Ok(CoseKey::EC2 { crv, x, y })
            }
            // OKP
            (Some(1), Some(crv_id), Some(x)) => {
                let crv = match crv_id {
                    4 => OKPCurve::X25519,
                    5 => OKPCurve::X448,
                    6 => OKPCurve::Ed25519,
                    7 => OKPCurve::Ed448,
                    _ => return Err(Error::UnsupportedCurve),
                };
                Ok(CoseKey::OKP { crv, x })
            }
            (Some(_), _, _) => Err(Error::UnsupportedKeyType),
            _ => Err(Error::UnknownCurve),
        }
    }
}

impl From<p256::PublicKey> for CoseKey {
    fn from(key: p256::PublicKey) -> Self {
        let point = EncodedPoint::from(&key);
        CoseKey::EC2 {
            crv: EC2Curve::P256,
            x: point.x().map(|x| x.to_vec()).unwrap_or_default(),
            y: EC2Y::Value(point.y().map(|y| y.to_vec()).unwrap_or_default()),
        }
    }
}

impl TryFrom<&CoseKey> for p256::PublicKey {
    type Error = Error;

    fn try_from(key: &CoseKey) -> Result<p256::PublicKey, Error> {
        let CoseKey::EC2 {
            crv: EC2Curve::P256,
            x,
            y,
        } = key
        else {
            return Err(Error::UnsupportedCurve);
        };
        let point = match y {
            EC2Y::Value(y) => {
                if x.len() != 32 || y.len() != 32 {
                    return Err(Error::InvalidCoseKey);
                }
                EncodedPoint::from_affine_coordinates(
                    p256::FieldBytes::from_slice(x),
                    p256::FieldBytes::from_slice(y),
                    false,
                )
            }
            EC2Y::SignBit(sign) => {
                let mut sec1 = Vec::with_capacity(33);
                sec1.push(if *sign { 3 } else { 2 });
                sec1.extend_from_slice(x);
                EncodedPoint::from_bytes(sec1).map_err(|_| Error::InvalidCoseKey)?
            }
        };
        p256::PublicKey::from_sec1_bytes(point.as_bytes()).map_err(|_| Error::InvalidCoseKey)
    }
}

impl TryFrom<&CoseKey> for ed25519_dalek::VerifyingKey {
    type Error = Error;

    fn try_from(key: &CoseKey) -> Result<ed25519_dalek::VerifyingKey, Error> {
        let CoseKey::OKP {
            crv: OKPCurve::Ed25519,
            x,
        } = key
        else {
            return Err(Error::UnsupportedCurve);
        };
        let bytes: [u8; 32] = x.as_slice().try_into().map_err(|_| Error::InvalidCoseKey)?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| Error::InvalidCoseKey)
    }
}

impl TryFrom<JWK> for CoseKey {
    type Error = Error;

    fn try_from(jwk: JWK) -> Result<Self, Self::Error> {
        match jwk.params {
            ssi_jwk::Params::EC(params) => {
                let crv = match params.curve.as_deref() {
                    Some("P-256") => EC2Curve::P256,
                    Some("P-384") => EC2Curve::P384,
                    Some("P-521") => EC2Curve::P521,
                    Some(_) => return Err(Error::UnsupportedCurve),
                    None => return Err(Error::UnknownCurve),
                };
                let x = params
                    .x_coordinate
                    .as_ref()
                    .ok_or(Error::EC2MissingX)?
                    .0
                    .clone();
                let y = params
                    .y_coordinate
                    .as_ref()
                    .ok_or(Error::EC2MissingY)?
                    .0
                    .clone();
                Ok(CoseKey::EC2 {
                    crv,
                    x,
                    y: EC2Y::Value(y),
                })
            }
            ssi_jwk::Params::OKP(params) => {
                let crv = match params.curve.as_str() {
                    "X25519" => OKPCurve::X25519,
                    "X448" => OKPCurve::X448,
                    "Ed25519" => OKPCurve::Ed25519,
                    "Ed448" => OKPCurve::Ed448,
                    _ => return Err(Error::UnsupportedCurve),
                };
                Ok(CoseKey::OKP {
                    crv,
                    x: params.public_key.0.clone(),
                })
            }
            _ => Err(Error::UnsupportedKeyType),
        }
    }
}

impl TryFrom<CoseKey> for JWK {
    type Error = Error;

    fn try_from(cose: CoseKey) -> Result<JWK, Error> {
        Ok(match cose {
            CoseKey::EC2 { crv, x, y } => {
                let y = match y {
                    EC2Y::Value(y) => y,
                    EC2Y::SignBit(_) => return Err(Error::UnsupportedFormat),
                };
                JWK::from(ssi_jwk::Params::EC(ssi_jwk::ECParams {
                    curve: Some(
                        match crv {
                            EC2Curve::P256 => "P-256",
                            EC2Curve::P384 => "P-384",
                            EC2Curve::P521 => "P-521",
                        }
                        .to_string(),
                    ),
                    x_coordinate: Some(ssi_jwk::Base64urlUInt(x)),
                    y_coordinate: Some(ssi_jwk::Base64urlUInt(y)),
                    ecc_private_key: None,
                }))
            }
            CoseKey::OKP { crv, x } => JWK::from(ssi_jwk::Params::OKP(ssi_jwk::OctetParams {
                curve: match crv {
                    OKPCurve::X25519 => "X25519",
                    OKPCurve::X448 => "X448",
                    OKPCurve::Ed25519 => "Ed25519",
                    OKPCurve::Ed448 => "Ed448",
                }
                .to_string(),
                public_key: ssi_jwk::Base64urlUInt(x),
                private_key: None,
            })),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor;

    fn p256_key() -> CoseKey {
        let secret = p256::SecretKey::random(&mut rand_core::OsRng);
        secret.public_key().into()
    }

    #[test]
    fn label_map_roundtrip() {
        let key = p256_key();
        let bytes = cbor::to_vec(&key).unwrap();
        let decoded: CoseKey = cbor::from_slice(&bytes).unwrap();
        assert_eq!(key, decoded);
    }

    #[test]
    fn jwk_roundtrip() {
        let key = p256_key();
        let jwk: JWK = key.clone().try_into().unwrap();
        let back: CoseKey = jwk.try_into().unwrap();
        assert_eq!(key, back);
    }

    #[test]
    fn p256_point_roundtrip() {
        let secret = p256::SecretKey::random(&mut rand_core::OsRng);
        let cose: CoseKey = secret.public_key().into();
        let public: p256::PublicKey = (&cose).try_into().unwrap();
        assert_eq!(public, secret.public_key());
    }

    #[test]
    fn sign_bit_point_reconstruction() {
        let secret = p256::SecretKey::random(&mut rand_core::OsRng);
        let point = EncodedPoint::from(&secret.public_key());
        let y_is_odd = point.as_bytes()[64] & 1 == 1;
        let compressed = CoseKey::EC2 {
            crv: EC2Curve::P256,
            x: point.x().unwrap().to_vec(),
            y: EC2Y::SignBit(y_is_odd),
        };
        let public: p256::PublicKey = (&compressed).try_into().unwrap();
        assert_eq!(public, secret.public_key());
    }

    #[test]
    fn signature_algorithms() {
        assert_eq!(p256_key().signature_algorithm(), Some(Algorithm::ES256));
        let okp = CoseKey::OKP {
            crv: OKPCurve::Ed25519,
            x: vec![0; 32],
        };
        assert_eq!(okp.signature_algorithm(), Some(Algorithm::EdDSA));
        let xdh = CoseKey::OKP {
            crv: OKPCurve::X25519,
            x: vec![0; 32],
        };
        assert_eq!(xdh.signature_algorithm(), None);
    }
}

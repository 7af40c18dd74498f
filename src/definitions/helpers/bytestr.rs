use serde::{Deserialize, Serialize};

/// An opaque CBOR byte string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ByteStr(#[serde(with = "serde_bytes")] Vec<u8>);

impl From<Vec<u8>> for ByteStr {
    fn from(bytes: Vec<u8>) -> ByteStr {
        ByteStr(bytes)
    }
}

impl From<&[u8]> for ByteStr {
    fn from(bytes: &[u8]) -> ByteStr {
        ByteStr(bytes.to_vec())
    }
}

impl From<ByteStr> for Vec<u8> {
    fn from(ByteStr(bytes): ByteStr) -> Vec<u8> {
        bytes
    }
}

impl AsRef<[u8]> for ByteStr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl ByteStr {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::ByteStr;
    use crate::cbor;

    #[test]
    fn encodes_as_cbor_byte_string() {
        let bytes = ByteStr::from(vec![0x01, 0x02, 0x03]);
        let encoded = cbor::to_vec(&bytes).unwrap();
        assert_eq!(encoded, vec![0x43, 0x01, 0x02, 0x03]);
        let decoded: ByteStr = cbor::from_slice(&encoded).unwrap();
        assert_eq!(bytes, decoded);
    }
}

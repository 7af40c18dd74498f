//! `full-date` (RFC 8943, CBOR tag 1004).

use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use ciborium::Value;
use serde::{Deserialize, Serialize};

/// A calendar date without a time component, encoded as tag 1004 text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct FullDate(NaiveDate);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected a CBOR tag 1004 text string, received: '{0:?}'")]
    NotAFullDate(Box<Value>),
    #[error("Failed to parse date string: {0}")]
    UnableToParseDate(chrono::ParseError),
}

impl From<NaiveDate> for FullDate {
    fn from(d: NaiveDate) -> Self {
        Self(d)
    }
}

impl From<FullDate> for Value {
    fn from(d: FullDate) -> Value {
        Value::Tag(1004, Box::new(Value::Text(d.to_string())))
    }
}

impl TryFrom<Value> for FullDate {
    type Error = Error;

    fn try_from(v: Value) -> Result<FullDate, Error> {
        match &v {
            Value::Tag(1004, inner) => match inner.as_ref() {
                Value::Text(s) => s.parse(),
                _ => Err(Error::NotAFullDate(Box::new(v))),
            },
            _ => Err(Error::NotAFullDate(Box::new(v))),
        }
    }
}

impl fmt::Display for FullDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for FullDate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(FullDate)
            .map_err(Error::UnableToParseDate)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cbor;

    #[test]
    fn fulldate_str_roundtrip() {
        const DATESTR: &str = "2000-02-01";
        let fulldate = FullDate::from_str(DATESTR).expect("unable to parse datestr");
        assert_eq!(DATESTR, fulldate.to_string());
    }

    #[test]
    fn fulldate_cbor_roundtrip() {
        let fulldate = FullDate::from_str("1990-01-01").unwrap();
        let bytes = cbor::to_vec(&fulldate).unwrap();
        // 0xd9 0x03 0xec is the tag 1004 header.
        assert_eq!(&bytes[..3], &[0xd9, 0x03, 0xec]);
        let decoded: FullDate = cbor::from_slice(&bytes).unwrap();
        assert_eq!(fulldate, decoded);
    }
}

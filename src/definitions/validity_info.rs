//! The MSO's validity window. Dates are encoded as tag-0 RFC 3339 text.

use chrono::{DateTime, Months, SecondsFormat, Utc};
use ciborium::Value;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ValidityInfo {
    pub signed: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub expected_update: Option<DateTime<Utc>>,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("When parsing a CBOR map, could not find required field: '{0}'")]
    MissingField(&'static str),
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(Value),
    #[error("Expected to parse a CBOR text string, received: '{0:?}'")]
    NotATextString(Box<Value>),
    #[error("Expected to parse a CBOR tag (number 0), received: '{0:?}'")]
    NotATag(Box<Value>),
    #[error("Failed to parse date string as an rfc3339 date: {0}")]
    UnableToParseDate(chrono::ParseError),
    #[error("validity dates are out of order: signed <= validFrom <= validUntil must hold")]
    OutOfOrder,
}

impl ValidityInfo {
    /// Build a window from `signed`, defaulting `valid_from` to `signed`
    /// and `valid_until` to one year after `signed`.
    pub fn new(
        signed: DateTime<Utc>,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
        expected_update: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let valid_from = valid_from.unwrap_or(signed);
        let valid_until = valid_until
            .or_else(|| signed.checked_add_months(Months::new(12)))
            .ok_or(Error::OutOfOrder)?;
        let info = Self {
            signed,
            valid_from,
            valid_until,
            expected_update,
        };
        info.validate()?;
        Ok(info)
    }

    /// `signed <= validFrom <= validUntil`.
    pub fn validate(&self) -> Result<()> {
        if self.signed <= self.valid_from && self.valid_from <= self.valid_until {
            Ok(())
        } else {
            Err(Error::OutOfOrder)
        }
    }

    /// Whether `now` falls within `[validFrom, validUntil]` and the MSO was
    /// signed in the past.
    pub fn contains(&self, now: &DateTime<Utc>) -> bool {
        self.signed <= *now
            && self.valid_from <= *now
            && *now <= self.valid_until
    }
}

fn tdate(date: &DateTime<Utc>) -> Value {
    Value::Tag(
        0,
        Box::new(Value::Text(date.to_rfc3339_opts(SecondsFormat::Secs, true))),
    )
}

impl From<ValidityInfo> for Value {
    fn from(v: ValidityInfo) -> Value {
        let mut map = vec![
            (Value::Text("signed".to_string()), tdate(&v.signed)),
            (Value::Text("validFrom".to_string()), tdate(&v.valid_from)),
            (Value::Text("validUntil".to_string()), tdate(&v.valid_until)),
        ];
        if let Some(expected_update) = &v.expected_update {
            map.push((
                Value::Text("expectedUpdate".to_string()),
                tdate(expected_update),
            ));
        }
        Value::Map(map)
    }
}

impl TryFrom<Value> for ValidityInfo {
    type Error = Error;

    fn try_from(v: Value) -> Result<ValidityInfo> {
        let Value::Map(map) = v else {
            return Err(Error::NotAMap(v));
        };
        let mut signed = None;
        let mut valid_from = None;
        let mut valid_until = None;
        let mut expected_update = None;
        for (key, value) in map {
            let Value::Text(key) = key else { continue };
            match key.as_str() {
                "signed" => signed = Some(cbor_to_datetime(value)?),
                "validFrom" => valid_from = Some(cbor_to_datetime(value)?),
                "validUntil" => valid_until = Some(cbor_to_datetime(value)?),
                "expectedUpdate" => expected_update = Some(cbor_to_datetime(value)?),
                _ => {}
            }
        }
        Ok(Self {
            signed: signed.ok_or(Error::MissingField("signed"))?,
            valid_from: valid_from.ok_or(Error::MissingField("validFrom"))?,
            valid_until: valid_until.ok_or(Error::MissingField("validUntil"))?,
            expected_update,
        })
    }
}

fn cbor_to_datetime(v: Value) -> Result<DateTime<Utc>> {
    if let Value::Tag(0, inner) = v {
        if let Value::Text(date_str) = inner.as_ref() {
            DateTime::parse_from_rfc3339(date_str)
                .map(Into::into)
                .map_err(Error::UnableToParseDate)
        } else {
            Err(Error::NotATextString(inner))
        }
    } else {
        Err(Error::NotATag(Box::new(v)))
    }
}

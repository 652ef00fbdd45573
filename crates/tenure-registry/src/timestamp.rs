//! Join timestamp codec.
//!
//! Written as RFC 3339. Read from RFC 3339 strings, naive ISO-8601 strings
//! (taken as UTC), numeric epoch seconds (integer or fractional) or null.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(JoinTimestampVisitor)
}

struct JoinTimestampVisitor;

impl<'de> Visitor<'de> for JoinTimestampVisitor {
    type Value = Option<DateTime<Utc>>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("epoch seconds, an ISO-8601 string, or null")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_i64<E: de::Error>(self, secs: i64) -> Result<Self::Value, E> {
        DateTime::from_timestamp(secs, 0)
            .map(Some)
            .ok_or_else(|| E::custom(format!("epoch seconds out of range: {}", secs)))
    }

    fn visit_u64<E: de::Error>(self, secs: u64) -> Result<Self::Value, E> {
        let secs = i64::try_from(secs)
            .map_err(|_| E::custom(format!("epoch seconds out of range: {}", secs)))?;
        self.visit_i64(secs)
    }

    fn visit_f64<E: de::Error>(self, secs: f64) -> Result<Self::Value, E> {
        if !secs.is_finite() {
            return Err(E::custom("epoch seconds must be finite"));
        }
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
            .map(Some)
            .ok_or_else(|| E::custom(format!("epoch seconds out of range: {}", secs)))
    }

    fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
            return Ok(Some(naive.and_utc()));
        }
        if let Ok(secs) = text.parse::<f64>() {
            return self.visit_f64(secs);
        }
        Err(E::custom(format!("unrecognised timestamp: {:?}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Stamped {
        #[serde(default, with = "super")]
        at: Option<DateTime<Utc>>,
    }

    fn parse(json: &str) -> Option<DateTime<Utc>> {
        serde_json::from_str::<Stamped>(json).unwrap().at
    }

    #[test]
    fn reads_every_accepted_shape() {
        let expected = DateTime::from_timestamp(1_600_000_000, 0);
        assert_eq!(parse(r#"{"at": 1600000000}"#), expected);
        assert_eq!(parse(r#"{"at": 1600000000.0}"#), expected);
        assert_eq!(parse(r#"{"at": "2020-09-13T12:26:40+00:00"}"#), expected);
        assert_eq!(parse(r#"{"at": "2020-09-13T12:26:40Z"}"#), expected);
        assert_eq!(parse(r#"{"at": "2020-09-13T12:26:40"}"#), expected);
        assert_eq!(parse(r#"{"at": null}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[test]
    fn fractional_epoch_keeps_subseconds() {
        let at = parse(r#"{"at": 1600000000.5}"#).unwrap();
        assert_eq!(at.timestamp(), 1_600_000_000);
        assert_eq!(at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn written_form_round_trips() {
        let stamped = Stamped {
            at: DateTime::from_timestamp(1_600_000_000, 123_456_789),
        };
        let json = serde_json::to_string(&stamped).unwrap();
        assert!(json.contains("2020-09-13T12:26:40.123456789Z"));
        assert_eq!(serde_json::from_str::<Stamped>(&json).unwrap(), stamped);
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Stamped>(r#"{"at": "last tuesday"}"#).is_err());
        assert!(serde_json::from_str::<Stamped>(r#"{"at": true}"#).is_err());
    }
}

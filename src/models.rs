// Core data structures for the jobwatch pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

use crate::broker::error::{BrokerError, BrokerResult};

/// Placeholder for text fields absent from a wire body
pub const UNKNOWN_FIELD: &str = "unknown";

/// A single job posting as scraped from a listing page
///
/// Field order is the wire order: the JSON body published to the broker is
/// produced straight from this declaration. Decoding is lenient: missing
/// text fields become [`UNKNOWN_FIELD`] and a missing or unreadable `date`
/// becomes the decode time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default = "unknown")]
    pub title: String,
    #[serde(rename = "company", default = "unknown")]
    pub organization: String,
    #[serde(rename = "salary", default = "unknown")]
    pub compensation: String,
    #[serde(rename = "experience", default = "unknown")]
    pub experience_level: String,
    #[serde(default = "unknown")]
    pub description: String,
    #[serde(default = "unknown")]
    pub link: String,
    #[serde(default = "unknown")]
    pub location: String,
    #[serde(rename = "date", with = "wire_date", default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

fn unknown() -> String {
    UNKNOWN_FIELD.to_string()
}

/// `date` on the wire: minute precision, `dd.mm.YYYY HH:MM`
///
/// RFC 3339 is accepted on decode as well.
pub mod wire_date {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%d.%m.%Y %H:%M";

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(parse(&raw).unwrap_or_else(|| {
            tracing::debug!(date = %raw, "Unreadable date, using decode time");
            Utc::now()
        }))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        NaiveDateTime::parse_from_str(raw, FORMAT)
            .map(|naive| naive.and_utc())
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok()
            })
    }
}

impl Record {
    /// Content fingerprint over the semantic fields
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }

    /// Serialize to the compact JSON body used on the wire
    pub fn to_bytes(&self) -> BrokerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| BrokerError::serialization(e.to_string()))
    }

    /// Decode a wire body
    pub fn from_slice(body: &[u8]) -> BrokerResult<Self> {
        serde_json::from_slice(body).map_err(|e| BrokerError::serialization(e.to_string()))
    }
}

/// SHA-256 fingerprint of a posting, hex encoded
///
/// Covers `title|organization|compensation|experience_level|description`.
/// `link`, `location` and `observed_at` are left out so that a posting
/// re-surfaced under another URL, or scraped again later, still collides.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of a record
    pub fn of(record: &Record) -> Self {
        let payload = [
            record.title.as_str(),
            record.organization.as_str(),
            record.compensation.as_str(),
            record.experience_level.as_str(),
            record.description.as_str(),
        ]
        .join("|");

        let mut hasher = Sha256::new();
        hasher.update(payload.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Wrap an already computed hex digest
    ///
    /// Returns `None` unless the value is 64 lowercase hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == 64
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        valid.then(|| Self(hex.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ordered records returned by one fetch cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct fingerprints present in the set
    pub fn unique_fingerprints(&self) -> HashSet<Fingerprint> {
        self.records.iter().map(Record::fingerprint).collect()
    }
}

impl fmt::Display for RecordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordSet(len={})", self.records.len())
    }
}

impl FromIterator<Record> for RecordSet {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Record {
        Record {
            title: "Rust Engineer".to_string(),
            organization: "Acme".to_string(),
            compensation: "from 300 000".to_string(),
            experience_level: "3-6 years".to_string(),
            description: "Build things".to_string(),
            link: "https://example.com/vacancy/1".to_string(),
            location: "Moscow (Metro: Not specified)".to_string(),
            observed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_fingerprint_matches_pipe_joined_sha256() {
        let record = sample();
        let mut hasher = Sha256::new();
        hasher.update("Rust Engineer|Acme|from 300 000|3-6 years|Build things".as_bytes());
        let expected = format!("{:x}", hasher.finalize());

        assert_eq!(record.fingerprint().as_str(), expected);
        assert_eq!(record.fingerprint().as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_volatile_fields() {
        let a = sample();
        let mut b = sample();
        b.link = "https://example.com/vacancy/999".to_string();
        b.location = "Elsewhere".to_string();
        b.observed_at = Utc::now();

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_changes_with_semantic_fields() {
        let a = sample();
        let mut b = sample();
        b.compensation = "from 350 000".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_wire_field_names() {
        let body = sample().to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        assert_eq!(value["company"], "Acme");
        assert_eq!(value["salary"], "from 300 000");
        assert_eq!(value["experience"], "3-6 years");
        assert!(value["date"].is_string());

        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with(r#"{"title":"Rust Engineer","company":"#));
    }

    #[test]
    fn test_date_uses_minute_format() {
        let body = sample().to_bytes().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["date"], "01.05.2024 12:00");
    }

    #[test]
    fn test_decode_fills_missing_fields() {
        let before = Utc::now();
        let record = Record::from_slice(r#"{"title":"only a title"}"#.as_bytes()).unwrap();

        assert_eq!(record.title, "only a title");
        assert_eq!(record.organization, UNKNOWN_FIELD);
        assert_eq!(record.link, UNKNOWN_FIELD);
        assert!(record.observed_at >= before);
    }

    #[test]
    fn test_decode_accepts_both_date_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 16, 14, 3, 0).unwrap();
        assert_eq!(wire_date::parse("16.10.2026 14:03"), Some(expected));
        assert_eq!(wire_date::parse("2026-10-16T14:03:00Z"), Some(expected));
        assert_eq!(wire_date::parse("yesterday"), None);
    }

    #[test]
    fn test_decode_rejects_malformed_bodies() {
        let bodies: [&[u8]; 3] = [b"not json", br#"["a list"]"#, br#"{"title":42}"#];
        for body in bodies {
            let err = Record::from_slice(body).unwrap_err();
            assert!(matches!(err, BrokerError::Serialization { .. }));
        }
    }

    #[test]
    fn test_fingerprint_from_hex() {
        let fp = sample().fingerprint();
        assert_eq!(Fingerprint::from_hex(fp.as_str()), Some(fp));
        assert!(Fingerprint::from_hex("abc").is_none());
        assert!(Fingerprint::from_hex(&"G".repeat(64)).is_none());
    }

    #[test]
    fn test_record_set_unique_fingerprints() {
        let mut set = RecordSet::new();
        set.push(sample());
        let mut moved = sample();
        moved.link = "https://example.com/other".to_string();
        set.push(moved);
        let mut other = sample();
        other.title = "Go Engineer".to_string();
        set.push(other);

        assert_eq!(set.len(), 3);
        assert_eq!(set.unique_fingerprints().len(), 2);
        assert_eq!(set.to_string(), "RecordSet(len=3)");
    }
}

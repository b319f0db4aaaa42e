//! Remote replica model

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use super::record::{QaEntry, Record, RecordId, RecordMetadata, SummaryLength};

/// Server-assigned creation time in any of the encodings the API emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteTimestamp {
    /// RFC 3339 / ISO-8601 string
    Iso(String),
    /// Structured `{seconds, nanoseconds}` timestamp
    Structured {
        #[serde(alias = "_seconds")]
        seconds: i64,
        #[serde(default, alias = "_nanoseconds", alias = "nanos")]
        nanoseconds: i64,
    },
    /// Unix epoch in milliseconds
    EpochMillis(i64),
    /// Unix epoch in milliseconds, sent as a float
    EpochFloat(f64),
}

impl RemoteTimestamp {
    /// Normalize to Unix milliseconds.
    ///
    /// Returns `None` for strings that are not valid RFC 3339.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_millis(&self) -> Option<i64> {
        match self {
            Self::Iso(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .ok()
                .map(|parsed| parsed.timestamp_millis()),
            Self::Structured {
                seconds,
                nanoseconds,
            } => Some(
                seconds
                    .saturating_mul(1000)
                    .saturating_add(nanoseconds / 1_000_000),
            ),
            Self::EpochMillis(millis) => Some(*millis),
            Self::EpochFloat(millis) if millis.is_finite() => Some(millis.round() as i64),
            Self::EpochFloat(_) => None,
        }
    }
}

/// A history item as returned by `GET /history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: RecordId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub summary_length: SummaryLength,
    #[serde(default)]
    pub qa_history: Vec<QaEntry>,
    #[serde(default)]
    pub metadata: RecordMetadata,
    #[serde(default)]
    pub created_at: Option<RemoteTimestamp>,
}

impl RemoteRecord {
    /// Server creation time in Unix ms, if present and parseable
    pub fn created_at_millis(&self) -> Option<i64> {
        self.created_at.as_ref().and_then(RemoteTimestamp::to_millis)
    }

    /// Convert into a confirmed local record.
    #[must_use]
    pub fn into_record(self) -> Record {
        let timestamp = self.created_at_millis().unwrap_or_default();
        Record {
            id: self.id,
            url: self.url,
            title: self.title,
            summary: self.summary,
            summary_length: self.summary_length,
            timestamp,
            qa_history: self.qa_history,
            pending_sync: false,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> RemoteTimestamp {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn iso_string_normalizes_to_millis() {
        assert_eq!(
            parse(r#""1970-01-01T00:00:00.200Z""#).to_millis(),
            Some(200)
        );
        assert_eq!(
            parse(r#""2024-01-01T01:00:00+01:00""#).to_millis(),
            Some(1_704_067_200_000)
        );
    }

    #[test]
    fn structured_seconds_normalize_to_millis() {
        assert_eq!(
            parse(r#"{"seconds": 1, "nanoseconds": 500000000}"#).to_millis(),
            Some(1500)
        );
        assert_eq!(parse(r#"{"_seconds": 2}"#).to_millis(), Some(2000));
    }

    #[test]
    fn numeric_epoch_is_millis() {
        assert_eq!(parse("1700000000000").to_millis(), Some(1_700_000_000_000));
        assert_eq!(parse("1500.4").to_millis(), Some(1500));
    }

    #[test]
    fn invalid_iso_string_has_no_millis() {
        assert_eq!(parse(r#""yesterday""#).to_millis(), None);
    }

    #[test]
    fn remote_record_into_record_is_confirmed() {
        let remote: RemoteRecord = serde_json::from_str(
            r#"{"id": "a", "url": "https://example.com", "summary": "s", "createdAt": {"seconds": 3}}"#,
        )
        .unwrap();
        let record = remote.into_record();
        assert_eq!(record.timestamp, 3000);
        assert!(!record.pending_sync);
        assert_eq!(record.summary_length, SummaryLength::Medium);
    }
}

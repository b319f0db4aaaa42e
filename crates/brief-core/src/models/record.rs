//! History record model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier of a history item, shared by every replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create a new unique record ID using UUID v7 (time-sortable)
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().to_string()))
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Requested length of a generated summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Short,
    #[default]
    Medium,
    Detailed,
}

impl SummaryLength {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Detailed => "detailed",
        }
    }
}

impl fmt::Display for SummaryLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryLength {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "detailed" => Ok(Self::Detailed),
            other => Err(format!("unknown summary length '{other}'")),
        }
    }
}

/// One follow-up question asked about a summarized page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    /// Unix ms
    pub timestamp: i64,
}

/// Descriptive metadata attached to a record.
///
/// Unknown keys are preserved so that fields added by newer clients survive
/// a round trip through older ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A history item in the local replica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique identifier, immutable once assigned
    pub id: RecordId,
    pub url: String,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub summary_length: SummaryLength,
    /// Local creation/modification timestamp (Unix ms)
    pub timestamp: i64,
    #[serde(default)]
    pub qa_history: Vec<QaEntry>,
    /// Local mutations not yet confirmed by the remote service
    #[serde(default)]
    pub pending_sync: bool,
    #[serde(default)]
    pub metadata: RecordMetadata,
}

impl Record {
    /// Create a new record stamped with the current time
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        summary: impl Into<String>,
        summary_length: SummaryLength,
    ) -> Self {
        let url = url.into();
        let metadata = RecordMetadata {
            domain: domain_of(&url),
            word_count: None,
            tags: Vec::new(),
            extra: serde_json::Map::new(),
        };
        Self {
            id: RecordId::new(),
            url,
            title: title.into(),
            summary: summary.into(),
            summary_length,
            timestamp: crate::util::unix_millis_now(),
            qa_history: Vec::new(),
            pending_sync: false,
            metadata,
        }
    }

    /// Check the fields the remote service requires.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("record id is required".to_string());
        }
        if self.url.trim().is_empty() {
            return Err(format!("record {} is missing a url", self.id));
        }
        if self.summary.trim().is_empty() {
            return Err(format!("record {} is missing a summary", self.id));
        }
        Ok(())
    }

    /// Get the title, falling back to the URL when the page had none
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// Extract the host part of an http(s) URL.
fn domain_of(url: &str) -> Option<String> {
    let rest = url
        .trim()
        .strip_prefix("https://")
        .or_else(|| url.trim().strip_prefix("http://"))?;
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.rsplit('@').next()?;
    let host = host.split(':').next()?;
    crate::util::normalize_text_option(Some(host.to_ascii_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_unique() {
        assert_ne!(RecordId::new(), RecordId::new());
    }

    #[test]
    fn test_record_new_sets_domain_and_timestamp() {
        let record = Record::new(
            "https://Docs.rs/tokio/latest",
            "tokio",
            "An async runtime",
            SummaryLength::Short,
        );
        assert_eq!(record.metadata.domain.as_deref(), Some("docs.rs"));
        assert!(record.timestamp > 0);
        assert!(!record.pending_sync);
    }

    #[test]
    fn test_validate_requires_url_and_summary() {
        let mut record = Record::new("https://example.com", "t", "s", SummaryLength::Medium);
        assert!(record.validate().is_ok());

        record.summary = "  ".to_string();
        assert!(record.validate().unwrap_err().contains("summary"));

        record.summary = "s".to_string();
        record.url = String::new();
        assert!(record.validate().unwrap_err().contains("url"));
    }

    #[test]
    fn test_record_serializes_camel_case_and_keeps_unknown_metadata() {
        let raw = r#"{
            "id": "a",
            "url": "https://example.com",
            "title": "Example",
            "summary": "Summary",
            "summaryLength": "detailed",
            "timestamp": 100,
            "qaHistory": [{"question": "q", "answer": "a", "timestamp": 5}],
            "pendingSync": true,
            "metadata": {"domain": "example.com", "wordCount": 12, "tags": ["x"], "readingTime": 3}
        }"#;
        let record: Record = serde_json::from_str(raw).unwrap();
        assert_eq!(record.summary_length, SummaryLength::Detailed);
        assert_eq!(record.metadata.word_count, Some(12));
        assert_eq!(record.metadata.extra["readingTime"], 3);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["pendingSync"], true);
        assert_eq!(value["metadata"]["readingTime"], 3);
    }

    #[test]
    fn test_summary_length_parse() {
        assert_eq!("Short".parse::<SummaryLength>(), Ok(SummaryLength::Short));
        assert!("huge".parse::<SummaryLength>().is_err());
    }

    #[test]
    fn test_display_title_falls_back_to_url() {
        let mut record = Record::new("https://example.com", "", "s", SummaryLength::Medium);
        assert_eq!(record.display_title(), "https://example.com");
        record.title = "Example".to_string();
        assert_eq!(record.display_title(), "Example");
    }
}

//! HTTP client for the Brief history API.
//!
//! Every request carries `Authorization: Bearer <access token>`; the token is
//! passed per call so that the client itself never caches credentials.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{QaEntry, Record, RecordId, RecordMetadata, RemoteRecord, SummaryLength};
use crate::util::{compact_text, is_http_url, millis_to_rfc3339};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Invalid API configuration: {0}")]
    Configuration(String),
    #[error("API rejected credentials: {0}")]
    Unauthorized(String),
    #[error("API rejected record: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("API error: {message} (HTTP {status})")]
    Http { status: u16, message: String },
    #[error("API unreachable: {0}")]
    Transient(String),
    #[error("Invalid API payload: {0}")]
    InvalidPayload(String),
}

impl ApiError {
    fn from_status(status: StatusCode, body: &str) -> Self {
        let message = parse_api_error(body);
        match status.as_u16() {
            401 | 403 => Self::Unauthorized(message),
            400 | 422 => Self::Validation(message),
            404 => Self::NotFound(message),
            408 | 429 | 500..=599 => {
                Self::Transient(format!("{message} (HTTP {})", status.as_u16()))
            }
            code => Self::Http {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidPayload(error.to_string())
        } else {
            Self::Transient(error.to_string())
        }
    }
}

/// One page of `GET /history`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    #[serde(default)]
    pub items: Vec<RemoteRecord>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub has_more: bool,
}

/// Remote history operations used by the sync coordinator
pub trait HistoryApi: Send + Sync {
    /// `POST /history`
    fn upload(
        &self,
        access_token: &str,
        record: &Record,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// `GET /history?page=&limit=` (pages start at 1)
    fn fetch_page(
        &self,
        access_token: &str,
        page: u32,
        limit: u32,
    ) -> impl Future<Output = Result<HistoryPage, ApiError>> + Send;

    /// `DELETE /history/:id`
    fn delete(
        &self,
        access_token: &str,
        id: &RecordId,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Request body of `POST /history`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload<'a> {
    pub id: &'a RecordId,
    pub url: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub summary_length: SummaryLength,
    pub qa_history: &'a [QaEntry],
    pub metadata: &'a RecordMetadata,
    pub created_at: String,
}

impl<'a> From<&'a Record> for UploadPayload<'a> {
    fn from(record: &'a Record) -> Self {
        Self {
            id: &record.id,
            url: &record.url,
            title: &record.title,
            summary: &record.summary,
            summary_length: record.summary_length,
            qa_history: &record.qa_history,
            metadata: &record.metadata,
            created_at: millis_to_rfc3339(record.timestamp),
        }
    }
}

/// `reqwest` implementation of [`HistoryApi`]
#[derive(Debug, Clone)]
pub struct HttpHistoryApi {
    base_url: String,
    client: reqwest::Client,
}

impl HttpHistoryApi {
    /// Builds a client for an explicit API base URL.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(&base_url.into())?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|error| {
                ApiError::Configuration(format!("Failed to construct HTTP client: {error}"))
            })?;
        Ok(Self { base_url, client })
    }

    /// Cheap reachability check used to derive connectivity.
    pub async fn probe(&self) -> bool {
        self.client.head(&self.base_url).send().await.is_ok()
    }
}

impl HistoryApi for HttpHistoryApi {
    async fn upload(&self, access_token: &str, record: &Record) -> Result<(), ApiError> {
        let response = self
            .client
            .post(format!("{}/history", self.base_url))
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .json(&UploadPayload::from(record))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        Ok(())
    }

    async fn fetch_page(
        &self,
        access_token: &str,
        page: u32,
        limit: u32,
    ) -> Result<HistoryPage, ApiError> {
        let response = self
            .client
            .get(format!("{}/history", self.base_url))
            .query(&[("page", page), ("limit", limit)])
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        Ok(response.json::<HistoryPage>().await?)
    }

    async fn delete(&self, access_token: &str, id: &RecordId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(format!(
                "{}/history/{}",
                self.base_url,
                urlencoding::encode(id.as_str())
            ))
            .bearer_auth(access_token)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }
    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ApiError> {
    let base = raw.trim().trim_end_matches('/').to_string();
    if base.is_empty() {
        return Err(ApiError::Configuration(
            "API base URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(&base) {
        return Err(ApiError::Configuration(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url("").is_err());
        assert!(normalize_base_url("example.com").is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/").unwrap(),
            "https://api.example.com"
        );
    }

    #[test]
    fn upload_payload_uses_iso_created_at() {
        let mut record = Record::new(
            "https://example.com",
            "Example",
            "Summary",
            SummaryLength::Detailed,
        );
        record.id = RecordId::from("a");
        record.timestamp = 1_000;
        record.pending_sync = true;

        let value = serde_json::to_value(UploadPayload::from(&record)).unwrap();
        assert_eq!(value["id"], "a");
        assert_eq!(value["createdAt"], "1970-01-01T00:00:01.000Z");
        assert_eq!(value["summaryLength"], "detailed");
        assert!(value.get("pendingSync").is_none());
        assert!(value.get("timestamp").is_none());
    }

    #[test]
    fn status_codes_map_to_error_kinds() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"message": "jwt expired"}"#),
            ApiError::Unauthorized(message) if message == "jwt expired"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_REQUEST, "{}"),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ApiError::Transient(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::CONFLICT, "dup"),
            ApiError::Http { status: 409, .. }
        ));
    }

    #[test]
    fn history_page_parses_mixed_timestamps() {
        let page: HistoryPage = serde_json::from_str(
            r#"{
                "items": [
                    {"id": "a", "createdAt": "1970-01-01T00:00:00.200Z"},
                    {"id": "b", "createdAt": {"seconds": 2}},
                    {"id": "c", "createdAt": 3000}
                ],
                "total": 3,
                "hasMore": false
            }"#,
        )
        .unwrap();
        let millis: Vec<Option<i64>> = page
            .items
            .iter()
            .map(RemoteRecord::created_at_millis)
            .collect();
        assert_eq!(millis, vec![Some(200), Some(2000), Some(3000)]);
        assert!(!page.has_more);
    }
}

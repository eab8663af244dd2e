//! Outcomes of dispatched jobs.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{Credential, JobIndex};
use crate::http::HttpResponse;

/// Response body, parsed as JSON when possible.
///
/// The raw text is always retained so classification never depends on parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json { raw: String, value: serde_json::Value },
    Text(String),
}

impl ResponseBody {
    pub fn from_text(raw: String) -> Self {
        match serde_json::from_str(&raw) {
            Ok(value) => ResponseBody::Json { raw, value },
            Err(_) => ResponseBody::Text(raw),
        }
    }

    pub fn raw(&self) -> &str {
        match self {
            ResponseBody::Json { raw, .. } => raw,
            ResponseBody::Text(raw) => raw,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, ResponseBody::Json { .. })
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        ResponseBody::Text(String::new())
    }
}

impl Serialize for ResponseBody {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseBody::Json { value, .. } => value.serialize(serializer),
            ResponseBody::Text(raw) => raw.serialize(serializer),
        }
    }
}

/// Why a job produced no HTTP response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum FailureReason {
    /// DNS failure, refused connection, reset, TLS failure and similar.
    NetworkError { error: String },

    /// The per-request deadline elapsed.
    Timeout { timeout_ms: u64 },

    /// The request could not be built (bad URL, invalid header). Retrying won't help.
    RequestBuilderError { error: String },

    /// The job task ended without reporting (panic).
    TaskTerminated,
}

impl FailureReason {
    /// Returns true if resubmitting the same job might succeed.
    pub fn is_retriable(&self) -> bool {
        match self {
            FailureReason::NetworkError { .. } => true,
            FailureReason::Timeout { .. } => true,
            FailureReason::RequestBuilderError { .. } => false,
            FailureReason::TaskTerminated => true,
        }
    }

    /// Returns a human-readable error message for this failure reason.
    pub fn to_error_message(&self) -> String {
        match self {
            FailureReason::NetworkError { error } => format!("Network error: {}", error),
            FailureReason::Timeout { timeout_ms } => {
                format!("Request timed out after {}ms", timeout_ms)
            }
            FailureReason::RequestBuilderError { error } => {
                format!("Failed to build HTTP request: {}", error)
            }
            FailureReason::TaskTerminated => "Job task terminated unexpectedly".to_string(),
        }
    }
}

/// Result of one dispatched job, after any retries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResult {
    pub job_index: JobIndex,
    pub credential: Credential,
    /// Absent when the request never got a response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub status_text: String,
    pub body: ResponseBody,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureReason>,
    /// Number of submissions made, including the first
    pub attempts: u32,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl RequestResult {
    pub fn from_response(
        job_index: JobIndex,
        credential: Credential,
        response: HttpResponse,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            job_index,
            credential,
            status: Some(response.status),
            status_text: response.status_text,
            body: ResponseBody::from_text(response.body),
            error: None,
            attempts,
            elapsed,
            completed_at: Utc::now(),
        }
    }

    pub fn from_failure(
        job_index: JobIndex,
        credential: Credential,
        reason: FailureReason,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            job_index,
            credential,
            status: None,
            status_text: String::new(),
            body: ResponseBody::default(),
            error: Some(reason),
            attempts,
            elapsed,
            completed_at: Utc::now(),
        }
    }

    pub fn is_transport_error(&self) -> bool {
        self.error.is_some()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

//! Operator-facing reporting of outcomes.
//!
//! Notable results are always reported. Expected failures are logged at debug level
//! and printed only when asked for.

use serde::Serialize;

use crate::classify::Classification;
use crate::dispatcher::{DispatchStats, JobOutcome};
use crate::domain::job::JobIndex;
use crate::domain::result::ResponseBody;

/// How reported results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One readable line per result
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Printed form of one result: `{status, statusText, body}` or `{error}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord<'a> {
    pub job: JobIndex,
    pub username: &'a str,
    pub password: &'a str,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a ResponseBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
}

impl<'a> ReportRecord<'a> {
    pub fn from_outcome(outcome: &'a JobOutcome) -> Self {
        let result = &outcome.result;
        let responded = result.error.is_none();
        Self {
            job: result.job_index,
            username: &result.credential.username,
            password: &result.credential.password,
            classification: outcome.classification,
            status: result.status,
            status_text: responded.then_some(result.status_text.as_str()),
            body: responded.then_some(&result.body),
            error: result.error.as_ref().map(|reason| reason.to_error_message()),
            attempts: result.attempts,
        }
    }
}

/// Decides which outcomes are shown and renders them.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    pub format: OutputFormat,
    /// Also print expected failures
    pub show_failures: bool,
}

impl Reporter {
    pub fn new(format: OutputFormat, show_failures: bool) -> Self {
        Self {
            format,
            show_failures,
        }
    }

    /// Log the outcome and return the line to print, if it should be shown.
    pub fn report(&self, outcome: &JobOutcome) -> Option<String> {
        let result = &outcome.result;
        match (outcome.classification, &result.error) {
            (Classification::Notable, Some(reason)) => tracing::warn!(
                job = %result.job_index,
                username = %result.credential.username,
                error = %reason.to_error_message(),
                "Request failed"
            ),
            (Classification::Notable, None) => tracing::info!(
                job = %result.job_index,
                username = %result.credential.username,
                status = result.status,
                body_len = result.body.raw().len(),
                "Notable response"
            ),
            (Classification::ExpectedFailure, _) => tracing::debug!(
                job = %result.job_index,
                username = %result.credential.username,
                status = result.status,
                "Expected failure"
            ),
        }

        if outcome.classification == Classification::ExpectedFailure && !self.show_failures {
            return None;
        }
        Some(self.render(outcome))
    }

    pub fn render(&self, outcome: &JobOutcome) -> String {
        let record = ReportRecord::from_outcome(outcome);
        match self.format {
            OutputFormat::Json => serde_json::to_string(&record).unwrap_or_else(|e| {
                format!(r#"{{"job":{},"error":"unserializable record: {}"}}"#, record.job.0, e)
            }),
            OutputFormat::Text => render_text(&record),
        }
    }
}

fn render_text(record: &ReportRecord<'_>) -> String {
    let tag = match record.classification {
        Classification::Notable => "NOTABLE",
        Classification::ExpectedFailure => "failure",
    };
    let detail = match (&record.error, record.status) {
        (Some(error), _) => format!("error: {}", error),
        (None, Some(status)) => {
            let body = record.body.map(ResponseBody::raw).unwrap_or_default();
            format!(
                "{} {} body={}",
                status,
                record.status_text.unwrap_or_default(),
                preview(body, 120)
            )
        }
        (None, None) => "no response".to_string(),
    };
    format!(
        "[{}] {} {}:{} -> {}",
        tag, record.job, record.username, record.password, detail
    )
}

/// First `max` characters of `text` on one line.
fn preview(text: &str, max: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(max)
        .collect();
    if text.chars().count() > max {
        format!("{}...", flat)
    } else {
        flat
    }
}

/// Log the end-of-run summary.
pub fn log_summary(stats: &DispatchStats, total_jobs: u64) {
    tracing::info!(
        total_jobs,
        launched = stats.launched,
        completed = stats.completed,
        notable = stats.notable,
        expected_failures = stats.expected_failures,
        transport_errors = stats.transport_errors,
        retries = stats.retries,
        cancelled = stats.cancelled,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "Spray finished"
    );
}

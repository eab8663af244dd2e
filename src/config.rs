//! Run configuration.
//!
//! [`SprayConfig`] carries everything a run needs. The command-line layer builds one;
//! library users can construct or deserialize it directly.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::classify::FailureSignature;
use crate::dispatcher::DispatcherConfig;
use crate::error::{Result, StomperError};

/// Configuration for a single spraying run.
#[derive(Clone, Serialize, Deserialize)]
pub struct SprayConfig {
    /// Newline-delimited usernames
    pub user_file: PathBuf,

    /// Newline-delimited passwords
    pub pass_file: PathBuf,

    /// POST endpoint
    pub target: String,

    /// Raw `key:value` field templates, in submission order
    pub form_fields: Vec<String>,

    /// Body substring of an expected (failed login) response
    pub failure_message: Option<String>,

    /// Status code of an expected (failed login) response
    pub failure_status: Option<u16>,

    /// Launch stagger between consecutive jobs, in milliseconds
    pub interval_ms: Option<u64>,

    #[serde(flatten)]
    pub dispatcher: DispatcherConfig,
}

impl SprayConfig {
    pub fn new(
        user_file: impl Into<PathBuf>,
        pass_file: impl Into<PathBuf>,
        target: impl Into<String>,
        form_fields: Vec<String>,
    ) -> Self {
        Self {
            user_file: user_file.into(),
            pass_file: pass_file.into(),
            target: target.into(),
            form_fields,
            failure_message: None,
            failure_status: None,
            interval_ms: None,
            dispatcher: DispatcherConfig::default(),
        }
    }

    /// Checks that need no I/O. Word lists and templates are checked when loaded.
    pub fn validate(&self) -> Result<()> {
        parse_target(&self.target)?;
        if self.form_fields.is_empty() {
            return Err(StomperError::InvalidConfig(
                "at least one form field template is required".to_string(),
            ));
        }
        if self.failure_message.as_deref() == Some("") {
            return Err(StomperError::InvalidConfig(
                "failure message must not be empty".to_string(),
            ));
        }
        if let Some(status) = self.failure_status
            && !(100..=599).contains(&status)
        {
            return Err(StomperError::InvalidConfig(format!(
                "failure status {} is not an HTTP status code",
                status
            )));
        }
        self.dispatcher.validate()
    }

    pub fn signature(&self) -> FailureSignature {
        FailureSignature::new(self.failure_status, self.failure_message.clone())
    }

    /// Stagger interval, if one is configured and non-zero.
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

/// Parse the target, accepting only http and https URLs.
pub fn parse_target(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|_| StomperError::InvalidTarget(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(StomperError::InvalidTarget(raw.to_string())),
    }
}

//! Error types for the dispatcher.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using the stomper error type.
pub type Result<T> = std::result::Result<T, StomperError>;

/// Main error type for loading inputs and dispatching jobs.
#[derive(Error, Debug)]
pub enum StomperError {
    /// A word list could not be opened or read
    #[error("Failed to read word list '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A word list contained no usable entries
    #[error("Word list '{}' contains no entries", path.display())]
    EmptyWordList { path: PathBuf },

    /// A form field template is missing its `key:value` delimiter or key
    #[error("Malformed form field template '{0}': expected key:value")]
    MalformedTemplate(String),

    /// The target is not an http(s) URL
    #[error("Invalid target URL '{0}'")]
    InvalidTarget(String),

    /// Configuration rejected before dispatch
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled
    #[error("Dispatcher is shutting down")]
    Shutdown,

    /// HTTP client error
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StomperError {
    /// True for errors raised before any request is issued.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            StomperError::Io { .. }
                | StomperError::EmptyWordList { .. }
                | StomperError::MalformedTemplate(_)
                | StomperError::InvalidTarget(_)
                | StomperError::InvalidConfig(_)
        )
    }
}

/// Helpers for flattening errors into a serializable form.
///
/// Transport failures are reported as part of the result stream rather than
/// propagated, so the full source chain is captured here while it is still available.
pub mod error_serialization {
    use serde::{Deserialize, Serialize};

    /// Serialized error format that preserves error message and source chain.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    pub struct SerializedError {
        /// The main error message
        pub message: String,
        /// Chain of source errors, if any
        pub sources: Vec<String>,
    }

    impl SerializedError {
        /// Capture an error and every source below it.
        pub fn capture(error: &(dyn std::error::Error + 'static)) -> Self {
            let mut sources = Vec::new();
            let mut current = error.source();
            while let Some(source) = current {
                sources.push(source.to_string());
                current = source.source();
            }
            Self {
                message: error.to_string(),
                sources,
            }
        }

        /// Single-line rendering: message followed by each cause.
        ///
        /// A cause already spelled out at the end of the text so far is skipped.
        pub fn render(&self) -> String {
            let mut rendered = self.message.clone();
            for source in &self.sources {
                if rendered.ends_with(source.as_str()) {
                    continue;
                }
                rendered.push_str(": ");
                rendered.push_str(source);
            }
            rendered
        }
    }

}

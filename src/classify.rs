//! Result classification against an operator-declared failure signature.
//!
//! A result that matches the signature is an expected failure. Anything else is
//! notable and is surfaced for manual review: a possible valid credential, or a
//! lockout, rate-limit or otherwise unusual response. Whether a notable result
//! really is a valid login is left to the operator.

use serde::{Deserialize, Serialize};

use crate::domain::result::RequestResult;

/// Response pattern that marks a known, uninteresting failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureSignature {
    /// Status code of a failed login
    pub status: Option<u16>,
    /// Substring present in the body of a failed login
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    ExpectedFailure,
    Notable,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::ExpectedFailure => "expected_failure",
            Classification::Notable => "notable",
        }
    }
}

impl FailureSignature {
    pub fn new(status: Option<u16>, message: Option<String>) -> Self {
        Self { status, message }
    }

    /// True when neither a status nor a message is configured.
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.message.is_none()
    }

    /// Classify a single result.
    ///
    /// Matches on status equality or body substring; either is sufficient. Results
    /// without a response (transport errors) never match, and with no signature
    /// configured every result is notable.
    pub fn classify(&self, result: &RequestResult) -> Classification {
        if result.is_transport_error() {
            return Classification::Notable;
        }

        let status_matches = matches!(
            (self.status, result.status),
            (Some(expected), Some(actual)) if expected == actual
        );
        let message_matches = self
            .message
            .as_deref()
            .is_some_and(|message| result.body.raw().contains(message));

        if status_matches || message_matches {
            Classification::ExpectedFailure
        } else {
            Classification::Notable
        }
    }
}

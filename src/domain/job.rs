//! Credentials and the jobs built from them.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::template::SubstitutedField;

/// Emission index of a job; doubles as its identity in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct JobIndex(pub u64);

impl fmt::Display for JobIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One (username, password) pair drawn from the cartesian product.
#[derive(Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// Passwords stay out of debug logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A single pending form submission.
///
/// Each job owns its fields; nothing is shared with other jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestJob {
    pub index: JobIndex,
    pub target: Url,
    pub credential: Credential,
    /// Substituted fields in template order
    pub fields: Vec<SubstitutedField>,
    /// Earliest launch time relative to dispatch start
    pub scheduled_offset: Duration,
}

impl RequestJob {
    /// URL-encoded form body.
    ///
    /// Repeated keys are emitted as repeated pairs, in field order.
    pub fn form_body(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for field in &self.fields {
            serializer.append_pair(&field.key, &field.value);
        }
        serializer.finish()
    }
}

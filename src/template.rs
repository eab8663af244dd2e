//! Form field templates and placeholder substitution.
//!
//! A template is supplied as `key:value`, split on the first `:`. The value may carry
//! `{USER}` and `{PASS}` placeholders which are resolved per credential. Anything else
//! in braces is left untouched, so literal braces in form values survive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::job::Credential;
use crate::error::StomperError;

/// Placeholder replaced with the username.
pub const USER_PLACEHOLDER: &str = "{USER}";

/// Placeholder replaced with the password.
pub const PASS_PLACEHOLDER: &str = "{PASS}";

/// A form field whose value may contain substitution placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTemplate {
    pub key: String,
    pub value_template: String,
}

/// A form field with placeholders resolved against one credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubstitutedField {
    pub key: String,
    pub value: String,
}

/// Which placeholders a template references.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Placeholders {
    pub user: bool,
    pub pass: bool,
}

impl FieldTemplate {
    /// Parse a `key:value` template.
    ///
    /// Only the first `:` separates key from value; later colons belong to the value.
    pub fn parse(raw: &str) -> Result<Self, StomperError> {
        match raw.split_once(':') {
            Some((key, value)) if !key.is_empty() => Ok(Self {
                key: key.to_string(),
                value_template: value.to_string(),
            }),
            _ => Err(StomperError::MalformedTemplate(raw.to_string())),
        }
    }

    /// Resolve `{USER}` and `{PASS}` for one credential.
    ///
    /// Occurrences are replaced left to right and never overlap. Substituted text is
    /// not scanned again, so a username that itself contains `{PASS}` stays literal.
    pub fn substitute(&self, credential: &Credential) -> SubstitutedField {
        let mut value = String::with_capacity(self.value_template.len());
        let mut rest = self.value_template.as_str();

        while let Some(open) = rest.find('{') {
            value.push_str(&rest[..open]);
            let tail = &rest[open..];
            if let Some(after) = tail.strip_prefix(USER_PLACEHOLDER) {
                value.push_str(&credential.username);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(PASS_PLACEHOLDER) {
                value.push_str(&credential.password);
                rest = after;
            } else {
                value.push('{');
                rest = &tail[1..];
            }
        }
        value.push_str(rest);

        SubstitutedField {
            key: self.key.clone(),
            value,
        }
    }

    pub fn placeholders(&self) -> Placeholders {
        Placeholders {
            user: self.value_template.contains(USER_PLACEHOLDER),
            pass: self.value_template.contains(PASS_PLACEHOLDER),
        }
    }
}

impl FromStr for FieldTemplate {
    type Err = StomperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value_template)
    }
}

/// Parse every raw template, failing on the first malformed one.
pub fn parse_all<I, S>(raw: I) -> Result<Vec<FieldTemplate>, StomperError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| FieldTemplate::parse(s.as_ref()))
        .collect()
}

/// Union of the placeholders used across a set of templates.
pub fn placeholders_used(templates: &[FieldTemplate]) -> Placeholders {
    templates
        .iter()
        .map(FieldTemplate::placeholders)
        .fold(Placeholders::default(), |acc, p| Placeholders {
            user: acc.user || p.user,
            pass: acc.pass || p.pass,
        })
}

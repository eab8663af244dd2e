//! Lazy cartesian product of credentials into request jobs.
//!
//! Jobs are emitted username-major: every password is tried against one account
//! before moving to the next. Only the input lists are held in memory; each job is
//! built on demand.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::domain::job::{Credential, JobIndex, RequestJob};
use crate::template::FieldTemplate;

/// Iterator over every (username, password) job.
///
/// Cloning yields an independent iterator at the same position, so a fresh
/// `Combinations` can be replayed from the start.
#[derive(Debug, Clone)]
pub struct Combinations {
    target: Url,
    users: Arc<[String]>,
    passwords: Arc<[String]>,
    templates: Arc<[FieldTemplate]>,
    interval: Option<Duration>,
    next: u64,
    total: u64,
}

impl Combinations {
    pub fn new(
        target: Url,
        users: impl Into<Arc<[String]>>,
        passwords: impl Into<Arc<[String]>>,
        templates: impl Into<Arc<[FieldTemplate]>>,
        interval: Option<Duration>,
    ) -> Self {
        let users = users.into();
        let passwords = passwords.into();
        let total = (users.len() as u64).saturating_mul(passwords.len() as u64);
        Self {
            target,
            users,
            passwords,
            templates: templates.into(),
            interval,
            next: 0,
            total,
        }
    }

    /// Number of jobs in the full product, `|users| × |passwords|`.
    pub fn total(&self) -> u64 {
        self.total
    }

    fn job_at(&self, index: u64) -> RequestJob {
        let per_user = self.passwords.len() as u64;
        let user = &self.users[(index / per_user) as usize];
        let password = &self.passwords[(index % per_user) as usize];
        let credential = Credential::new(user.as_str(), password.as_str());

        let fields = self
            .templates
            .iter()
            .map(|template| template.substitute(&credential))
            .collect();

        RequestJob {
            index: JobIndex(index),
            target: self.target.clone(),
            credential,
            fields,
            scheduled_offset: stagger_offset(self.interval, index),
        }
    }
}

impl Iterator for Combinations {
    type Item = RequestJob;

    fn next(&mut self) -> Option<RequestJob> {
        if self.next >= self.total {
            return None;
        }
        let job = self.job_at(self.next);
        self.next += 1;
        Some(job)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next;
        match usize::try_from(remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl ExactSizeIterator for Combinations {}

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Launch offset of job `index`: `index × interval`, saturating.
pub fn stagger_offset(interval: Option<Duration>, index: u64) -> Duration {
    match interval {
        Some(interval) => {
            let nanos = interval.as_nanos().saturating_mul(u128::from(index));
            let secs = nanos / NANOS_PER_SEC;
            match u64::try_from(secs) {
                Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
                Err(_) => Duration::MAX,
            }
        }
        None => Duration::ZERO,
    }
}

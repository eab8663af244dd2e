//! Run statistics.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::classify::Classification;
use crate::domain::result::RequestResult;

/// Live counters shared between the driver and job tasks.
#[derive(Debug, Default)]
pub struct DispatchCounters {
    launched: AtomicU64,
    completed: AtomicU64,
    notable: AtomicU64,
    expected_failures: AtomicU64,
    transport_errors: AtomicU64,
    retries: AtomicU64,
    in_flight: AtomicUsize,
    cancelled: AtomicBool,
}

/// Snapshot of a run's statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Jobs handed to the transport
    pub launched: u64,
    /// Jobs that produced a result (response or transport error)
    pub completed: u64,
    pub notable: u64,
    pub expected_failures: u64,
    pub transport_errors: u64,
    /// Resubmissions beyond first attempts
    pub retries: u64,
    /// Jobs still executing when the snapshot was taken
    pub in_flight: usize,
    /// True if the run stopped before every job was dispatched
    pub cancelled: bool,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl DispatchCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_launch(&self) {
        self.launched.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finished_task(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_result(&self, result: &RequestResult, classification: Classification) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if result.is_transport_error() {
            self.transport_errors.fetch_add(1, Ordering::Relaxed);
        }
        match classification {
            Classification::Notable => self.notable.fetch_add(1, Ordering::Relaxed),
            Classification::ExpectedFailure => {
                self.expected_failures.fetch_add(1, Ordering::Relaxed)
            }
        };
    }

    pub(crate) fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, elapsed: Duration) -> DispatchStats {
        DispatchStats {
            launched: self.launched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            notable: self.notable.load(Ordering::Relaxed),
            expected_failures: self.expected_failures.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

fn as_millis<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

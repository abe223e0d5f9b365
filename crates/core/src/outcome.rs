//! Per-request and per-record outcomes plus the run aggregator.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Final classification of one request attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    Success,
    ClientError,
    ServerError,
    NetworkError,
    ExhaustedRetries,
}

impl OutcomeClass {
    /// Status family for a permanent (non-retried) HTTP failure.
    pub fn for_status(status: u16) -> Self {
        if (500..600).contains(&status) {
            Self::ServerError
        } else {
            Self::ClientError
        }
    }
}

/// Result of one endpoint call, including any retries.
///
/// Any outcome produced by an actual call has `attempts` >= 1; zero is
/// reserved for records rejected before the first attempt. `response`
/// carries the parsed body of the last attempt, or an `{"error": ...}`
/// detail when no body was readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOutcome {
    pub succeeded: bool,
    pub class: OutcomeClass,
    pub attempts: u32,
    pub response: Value,
}

impl RequestOutcome {
    pub fn success(attempts: u32, response: Value) -> Self {
        Self {
            succeeded: true,
            class: OutcomeClass::Success,
            attempts,
            response,
        }
    }

    pub fn failure(class: OutcomeClass, attempts: u32, response: Value) -> Self {
        Self {
            succeeded: false,
            class,
            attempts,
            response,
        }
    }
}

/// Paired endpoint outcomes for one customer record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub email: String,
    pub timestamp: String,
    pub profile_update: RequestOutcome,
    pub event_track: RequestOutcome,
    pub overall_success: bool,
}

impl RecordOutcome {
    /// Overall success is derived from the two request outcomes, never set
    /// by callers.
    pub fn new(
        email: impl Into<String>,
        profile_update: RequestOutcome,
        event_track: RequestOutcome,
    ) -> Self {
        let overall_success = profile_update.succeeded && event_track.succeeded;
        Self {
            email: email.into(),
            timestamp: Utc::now().to_rfc3339(),
            profile_update,
            event_track,
            overall_success,
        }
    }
}

/// Tallies record outcomes into disjoint buckets and keeps the ordered trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub total_users: usize,
    pub successful: usize,
    pub partial_failures: usize,
    pub total_failures: usize,
    pub records: Vec<RecordOutcome>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self {
            total_users: 0,
            successful: 0,
            partial_failures: 0,
            total_failures: 0,
            records: Vec::new(),
        }
    }

    /// Append one record outcome, counting it into exactly one bucket.
    pub fn push(&mut self, outcome: RecordOutcome) {
        self.total_users += 1;
        if outcome.overall_success {
            self.successful += 1;
        } else if outcome.profile_update.succeeded || outcome.event_track.succeeded {
            self.partial_failures += 1;
        } else {
            self.total_failures += 1;
        }
        self.records.push(outcome);
    }
}

impl Default for SyncReport {
    fn default() -> Self {
        Self::new()
    }
}

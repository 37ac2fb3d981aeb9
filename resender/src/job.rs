//! The data model of a recurring job.
use std::fmt::Display;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, Serializer};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{dispatch::AttemptFailure, ResenderError};

pub mod builder;

pub use builder::{JobRequest, JobRequestBuilder};

/// Identifies a job: the recipient the payload is delivered to.
///
/// Two start requests with the same key refer to the same logical job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Creates a key from a recipient, ignoring surrounding whitespace.
    ///
    /// Returns [`ResenderError::InvalidInput`] for an empty recipient.
    pub fn new(recipient: impl AsRef<str>) -> Result<Self, ResenderError> {
        let recipient = recipient.as_ref().trim();
        if recipient.is_empty() {
            return Err(ResenderError::invalid_input("recipient", "must not be empty"));
        }
        Ok(Self(recipient.to_owned()))
    }

    /// The recipient this key refers to.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for JobKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// What gets delivered on every attempt. Fixed for the lifetime of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub content: String,
}

impl Payload {
    /// Creates a payload, rejecting a blank subject or content.
    pub fn new(
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self, ResenderError> {
        let subject = subject.into();
        let content = content.into();
        if subject.trim().is_empty() {
            return Err(ResenderError::invalid_input("subject", "must not be empty"));
        }
        if content.trim().is_empty() {
            return Err(ResenderError::invalid_input("content", "must not be empty"));
        }
        Ok(Self { subject, content })
    }
}

/// Tags a job installation. Every (re)start of a key installs a strictly greater generation.
///
/// Generations come from a registry wide counter so a key that is stopped and started again
/// never sees an old generation come back to life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// The raw counter value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Generation {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Generation({})", self.0)
    }
}

/// Whether [`crate::scheduler::Scheduler::start`] created a new job or replaced one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOutcome {
    /// No job existed for the key.
    Created,
    /// A job existed; its chain was cancelled and superseded.
    Replaced,
}

/// Result of [`crate::scheduler::Scheduler::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// The job was removed and its chain cancelled.
    Stopped,
    /// There was no job for the key.
    NotFound,
}

/// What the caller of [`crate::scheduler::Scheduler::start`] learns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    /// Created or replaced.
    pub outcome: StartOutcome,
    /// The generation installed for this start.
    pub generation: Generation,
    /// The interval the chain repeats at.
    pub interval: TimeDelta,
    /// The outcome of the immediate first attempt. The chain is armed either way.
    pub first_attempt: Result<(), AttemptFailure>,
}

/// Owns the chain task of a job. Only ever used to cancel it.
#[derive(Debug)]
pub(crate) struct TimerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub(crate) fn new(token: CancellationToken, task: JoinHandle<()>) -> Self {
        Self { token, task }
    }

    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// The live state of an active job, as stored in the registry.
#[derive(Debug)]
pub(crate) struct JobState {
    pub(crate) payload: Payload,
    pub(crate) interval: TimeDelta,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) last_attempt_at: Option<DateTime<Utc>>,
    pub(crate) next_scheduled_at: Option<DateTime<Utc>>,
    pub(crate) generation: Generation,
    pub(crate) attempts: u64,
    pub(crate) failures: u64,
    pub(crate) last_error: Option<AttemptFailure>,
    pub(crate) timer: TimerHandle,
}

/// Bookkeeping for one completed attempt.
#[derive(Debug, Clone)]
pub(crate) struct AttemptRecord {
    pub(crate) completed_at: DateTime<Utc>,
    pub(crate) next_scheduled_at: Option<DateTime<Utc>>,
    pub(crate) failure: Option<AttemptFailure>,
}

impl JobState {
    pub(crate) fn new(
        payload: Payload,
        interval: TimeDelta,
        generation: Generation,
        timer: TimerHandle,
    ) -> Self {
        Self {
            payload,
            interval,
            started_at: Utc::now(),
            last_attempt_at: None,
            next_scheduled_at: None,
            generation,
            attempts: 0,
            failures: 0,
            last_error: None,
            timer,
        }
    }

    pub(crate) fn record(&mut self, record: AttemptRecord) {
        self.attempts += 1;
        self.last_attempt_at = Some(record.completed_at);
        self.next_scheduled_at = record.next_scheduled_at;
        if let Some(failure) = record.failure {
            self.failures += 1;
            self.last_error = Some(failure);
        }
    }

    pub(crate) fn snapshot(&self, key: &JobKey) -> JobSnapshot {
        JobSnapshot {
            key: key.clone(),
            subject: self.payload.subject.clone(),
            interval: self.interval,
            started_at: self.started_at,
            last_attempt_at: self.last_attempt_at,
            next_scheduled_at: self.next_scheduled_at,
            generation: self.generation,
            attempts: self.attempts,
            failures: self.failures,
            last_error: self.last_error.clone(),
        }
    }
}

/// A read-only copy of a job taken at a single point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    /// The recipient.
    #[serde(rename = "recipient")]
    pub key: JobKey,
    /// Subject of the payload being delivered.
    pub subject: String,
    /// Delay between the end of one attempt and the start of the next.
    #[serde(rename = "intervalSeconds", serialize_with = "serialize_seconds")]
    pub interval: TimeDelta,
    /// When the job was (re)started.
    pub started_at: DateTime<Utc>,
    /// When the most recent attempt completed.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// When the next attempt is planned.
    pub next_scheduled_at: Option<DateTime<Utc>>,
    /// The installed generation.
    pub generation: Generation,
    /// Attempts made so far, including the first.
    pub attempts: u64,
    /// How many of those attempts failed.
    pub failures: u64,
    /// The most recent failure, if any.
    pub last_error: Option<AttemptFailure>,
}

fn serialize_seconds<S>(delta: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(delta.num_milliseconds() as f64 / 1000.0)
}

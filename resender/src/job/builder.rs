use chrono::TimeDelta;

use crate::ResenderError;

use super::{JobKey, Payload};

/// A validated request to start (or replace) a job.
///
/// Constructed via [`JobRequest::builder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub(crate) key: JobKey,
    pub(crate) payload: Payload,
    pub(crate) interval: Option<TimeDelta>,
}

impl JobRequest {
    /// Start building a request.
    pub fn builder() -> JobRequestBuilder {
        Default::default()
    }

    /// The recipient the job is for.
    pub fn key(&self) -> &JobKey {
        &self.key
    }

    /// The payload delivered on every attempt.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// The requested interval, or [`None`] to use the scheduler's default.
    pub fn interval(&self) -> Option<TimeDelta> {
        self.interval
    }
}

/// Builder for [`JobRequest`].
///
/// Nothing is validated until [`JobRequestBuilder::build`].
#[derive(Debug, Default, Clone)]
pub struct JobRequestBuilder {
    recipient: Option<String>,
    subject: Option<String>,
    content: Option<String>,
    interval: Option<Result<TimeDelta, &'static str>>,
}

impl JobRequestBuilder {
    /// The recipient, which doubles as the job's key.
    pub fn for_recipient(self, recipient: impl Into<String>) -> Self {
        Self {
            recipient: Some(recipient.into()),
            ..self
        }
    }

    /// The subject line.
    pub fn with_subject(self, subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..self
        }
    }

    /// The HTML body.
    pub fn with_content(self, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..self
        }
    }

    /// Repeat every `interval`. Must be positive.
    pub fn every(self, interval: TimeDelta) -> Self {
        Self {
            interval: Some(Ok(interval)),
            ..self
        }
    }

    /// Repeat every `minutes` minutes, which may be fractional.
    ///
    /// Positive values that round to less than a millisecond, or that are too large to
    /// represent, are rejected by [`JobRequestBuilder::build`] as out of range.
    pub fn every_minutes(self, minutes: f64) -> Self {
        let interval = match interval_from_minutes(minutes) {
            Some(interval) if interval > TimeDelta::zero() => Ok(interval),
            _ if minutes > 0.0 => Err("is out of range"),
            _ => Ok(TimeDelta::zero()),
        };
        Self {
            interval: Some(interval),
            ..self
        }
    }

    /// Validate and build the request.
    ///
    /// # Errors
    ///
    /// [`ResenderError::InvalidInput`] when the recipient, subject or content is missing or
    /// blank, or when an interval was given that is not positive.
    pub fn build(self) -> Result<JobRequest, ResenderError> {
        let recipient = self
            .recipient
            .ok_or(ResenderError::invalid_input("recipient", "is required"))?;
        let subject = self
            .subject
            .ok_or(ResenderError::invalid_input("subject", "is required"))?;
        let content = self
            .content
            .ok_or(ResenderError::invalid_input("content", "is required"))?;

        let key = JobKey::new(recipient)?;
        let payload = Payload::new(subject, content)?;
        let interval = self
            .interval
            .map(|interval| {
                interval
                    .map_err(|reason| ResenderError::invalid_input("interval", reason))
                    .and_then(validate_interval)
            })
            .transpose()?;

        Ok(JobRequest {
            key,
            payload,
            interval,
        })
    }
}

/// Converts a possibly fractional number of minutes to a [`TimeDelta`], to the millisecond.
///
/// Returns [`None`] for non-finite values and values outside the range of [`TimeDelta`]. The
/// result is not checked for being positive.
pub fn interval_from_minutes(minutes: f64) -> Option<TimeDelta> {
    let millis = (minutes * 60_000.0).round();
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return None;
    }
    TimeDelta::try_milliseconds(millis as i64)
}

pub(crate) fn validate_interval(interval: TimeDelta) -> Result<TimeDelta, ResenderError> {
    if interval <= TimeDelta::zero() {
        return Err(ResenderError::invalid_input("interval", "must be positive"));
    }
    Ok(interval)
}

//! The action performed on every attempt of a dispatch chain.
//!
//! The scheduler treats a [`Dispatcher`] as an opaque capability. Whatever it does, every
//! attempt ends up either [`DispatchResult::Sent`] or as an [`AttemptFailure`]. Failures are
//! never fatal to the chain: they are recorded against the job and the next attempt is armed
//! as usual.
use std::{error::Error, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinError;

use crate::job::{JobKey, Payload};

pub(crate) const ERROR_TYPE_PANIC: &str = "panic";
pub(crate) const ERROR_TYPE_TIMEOUT: &str = "timeout";

/// Delivers a payload to a recipient.
///
/// Implementations should be idempotent as far as possible: the scheduler will call
/// [`Dispatcher::dispatch`] once immediately on start and then once per interval.
///
/// # Example
///
/// ```
/// # use resender::prelude::*;
/// use async_trait::async_trait;
///
/// struct Stdout;
///
/// #[async_trait]
/// impl Dispatcher for Stdout {
///     async fn dispatch(&self, recipient: &JobKey, payload: &Payload) -> DispatchResult {
///         println!("to {recipient}: {}", payload.subject);
///         DispatchResult::Sent
///     }
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Perform a single attempt.
    async fn dispatch(&self, recipient: &JobKey, payload: &Payload) -> DispatchResult;

    /// The longest a single attempt may take before it is abandoned and recorded as a
    /// failure. [`None`] means attempts are never timed out by the scheduler.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// The outcome of a single [`Dispatcher::dispatch`] call.
#[derive(Debug)]
pub enum DispatchResult {
    /// The payload was handed over successfully.
    Sent,
    /// The attempt failed. The chain carries on regardless.
    Failed {
        /// What went wrong.
        error: Box<dyn DispatchError>,
    },
}

impl<T> From<T> for DispatchResult
where
    T: DispatchError + 'static,
{
    fn from(value: T) -> Self {
        Self::Failed {
            error: Box::new(value),
        }
    }
}

/// An error raised by a [`Dispatcher`].
pub trait DispatchError: Error + Send + Sync {
    /// A short, stable classification of the error, e.g. `"send"` or `"address"`.
    fn error_type(&self) -> &'static str;
}

/// The recorded form of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{error_type}: {message}")]
pub struct AttemptFailure {
    /// Classification of the failure: `panic`, `timeout` or the dispatcher's own type.
    pub error_type: String,
    /// Human readable detail.
    pub message: String,
}

impl From<JoinError> for AttemptFailure {
    fn from(value: JoinError) -> Self {
        let msg = value.to_string();
        let message = match value.try_into_panic() {
            Ok(panic) => panic
                .downcast_ref::<&str>()
                .map(ToString::to_string)
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or(msg),
            Err(_) => msg,
        };
        Self {
            error_type: ERROR_TYPE_PANIC.to_owned(),
            message,
        }
    }
}

impl From<Box<dyn DispatchError>> for AttemptFailure {
    fn from(value: Box<dyn DispatchError>) -> Self {
        Self {
            error_type: value.error_type().to_owned(),
            message: value.to_string(),
        }
    }
}

impl From<Duration> for AttemptFailure {
    fn from(value: Duration) -> Self {
        Self {
            error_type: ERROR_TYPE_TIMEOUT.to_owned(),
            message: format!("Dispatch failed to complete within timeout: {value:?}"),
        }
    }
}

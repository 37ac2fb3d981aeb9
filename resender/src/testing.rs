//! Helpers for testing.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    dispatch::{DispatchError, DispatchResult, Dispatcher},
    job::{JobKey, Payload},
};

/// A single call made to a [`RecordingDispatcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedDispatch {
    /// Who the payload was for.
    pub recipient: String,
    /// The payload's subject.
    pub subject: String,
    /// The payload's content.
    pub content: String,
    /// When the call started, on the tokio clock.
    pub at: Instant,
}

/// The error returned by a [`RecordingDispatcher`] that has been told to fail.
#[derive(Debug, thiserror::Error)]
#[error("Dispatch to {0} failed on purpose")]
pub struct RecordedFailure(String);

impl DispatchError for RecordedFailure {
    fn error_type(&self) -> &'static str {
        "recorded"
    }
}

/// A [`Dispatcher`] that remembers every call instead of delivering anything.
///
/// Clones share their record, so keep one clone for assertions and hand the other to the
/// scheduler.
///
/// # Example
///
/// ```
/// # use resender::prelude::*;
/// # use resender::testing::assert_dispatched;
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// use resender::testing::RecordingDispatcher;
///
/// let dispatcher = RecordingDispatcher::new();
/// let scheduler = Scheduler::new(dispatcher.clone());
///
/// let request = JobRequest::builder()
///     .for_recipient("a@example.com")
///     .with_subject("Hi")
///     .with_content("<p>Hello</p>")
///     .build()
///     .unwrap();
/// scheduler.start(request).await.unwrap();
///
/// assert_dispatched!(
///     1 dispatch,
///     to: dispatcher,
///     for_recipient: "a@example.com",
///     with_subject: "Hi",
/// );
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct RecordingDispatcher {
    calls: Arc<Mutex<Vec<RecordedDispatch>>>,
    completed: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    latency: Duration,
    latency_for: HashMap<String, Duration>,
}

impl RecordingDispatcher {
    /// A dispatcher that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call until [`RecordingDispatcher::set_failing`] says otherwise.
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    /// Switch failing on or off. Affects all clones.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make every call take `latency` before returning.
    pub fn with_latency(self, latency: Duration) -> Self {
        Self { latency, ..self }
    }

    /// Make calls for `recipient` take `latency`, overriding [`RecordingDispatcher::with_latency`].
    pub fn with_latency_for(mut self, recipient: impl Into<String>, latency: Duration) -> Self {
        self.latency_for.insert(recipient.into(), latency);
        self
    }

    /// Every call made so far, in the order they started.
    pub fn calls(&self) -> Vec<RecordedDispatch> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The calls made for `recipient`.
    pub fn calls_for(&self, recipient: &str) -> Vec<RecordedDispatch> {
        self.calls()
            .into_iter()
            .filter(|call| call.recipient == recipient)
            .collect()
    }

    /// How many calls have returned.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, recipient: &JobKey, payload: &Payload) -> DispatchResult {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedDispatch {
                recipient: recipient.to_string(),
                subject: payload.subject.clone(),
                content: payload.content.clone(),
                at: Instant::now(),
            });

        let latency = self
            .latency_for
            .get(recipient.as_str())
            .copied()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return RecordedFailure(recipient.to_string()).into();
        }
        DispatchResult::Sent
    }
}

/// A macro for making assertions about what a [`RecordingDispatcher`] was asked to deliver.
///
/// Without a count the assertion is that at least one matching call was made. Filters can be
/// given on `for_recipient`, `with_subject` and `with_content`.
#[macro_export]
macro_rules! assert_dispatched {
    (1 dispatch, to: $dispatcher:ident, $($tail:tt)*) => {
        $crate::assert_dispatched!(@internal 1 to: $dispatcher, $($tail)*)
    };
    ($n:literal dispatches, to: $dispatcher:ident, $($tail:tt)*) => {
        $crate::assert_dispatched!(@internal $n to: $dispatcher, $($tail)*)
    };
    (to: $dispatcher:ident, $($tail:tt)*) => {{
        let all = $dispatcher.calls();
        let matching = $crate::assert_dispatched!(@matching all; $($tail)*);
        assert!(
            !matching.is_empty(),
            "Nothing dispatched {}\n\nAll dispatches:\n{all:#?}",
            stringify!($($tail)*)
        );
    }};
    (@internal $n:literal to: $dispatcher:ident, $($tail:tt)*) => {{
        let all = $dispatcher.calls();
        let matching = $crate::assert_dispatched!(@matching all; $($tail)*);
        assert!(
            matching.len() == $n,
            "Unexpected number of dispatches {},\n\n\
            Expected {}, found {} matching:\n\n\
            Matching dispatches:\n\
            {matching:#?}\n\n\
            All dispatches:\n\
            {all:#?}",
            stringify!($($tail)*),
            $n,
            matching.len(),
        );
    }};
    (@matching $all:ident; $($tail:tt)*) => {
        $all
            .iter()
            .filter(|call| {
                let mut matches = true;
                $crate::assert_dispatched!(@filter call matches; $($tail)*);
                matches
            })
            .collect::<Vec<_>>()
    };
    (@filter $call:ident $matches:ident;) => {};
    (@filter $call:ident $matches:ident; for_recipient: $recipient:expr $(, $($tail:tt)*)?) => {
        $matches &= $call.recipient == $recipient;
        $($crate::assert_dispatched!(@filter $call $matches; $($tail)*);)?
    };
    (@filter $call:ident $matches:ident; with_subject: $subject:expr $(, $($tail:tt)*)?) => {
        $matches &= $call.subject == $subject;
        $($crate::assert_dispatched!(@filter $call $matches; $($tail)*);)?
    };
    (@filter $call:ident $matches:ident; with_content: $content:expr $(, $($tail:tt)*)?) => {
        $matches &= $call.content == $content;
        $($crate::assert_dispatched!(@filter $call $matches; $($tail)*);)?
    };
}

pub use assert_dispatched;

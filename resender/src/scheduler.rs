//! Starting, replacing and stopping dispatch chains.
use std::{fmt, sync::Arc};

use chrono::TimeDelta;
use tokio::{sync::oneshot, time::Instant};
use tracing::{instrument, Instrument};

use crate::{
    dispatch::Dispatcher,
    job::{builder::validate_interval, JobKey, JobRequest, StartReport, StopOutcome},
    query::QueryService,
    registry::JobRegistry,
    ResenderError,
};

mod runner;

use runner::ChainRunner;

type Result<T> = std::result::Result<T, ResenderError>;

/// Interval used when a start request does not specify one.
pub const DEFAULT_INTERVAL: TimeDelta = TimeDelta::minutes(1);

/// Owns the job registry and the chains running against it.
///
/// Cloning a scheduler is cheap and yields a handle to the same jobs.
pub struct Scheduler<D: Dispatcher> {
    registry: JobRegistry,
    dispatcher: Arc<D>,
    default_interval: TimeDelta,
    started: Instant,
}

impl<D: Dispatcher> Clone for Scheduler<D> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            default_interval: self.default_interval,
            started: self.started,
        }
    }
}

impl<D: Dispatcher> fmt::Debug for Scheduler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("default_interval", &self.default_interval)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

impl<D> Scheduler<D>
where
    D: Dispatcher,
{
    /// Create a scheduler with an empty registry that dispatches via `dispatcher`.
    pub fn new(dispatcher: D) -> Self {
        Self {
            registry: JobRegistry::new(),
            dispatcher: Arc::new(dispatcher),
            default_interval: DEFAULT_INTERVAL,
            started: Instant::now(),
        }
    }

    /// Use `interval` for start requests that do not carry their own.
    ///
    /// Returns [`ResenderError::InvalidInput`] if `interval` is not positive.
    pub fn with_default_interval(self, interval: TimeDelta) -> Result<Self> {
        Ok(Self {
            default_interval: validate_interval(interval)?,
            ..self
        })
    }

    /// The interval applied when a request does not specify one.
    pub fn default_interval(&self) -> TimeDelta {
        self.default_interval
    }

    /// A read-only view over this scheduler's jobs.
    pub fn query(&self) -> QueryService {
        QueryService::new(self.registry.clone(), self.started)
    }

    /// Start a job, replacing any job already running for the same recipient.
    ///
    /// The previous chain, if any, is cancelled before the new one is installed. One attempt
    /// is made immediately and its outcome is returned in the [`StartReport`]; the chain is
    /// armed whether or not that attempt succeeded.
    #[instrument(skip_all, fields(recipient = %request.key, generation = tracing::field::Empty))]
    pub async fn start(&self, request: JobRequest) -> Result<StartReport> {
        let JobRequest {
            key,
            payload,
            interval,
        } = request;
        let interval = validate_interval(interval.unwrap_or(self.default_interval))?;
        let sleep = interval
            .to_std()
            .map_err(|_| ResenderError::invalid_input("interval", "must be positive"))?;

        let (first_tx, first_rx) = oneshot::channel();
        let (outcome, generation) =
            self.registry
                .install(key.clone(), payload.clone(), interval, |generation, token| {
                    let runner = ChainRunner {
                        registry: self.registry.clone(),
                        dispatcher: Arc::clone(&self.dispatcher),
                        key: key.clone(),
                        generation,
                        interval,
                        sleep,
                        token,
                    };
                    tokio::spawn(runner.run(payload, first_tx).in_current_span())
                })?;
        tracing::Span::current().record("generation", generation.as_u64());
        tracing::info!(?outcome, "Installed {generation} for {key}, repeating every {interval}");

        let first_attempt = first_rx.await.map_err(|_| {
            tracing::error!("Chain for {key} ended before reporting its first attempt");
            ResenderError::FirstAttemptLost
        })?;

        Ok(StartReport {
            outcome,
            generation,
            interval,
            first_attempt,
        })
    }

    /// Stop the job for `key`.
    ///
    /// An attempt already in flight is allowed to finish, but nothing is dispatched for this
    /// job afterwards. A missing job is reported as [`StopOutcome::NotFound`], not an error.
    #[instrument(skip(self), fields(recipient = %key))]
    pub fn stop(&self, key: &JobKey) -> Result<StopOutcome> {
        match self.registry.remove(key)? {
            Some(state) => {
                tracing::info!("Stopped {} for {key}", state.generation);
                Ok(StopOutcome::Stopped)
            }
            None => {
                tracing::debug!("No job to stop for {key}");
                Ok(StopOutcome::NotFound)
            }
        }
    }

    /// Cancel every chain and wait for their tasks to finish.
    ///
    /// Attempts in flight are allowed to complete first.
    pub async fn graceful_shutdown(&self) -> Result<()> {
        tracing::debug!("Shutting down dispatch chains");
        futures::future::join_all(self.registry.drain()?)
            .await
            .into_iter()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|err| {
                tracing::error!(?err, "Failed to join dispatch chain: {err}");
                ResenderError::GracefulShutdownFailed
            })?;
        Ok(())
    }
}

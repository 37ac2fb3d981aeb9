use std::{sync::Arc, time::Duration};

use chrono::{TimeDelta, Utc};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Instrument};

use crate::{
    dispatch::{AttemptFailure, DispatchResult, Dispatcher},
    job::{AttemptRecord, Generation, JobKey, Payload},
    registry::JobRegistry,
};

/// Drives the dispatch chain of one installed generation of a job.
///
/// The chain performs the first attempt straight away and reports it back to the caller of
/// start. After that it sleeps for the interval, re-validates that its generation is still
/// installed, dispatches, and goes back to sleep. Only the sleep is raced against
/// cancellation; an attempt that has begun always runs to completion.
pub(crate) struct ChainRunner<D> {
    pub(crate) registry: JobRegistry,
    pub(crate) dispatcher: Arc<D>,
    pub(crate) key: JobKey,
    pub(crate) generation: Generation,
    pub(crate) interval: TimeDelta,
    pub(crate) sleep: Duration,
    pub(crate) token: CancellationToken,
}

impl<D> ChainRunner<D>
where
    D: Dispatcher,
{
    #[instrument(skip_all, fields(recipient = %self.key, generation = %self.generation))]
    pub(crate) async fn run(
        self,
        payload: Payload,
        first_attempt: oneshot::Sender<Result<(), AttemptFailure>>,
    ) {
        let result = self.attempt(payload).await;
        let _ = first_attempt.send(result);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    break;
                },
                _ = tokio::time::sleep(self.sleep) => {
                    match self.registry.current_payload(&self.key, self.generation) {
                        Ok(Some(payload)) => {
                            let _ = self.attempt(payload).await;
                        }
                        Ok(None) => {
                            tracing::debug!("Generation {} superseded, skipping attempt", self.generation);
                            break;
                        }
                        Err(err) => {
                            tracing::error!(?err, "Failed to read job for {}: {err}", self.key);
                            break;
                        }
                    }
                },
            }
        }
        tracing::debug!("Shutting down dispatch chain for {}", self.key);
    }

    async fn attempt(&self, payload: Payload) -> Result<(), AttemptFailure> {
        let key = &self.key;
        tracing::debug!("Dispatching to {key}");

        let dispatcher = Arc::clone(&self.dispatcher);
        let recipient = key.clone();
        let handle = tokio::spawn(
            async move {
                let fut = dispatcher.dispatch(&recipient, &payload);
                match dispatcher.timeout() {
                    Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| limit),
                    None => Ok(fut.await),
                }
            }
            .in_current_span(),
        );

        let result = match handle.await {
            Ok(Ok(DispatchResult::Sent)) => Ok(()),
            Ok(Ok(DispatchResult::Failed { error })) => Err(AttemptFailure::from(error)),
            Ok(Err(limit)) => Err(AttemptFailure::from(limit)),
            Err(error) => Err(AttemptFailure::from(error)),
        };

        let completed_at = Utc::now();
        let next_scheduled_at = completed_at.checked_add_signed(self.interval);
        match &result {
            Ok(()) => tracing::info!("Dispatched to {key}"),
            Err(failure) => tracing::warn!(
                error_type = %failure.error_type,
                "Dispatch to {key} failed and will be retried in {}: {}",
                self.interval,
                failure.message
            ),
        }

        let record = AttemptRecord {
            completed_at,
            next_scheduled_at,
            failure: result.clone().err(),
        };
        let _ = self
            .registry
            .record_attempt(key, self.generation, record)
            .inspect(|applied| {
                if !applied {
                    tracing::debug!("Job for {key} changed during the attempt, not recording it");
                }
            })
            .inspect_err(|err| {
                tracing::error!(?err, "Failed to record attempt for {key}, error: {err}")
            });

        result
    }
}

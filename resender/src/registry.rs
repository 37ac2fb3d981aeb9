//! In memory storage of active jobs.
//!
//! The registry is the only shared mutable state in the crate. Every operation takes the one
//! lock it holds, so a start, a stop and a timer callback racing on the same key always have a
//! well defined winner.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, RwLock,
};

use chrono::TimeDelta;
use fxhash::FxHashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    job::{
        AttemptRecord, Generation, JobKey, JobSnapshot, JobState, Payload, StartOutcome,
        TimerHandle,
    },
    ResenderError,
};

type Result<T> = std::result::Result<T, ResenderError>;

/// Maps recipients to their active job.
///
/// Cheap to clone; clones share the same storage.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<FxHashMap<JobKey, JobState>>>,
    generations: Arc<AtomicU64>,
}

impl JobRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the job for `key`, if there is one.
    pub fn get(&self, key: &JobKey) -> Result<Option<JobSnapshot>> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .get(key)
            .map(|state| state.snapshot(key)))
    }

    /// Snapshots of every active job, ordered by key.
    ///
    /// All snapshots are taken under a single read of the registry.
    pub fn snapshot(&self) -> Result<Vec<JobSnapshot>> {
        let mut jobs = self
            .jobs
            .read()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .iter()
            .map(|(key, state)| state.snapshot(key))
            .collect::<Vec<_>>();
        jobs.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(jobs)
    }

    /// The number of active jobs.
    pub fn len(&self) -> Result<usize> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .len())
    }

    /// Whether there are no active jobs.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Cancel whatever is installed for `key` and install a new job in its place.
    ///
    /// `arm` is called with the freshly allocated generation and the cancellation token of the
    /// new chain while the registry is locked, so no other operation can observe the key
    /// between the old chain being cancelled and the new one being installed.
    pub(crate) fn install<F>(
        &self,
        key: JobKey,
        payload: Payload,
        interval: TimeDelta,
        arm: F,
    ) -> Result<(StartOutcome, Generation)>
    where
        F: FnOnce(Generation, CancellationToken) -> JoinHandle<()>,
    {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| ResenderError::RegistryUnavailable)?;

        let outcome = match jobs.get(&key) {
            Some(previous) => {
                previous.timer.cancel();
                StartOutcome::Replaced
            }
            None => StartOutcome::Created,
        };

        let generation = Generation::from(self.generations.fetch_add(1, Ordering::SeqCst));
        let token = CancellationToken::new();
        let task = arm(generation, token.clone());
        let state = JobState::new(
            payload,
            interval,
            generation,
            TimerHandle::new(token, task),
        );
        put(&mut jobs, key, state);

        Ok((outcome, generation))
    }

    /// Remove the job for `key`, cancelling its chain.
    pub(crate) fn remove(&self, key: &JobKey) -> Result<Option<JobState>> {
        let removed = self
            .jobs
            .write()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .remove(key);
        if let Some(ref state) = removed {
            state.timer.cancel();
        }
        Ok(removed)
    }

    /// Remove every job, cancelling all chains. Returns the chain tasks.
    pub(crate) fn drain(&self) -> Result<Vec<JoinHandle<()>>> {
        let drained = self
            .jobs
            .write()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .drain()
            .map(|(_, state)| state)
            .collect::<Vec<_>>();
        Ok(drained
            .into_iter()
            .map(|state| {
                state.timer.cancel();
                state.timer.into_task()
            })
            .collect())
    }

    /// Whether `generation` is still the one installed for `key`.
    pub fn is_current(&self, key: &JobKey, generation: Generation) -> Result<bool> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .get(key)
            .is_some_and(|state| state.generation == generation))
    }

    /// The payload to dispatch for `(key, generation)`, or [`None`] if that installation has
    /// been stopped or replaced.
    pub(crate) fn current_payload(
        &self,
        key: &JobKey,
        generation: Generation,
    ) -> Result<Option<Payload>> {
        Ok(self
            .jobs
            .read()
            .map_err(|_| ResenderError::RegistryUnavailable)?
            .get(key)
            .filter(|state| state.generation == generation && !state.timer.is_cancelled())
            .map(|state| state.payload.clone()))
    }

    /// Apply the bookkeeping of a finished attempt. Stale generations are ignored.
    ///
    /// Returns whether the record was applied.
    pub(crate) fn record_attempt(
        &self,
        key: &JobKey,
        generation: Generation,
        record: AttemptRecord,
    ) -> Result<bool> {
        let mut jobs = self
            .jobs
            .write()
            .map_err(|_| ResenderError::RegistryUnavailable)?;
        match jobs.get_mut(key) {
            Some(state) if state.generation == generation => {
                state.record(record);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    #[cfg(test)]
    pub(crate) async fn poison(&self) {
        let jobs = Arc::clone(&self.jobs);
        tokio::task::spawn(async move {
            let _guard = jobs.write();
            panic!()
        })
        .await
        .unwrap_err();
    }
}

// The previous timer for `key`, if any, must already be cancelled.
fn put(jobs: &mut FxHashMap<JobKey, JobState>, key: JobKey, state: JobState) {
    if let Some(previous) = jobs.insert(key, state) {
        debug_assert!(previous.timer.is_cancelled());
    }
}

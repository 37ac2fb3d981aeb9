//! Read-only views over the active jobs.
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tokio::time::Instant;

use crate::{job::JobSnapshot, registry::JobRegistry, ResenderError};

/// Answers questions about the jobs of a [`crate::scheduler::Scheduler`].
///
/// Obtained from [`crate::scheduler::Scheduler::query`]. Never mutates anything.
#[derive(Clone)]
pub struct QueryService {
    registry: JobRegistry,
    started: Instant,
}

/// Liveness information about the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSummary {
    /// Time since the scheduler was created. Serialized as fractional seconds.
    #[serde(serialize_with = "serialize_uptime")]
    pub uptime: Duration,
    /// Number of jobs in the registry.
    pub active_job_count: usize,
    /// When the summary was taken.
    pub timestamp: DateTime<Utc>,
}

fn serialize_uptime<S>(uptime: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(uptime.as_secs_f64())
}

impl QueryService {
    pub(crate) fn new(registry: JobRegistry, started: Instant) -> Self {
        Self { registry, started }
    }

    /// Every active job, ordered by recipient.
    ///
    /// All entries are taken from the same instant; a job is never listed twice.
    pub fn list_active(&self) -> Result<Vec<JobSnapshot>, ResenderError> {
        self.registry.snapshot()
    }

    /// Current uptime and number of active jobs.
    pub fn health(&self) -> Result<HealthSummary, ResenderError> {
        Ok(HealthSummary {
            uptime: self.started.elapsed(),
            active_job_count: self.registry.len()?,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeDelta;

    use super::*;
    use crate::{
        job::{JobKey, Payload},
        ResenderError,
    };
    use assert_matches::assert_matches;

    fn install(registry: &JobRegistry, recipient: &str) {
        registry
            .install(
                JobKey::new(recipient).unwrap(),
                Payload::new("Hi", "body").unwrap(),
                TimeDelta::minutes(1),
                |_, _| tokio::spawn(async {}),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn empty_registry() {
        let query = QueryService::new(JobRegistry::new(), Instant::now());
        assert!(query.list_active().unwrap().is_empty());
        assert_eq!(query.health().unwrap().active_job_count, 0);
    }

    #[tokio::test]
    async fn lists_every_job_once() {
        let registry = JobRegistry::new();
        install(&registry, "b@x.com");
        install(&registry, "a@x.com");
        install(&registry, "b@x.com");
        let query = QueryService::new(registry, Instant::now());

        let jobs = query.list_active().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].key.as_str(), "a@x.com");
        assert_eq!(jobs[1].key.as_str(), "b@x.com");
        assert_eq!(query.health().unwrap().active_job_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_follows_the_clock() {
        let query = QueryService::new(JobRegistry::new(), Instant::now());
        tokio::time::advance(Duration::from_secs(90)).await;

        let health = query.health().unwrap();
        assert_eq!(health.uptime, Duration::from_secs(90));

        let value = serde_json::to_value(&health).unwrap();
        assert_eq!(value["uptime"], 90.0);
        assert_eq!(value["activeJobCount"], 0);
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn unavailable_registry_is_reported() {
        let registry = JobRegistry::new();
        let query = QueryService::new(registry.clone(), Instant::now());

        registry.poison().await;

        assert_matches!(query.list_active(), Err(ResenderError::RegistryUnavailable));
        assert_matches!(query.health(), Err(ResenderError::RegistryUnavailable));
    }
}

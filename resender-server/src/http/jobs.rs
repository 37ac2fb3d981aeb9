use axum::{extract::State, Json};
use resender::{dispatch::Dispatcher, job::JobSnapshot, scheduler::Scheduler};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveJobs {
    pub success: bool,
    /// Recipients only.
    pub active_jobs: Vec<String>,
    pub jobs: Vec<JobSnapshot>,
    pub count: usize,
}

/// GET /api/active-jobs
pub async fn active_jobs<D: Dispatcher>(
    State(scheduler): State<Scheduler<D>>,
) -> Result<Json<ActiveJobs>, ApiError> {
    let jobs = scheduler.query().list_active()?;
    Ok(Json(ActiveJobs {
        success: true,
        active_jobs: jobs.iter().map(|job| job.key.to_string()).collect(),
        count: jobs.len(),
        jobs,
    }))
}

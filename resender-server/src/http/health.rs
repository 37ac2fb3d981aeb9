use axum::{extract::State, Json};
use resender::{dispatch::Dispatcher, query::HealthSummary, scheduler::Scheduler};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    #[serde(flatten)]
    pub summary: HealthSummary,
}

/// GET /health: liveness probe with uptime and job count.
pub async fn health<D: Dispatcher>(
    State(scheduler): State<Scheduler<D>>,
) -> Result<Json<Health>, ApiError> {
    Ok(Json(Health {
        status: "ok",
        summary: scheduler.query().health()?,
    }))
}

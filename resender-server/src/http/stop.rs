use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use resender::{
    dispatch::Dispatcher,
    job::{JobKey, StopOutcome},
    scheduler::Scheduler,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StopEmail {
    pub recipient: Option<String>,
}

/// POST /api/stop-email
pub async fn stop_email<D: Dispatcher>(
    State(scheduler): State<Scheduler<D>>,
    body: Result<Json<StopEmail>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let key = body
        .recipient
        .and_then(|recipient| JobKey::new(recipient).ok())
        .ok_or_else(|| ApiError::BadRequest("Recipient email is required".to_owned()))?;

    match scheduler.stop(&key)? {
        StopOutcome::Stopped => Ok(Json(json!({
            "success": true,
            "message": format!("Email schedule to {key} stopped"),
        }))),
        StopOutcome::NotFound => Err(ApiError::NotFound(
            "No active email schedule found for this recipient".to_owned(),
        )),
    }
}

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use resender::{
    dispatch::{AttemptFailure, Dispatcher},
    job::{JobRequest, JobRequestBuilder, StartOutcome},
    scheduler::Scheduler,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartEmail {
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub content: Option<String>,
    pub interval_minutes: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct StartEmailResponse {
    pub success: bool,
    pub message: String,
    pub outcome: StartOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AttemptFailure>,
}

/// POST /api/start-email
///
/// Responds once the first email has been attempted. A failed first attempt is reported as
/// 502 but the schedule stays active.
pub async fn start_email<D: Dispatcher>(
    State(scheduler): State<Scheduler<D>>,
    body: Result<Json<StartEmail>, JsonRejection>,
) -> Result<(StatusCode, Json<StartEmailResponse>), ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let request = JobRequestBuilder::from(body).build()?;
    let recipient = request.key().clone();

    let report = scheduler.start(request).await?;
    let minutes = report.interval.num_milliseconds() as f64 / 60_000.0;
    let message = format!("Email schedule started. Sending every {minutes} minute(s) to {recipient}");

    Ok(match report.first_attempt {
        Ok(()) => (
            StatusCode::OK,
            Json(StartEmailResponse {
                success: true,
                message,
                outcome: report.outcome,
                error: None,
            }),
        ),
        Err(failure) => (
            StatusCode::BAD_GATEWAY,
            Json(StartEmailResponse {
                success: false,
                message: format!("{message}, but the first email failed to send"),
                outcome: report.outcome,
                error: Some(failure),
            }),
        ),
    })
}

impl From<StartEmail> for JobRequestBuilder {
    fn from(body: StartEmail) -> Self {
        let mut builder = JobRequest::builder();
        if let Some(recipient) = body.recipient {
            builder = builder.for_recipient(recipient);
        }
        if let Some(subject) = body.subject {
            builder = builder.with_subject(subject);
        }
        if let Some(content) = body.content {
            builder = builder.with_content(content);
        }
        if let Some(minutes) = body.interval_minutes {
            builder = builder.every_minutes(minutes);
        }
        builder
    }
}

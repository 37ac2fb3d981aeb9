use axum::{
    routing::{get, post},
    Router,
};
use resender::{dispatch::Dispatcher, scheduler::Scheduler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::http::{health, jobs, start, stop};

/// Assemble the router. Every handler shares `scheduler`.
pub fn build_router<D: Dispatcher>(scheduler: Scheduler<D>) -> Router {
    Router::new()
        .route("/api/start-email", post(start::start_email::<D>))
        .route("/api/stop-email", post(stop::stop_email::<D>))
        .route("/api/active-jobs", get(jobs::active_jobs::<D>))
        .route("/health", get(health::health::<D>))
        .with_state(scheduler)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod test {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use resender::testing::{assert_dispatched, RecordingDispatcher};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;

    fn router() -> (Router, RecordingDispatcher) {
        let dispatcher = RecordingDispatcher::new();
        (build_router(Scheduler::new(dispatcher.clone())), dispatcher)
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn start(router: &Router, body: Value) -> (StatusCode, Value) {
        call(router, Method::POST, "/api/start-email", Some(body)).await
    }

    async fn stop(router: &Router, body: Value) -> (StatusCode, Value) {
        call(router, Method::POST, "/api/stop-email", Some(body)).await
    }

    async fn active_jobs(router: &Router) -> Value {
        let (status, body) = call(router, Method::GET, "/api/active-jobs", None).await;
        assert_eq!(status, StatusCode::OK);
        body
    }

    #[tokio::test]
    async fn start_sends_immediately() {
        let (router, dispatcher) = router();

        let (status, body) = start(
            &router,
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "<p>body</p>" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["outcome"], "created");
        assert_eq!(
            body["message"],
            "Email schedule started. Sending every 1 minute(s) to a@x.com"
        );
        assert!(body.get("error").is_none());
        assert_dispatched!(
            1 dispatch,
            to: dispatcher,
            for_recipient: "a@x.com",
            with_subject: "Hi",
            with_content: "<p>body</p>",
        );
    }

    #[tokio::test]
    async fn start_again_replaces() {
        let (router, dispatcher) = router();
        start(
            &router,
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "body" }),
        )
        .await;

        let (status, body) = start(
            &router,
            json!({
                "recipient": "a@x.com",
                "subject": "New",
                "content": "body",
                "intervalMinutes": 0.5,
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "replaced");
        assert_eq!(
            body["message"],
            "Email schedule started. Sending every 0.5 minute(s) to a@x.com"
        );
        assert_dispatched!(2 dispatches, to: dispatcher, for_recipient: "a@x.com");

        let jobs = active_jobs(&router).await;
        assert_eq!(jobs["count"], 1);
        assert_eq!(jobs["jobs"][0]["subject"], "New");
        assert_eq!(jobs["jobs"][0]["intervalSeconds"], 30.0);
    }

    #[tokio::test]
    async fn start_rejects_invalid_requests() {
        let (router, dispatcher) = router();

        for body in [
            json!({ "subject": "Hi", "content": "body" }),
            json!({ "recipient": "a@x.com", "content": "body" }),
            json!({ "recipient": "a@x.com", "subject": "Hi" }),
            json!({ "recipient": "", "subject": "Hi", "content": "body" }),
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "body", "intervalMinutes": 0 }),
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "body", "intervalMinutes": -2 }),
        ] {
            let (status, response) = start(&router, body.clone()).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(response["success"], false);
            assert!(response["message"].is_string());
        }

        assert!(dispatcher.calls().is_empty());
        assert_eq!(active_jobs(&router).await["count"], 0);
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let (router, _) = router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/start-email")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_first_send_still_schedules() {
        let dispatcher = RecordingDispatcher::new().failing();
        let router = build_router(Scheduler::new(dispatcher.clone()));

        let (status, body) = start(
            &router,
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "body" }),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["outcome"], "created");
        assert_eq!(body["error"]["errorType"], "recorded");

        let jobs = active_jobs(&router).await;
        assert_eq!(jobs["count"], 1);
        assert_eq!(jobs["jobs"][0]["failures"], 1);
        assert_eq!(jobs["jobs"][0]["lastError"]["errorType"], "recorded");
    }

    #[tokio::test]
    async fn stop_email() {
        let (router, _) = router();
        start(
            &router,
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "body" }),
        )
        .await;

        let (status, body) = stop(&router, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Recipient email is required");

        let (status, body) = stop(&router, json!({ "recipient": "b@x.com" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, body) = stop(&router, json!({ "recipient": "a@x.com" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Email schedule to a@x.com stopped");

        let (status, _) = stop(&router, json!({ "recipient": "a@x.com" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(active_jobs(&router).await["count"], 0);
    }

    #[tokio::test]
    async fn list_active_jobs() {
        let (router, _) = router();
        for recipient in ["b@x.com", "a@x.com"] {
            start(
                &router,
                json!({ "recipient": recipient, "subject": "Hi", "content": "body" }),
            )
            .await;
        }

        let body = active_jobs(&router).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 2);
        assert_eq!(body["activeJobs"], json!(["a@x.com", "b@x.com"]));
        assert_eq!(body["jobs"][0]["recipient"], "a@x.com");
        assert_eq!(body["jobs"][0]["attempts"], 1);
        assert!(body["jobs"][0]["nextScheduledAt"].is_string());
    }

    #[tokio::test]
    async fn health_reports_jobs() {
        let (router, _) = router();
        start(
            &router,
            json!({ "recipient": "a@x.com", "subject": "Hi", "content": "body" }),
        )
        .await;

        let (status, body) = call(&router, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["activeJobCount"], 1);
        assert!(body["uptime"].is_number());
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn cors_is_permissive() {
        let (router, _) = router();
        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}

//! HTTP client tests against a mock backend.

mod common;

use serde_json::json;
use tradedash_core::DashError;
use tradedash_refresh::JobAction;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, method, path, query_param},
};

#[tokio::test]
async fn test_get_data_returns_data_field() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/performance"))
        .and(query_param("period", "3m"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "points": [1, 2, 3] }
        })))
        .mount(&server)
        .await;

    let client = common::client(&server.uri());
    let data = client
        .get_data(
            "/api/portfolio/performance",
            &[("period".to_string(), "3m".to_string())],
        )
        .await
        .unwrap();
    assert_eq!(data, json!({ "points": [1, 2, 3] }));
}

#[tokio::test]
async fn test_structured_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/summary"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "db down",
            "traceback": "Traceback (most recent call last): ..."
        })))
        .mount(&server)
        .await;

    let err = common::client(&server.uri())
        .get_data("/api/portfolio/summary", &[])
        .await
        .unwrap_err();

    match &err {
        DashError::Http { status, info } => {
            assert_eq!(*status, 500);
            assert_eq!(info.message, "db down");
            assert!(info.has_details());
        }
        other => panic!("expected Http error, got {other:?}"),
    }
    assert!(err.is_recoverable());
}

#[tokio::test]
async fn test_unparseable_error_body_uses_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let err = common::client(&server.uri())
        .get_data("/api/portfolio/holdings", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DashError::HttpStatus { status: 502 }));
    assert_eq!(err.to_error_info().message, "Request failed with status 502");
}

#[tokio::test]
async fn test_embedded_error_on_success_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": "no positions loaded"
        })))
        .mount(&server)
        .await;

    let err = common::client(&server.uri())
        .get_data("/api/portfolio/holdings", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DashError::Backend { .. }));
    assert_eq!(err.to_error_info().message, "no positions loaded");
}

#[tokio::test]
async fn test_missing_data_field_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rows": [] })))
        .mount(&server)
        .await;

    let err = common::client(&server.uri())
        .get_data("/api/trades", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DashError::MalformedBody { .. }));
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = common::client(&uri).get_status().await.unwrap_err();
    assert!(err.is_transport(), "got {err:?}");
}

#[tokio::test]
async fn test_get_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/scheduler/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "scheduler_running": true,
            "jobs": [
                { "id": "daily_snapshot", "name": "Daily snapshot",
                  "next_run_time": "2026-10-19T06:00:00Z", "trigger": "cron[hour=6]" },
                { "id": "rebalance", "name": "Rebalance", "next_run_time": null }
            ]
        })))
        .mount(&server)
        .await;

    let status = common::client(&server.uri()).get_status().await.unwrap();
    assert!(status.scheduler_running);
    assert_eq!(status.jobs.len(), 2);
    assert!(!status.jobs[0].is_paused());
    assert!(status.jobs[1].is_paused());
}

#[tokio::test]
async fn test_job_action_success_with_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scheduler/jobs/daily_snapshot/run"))
        .and(body_json(json!({ "parameters": { "dry_run": true } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "Job queued"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut parameters = serde_json::Map::new();
    parameters.insert("dry_run".into(), json!(true));

    let response = common::client(&server.uri())
        .job_action("daily_snapshot", JobAction::Run, Some(&parameters))
        .await
        .unwrap();
    assert_eq!(response.message.as_deref(), Some("Job queued"));
}

#[tokio::test]
async fn test_job_action_reported_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/scheduler/jobs/rebalance/pause"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "job is already paused"
        })))
        .mount(&server)
        .await;

    let err = common::client(&server.uri())
        .job_action("rebalance", JobAction::Pause, None)
        .await
        .unwrap_err();
    assert!(matches!(err, DashError::Backend { .. }));
    assert_eq!(err.to_error_info().message, "job is already paused");
}

#[tokio::test]
async fn test_job_action_non_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = common::client(&server.uri())
        .job_action("rebalance", JobAction::Resume, None)
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("unexpected non-JSON response (HTTP 500)"));
}

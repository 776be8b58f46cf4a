use std::sync::atomic::Ordering;

use axum::{body::Body, http::Request, http::StatusCode, Router};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use iv_common::interview::InterviewStatus;
use iv_common::memory::sample_interview;
use iv_common::settings::SystemSettings;
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "test-key";
const ORG: &str = "org_1";

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn admin_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .header("x-org-id", ORG)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header("x-org-id", ORG)
        .body(Body::empty())
        .unwrap()
}

fn public_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn public_get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create(app: &Router, body: Value) -> Value {
    let (status, created) = send(app, admin_post("/api/admin/interviews", body)).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    created
}

#[tokio::test]
async fn full_candidate_flow_is_idempotent_where_it_should_be() {
    let harness = iv_api::test_harness(API_KEY);
    let app = iv_api::create_router(harness.state.clone());

    let created = create(
        &app,
        json!({ "durationSec": 5000, "candidateName": "  山田 太郎 " }),
    )
    .await;
    assert_eq!(created["durationSec"], 1800);
    assert_eq!(created["candidateName"], "山田 太郎");
    let token = created["publicToken"].as_str().unwrap().to_string();
    let interview_id = created["interviewId"].as_str().unwrap().to_string();
    assert_eq!(
        created["url"],
        format!("https://interviews.example/interview/{token}")
    );

    let (status, body) = send(
        &app,
        public_get(&format!("/api/interview/status?publicToken={token}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "created");
    assert!(body.get("blockedReason").is_none());

    let (status, grant) = send(
        &app,
        public_post("/api/interview/join", json!({ "interviewId": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{grant}");
    assert_eq!(grant["serverUrl"], "wss://video.example");
    assert_eq!(grant["interviewId"], interview_id);
    assert!(!grant["token"].as_str().unwrap().is_empty());
    assert_eq!(harness.video.count("dispatch"), 1);

    let (status, body) = send(
        &app,
        public_post("/api/interview/join", json!({ "interviewId": token })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INTERVIEW_ALREADY_USED");

    for text in ["first answer", "rewritten answer"] {
        let (status, body) = send(
            &app,
            public_post(
                "/api/interview/message",
                json!({
                    "publicToken": token,
                    "message": { "text": text, "messageId": "msg-1" }
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageId"], "msg-1");
        assert_eq!(body["created"], text == "first answer");
    }

    let (status, transcript) = send(
        &app,
        admin_get(&format!("/api/admin/interviews/{interview_id}/messages")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = transcript["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "first answer");
    assert_eq!(messages[0]["role"], "candidate");

    for _ in 0..2 {
        let (status, body) = send(
            &app,
            public_post("/api/interview/recording-start", json!({ "publicToken": token })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["status"], "recording");
        assert_eq!(
            body["storageObjectKey"],
            format!("recordings/{ORG}/{interview_id}.mp4")
        );
    }
    assert_eq!(harness.video.count("start_recording"), 1);

    let (status, body) = send(
        &app,
        public_post("/api/interview/end", json!({ "publicToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["teardown"]["completed"], true);

    let (status, body) = send(
        &app,
        public_post("/api/interview/end", json!({ "interviewId": interview_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert!(body["teardown"].is_null());
    assert_eq!(harness.video.count("delete_room"), 1);
}

#[tokio::test]
async fn concurrent_joins_admit_exactly_one_caller() {
    let harness = iv_api::test_harness(API_KEY);
    let app = iv_api::create_router(harness.state.clone());
    let created = create(&app, json!({})).await;
    let token = created["publicToken"].as_str().unwrap().to_string();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let app = app.clone();
        let token = token.clone();
        tasks.spawn(async move {
            send(
                &app,
                public_post("/api/interview/join", json!({ "publicToken": token })),
            )
            .await
            .0
        });
    }

    let mut statuses = Vec::new();
    while let Some(result) = tasks.join_next().await {
        statuses.push(result.unwrap());
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::CONFLICT)
            .count(),
        7
    );
    assert_eq!(harness.video.count("dispatch"), 1);
}

#[tokio::test]
async fn expired_link_is_gone_even_when_quota_is_exhausted() {
    let harness = iv_api::test_harness(API_KEY);
    harness.store.set_system_settings(SystemSettings {
        max_concurrent_interviews: Some(1),
        ..Default::default()
    });
    harness.store.seed_interview("other_org", InterviewStatus::Recording);

    let mut interview = sample_interview(ORG, InterviewStatus::Created);
    interview.expires_at = Utc::now() - Duration::minutes(1);
    let interview = harness.store.insert_raw(interview);
    let app = iv_api::create_router(harness.state.clone());

    let (status, body) = send(
        &app,
        public_get(&format!(
            "/api/interview/status?publicToken={}",
            interview.public_token
        )),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"], "INTERVIEW_EXPIRED");

    let (status, _) = send(
        &app,
        public_post(
            "/api/interview/join",
            json!({ "interviewId": interview.id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
}

#[tokio::test]
async fn status_reports_concurrency_limit_without_blocking_join() {
    let harness = iv_api::test_harness(API_KEY);
    harness.store.set_system_settings(SystemSettings {
        max_concurrent_interviews: Some(5),
        ..Default::default()
    });
    for _ in 0..5 {
        harness.store.seed_interview("other_org", InterviewStatus::Used);
    }
    let app = iv_api::create_router(harness.state.clone());
    let created = create(&app, json!({})).await;
    let token = created["publicToken"].as_str().unwrap();

    let (status, body) = send(
        &app,
        public_get(&format!("/api/interview/status?publicToken={token}")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["blockedReason"], "CONCURRENCY_LIMIT");
    assert_eq!(body["blockedScope"], "global");

    let (status, _) = send(
        &app,
        public_post("/api/interview/join", json!({ "publicToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn dispatch_failure_marks_interview_failed() {
    let harness = iv_api::test_harness(API_KEY);
    harness.video.fail_dispatch.store(true, Ordering::SeqCst);
    let app = iv_api::create_router(harness.state.clone());
    let created = create(&app, json!({})).await;
    let token = created["publicToken"].as_str().unwrap();
    let interview_id = created["interviewId"].as_str().unwrap();

    let (status, body) = send(
        &app,
        public_post("/api/interview/join", json!({ "publicToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "AGENT_DISPATCH_FAILED");

    let stored = harness.store.snapshot(interview_id).unwrap();
    assert_eq!(stored.status, InterviewStatus::Failed);
    assert_eq!(stored.failure_reason.as_deref(), Some("AGENT_DISPATCH_FAILED"));

    let (status, body) = send(
        &app,
        public_post("/api/interview/end", json!({ "publicToken": token })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "INTERVIEW_FAILED");
}

#[tokio::test]
async fn candidate_routes_validate_lookup_keys() {
    let app = iv_api::create_router(iv_api::test_state(API_KEY));

    let (status, body) = send(&app, public_get("/api/interview/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "PUBLIC_TOKEN_REQUIRED");

    let long = "a".repeat(129);
    let (status, body) = send(
        &app,
        public_get(&format!("/api/interview/status?publicToken={long}")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "PUBLIC_TOKEN_TOO_LONG");

    let (status, body) = send(&app, public_post("/api/interview/end", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INTERVIEW_ID_REQUIRED");

    let (status, body) = send(
        &app,
        public_post("/api/interview/join", json!({ "publicToken": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "INTERVIEW_NOT_FOUND");

    let (status, body) = send(
        &app,
        public_post(
            "/api/interview/recording-start",
            json!({ "publicToken": "missing" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "INTERVIEW_NOT_FOUND");
}

#[tokio::test]
async fn message_ingest_rejects_bad_input() {
    let harness = iv_api::test_harness(API_KEY);
    let interview = harness.store.seed_interview(ORG, InterviewStatus::Recording);
    let app = iv_api::create_router(harness.state.clone());

    let (status, body) = send(
        &app,
        public_post(
            "/api/interview/message",
            json!({ "publicToken": interview.public_token, "message": { "text": "   " } }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "TEXT_REQUIRED");

    let (status, body) = send(
        &app,
        public_post(
            "/api/interview/message",
            json!({
                "publicToken": interview.public_token,
                "message": { "text": "hello", "role": "observer" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "ROLE_INVALID");

    let (status, body) = send(
        &app,
        public_post(
            "/api/interview/message",
            json!({
                "interviewId": interview.id,
                "message": { "text": "ようこそ", "role": "interviewer" }
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["created"], true);
    assert!(body["offsetMs"].as_i64().unwrap() >= 0);
}

use std::time::Duration;

use axum::http::StatusCode;
use http_body_util::BodyExt;
use lucida_core::config::RelayConfig;
use mockito::Matcher;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn router(backend_url: &str) -> axum::Router {
    let state = lucida_relay::build_state(&RelayConfig::default(), backend_url).unwrap();
    lucida_relay::build_router(state)
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn activity(service_url: &str, text: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "message",
        "id": "act-1",
        "serviceUrl": service_url,
        "channelId": "emulator",
        "from": { "id": "user-1", "name": "Ada" },
        "recipient": { "id": "bot-1", "name": "lucida" },
        "conversation": { "id": "conv-1" },
        "text": text
    })
}

async fn wait_for(mock: &mockito::Mock) {
    for _ in 0..100 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("mock was never matched");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_reports_ok() {
    let (status, json) = send(router("http://127.0.0.1:9"), "GET", "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["addresses"], 0);
}

#[tokio::test]
async fn message_is_relayed_and_answered_through_channel() {
    let mut server = mockito::Server::new_async().await;
    let infer = server
        .mock("POST", "/infer")
        .match_body(Matcher::UrlEncoded(
            "speech_input".into(),
            "how tall is everest".into(),
        ))
        .with_status(200)
        .with_body(r#"{"result":"8849 metres"}"#)
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/v3/conversations/conv-1/activities/act-1")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "type": "message",
            "text": "8849 metres",
            "replyToId": "act-1",
            "recipient": { "id": "user-1" }
        })))
        .with_status(200)
        .create_async()
        .await;

    let app = router(&server.url());
    let (status, json) = send(
        app,
        "POST",
        "/api/messages",
        Some(activity(&server.url(), "how tall is everest")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "accepted");

    wait_for(&reply).await;
    infer.assert_async().await;
}

#[tokio::test]
async fn verify_flow_posts_token_once() {
    let mut server = mockito::Server::new_async().await;
    let _infer = server
        .mock("POST", "/infer")
        .with_status(403)
        .create_async()
        .await;
    let add_interface = server
        .mock("POST", "/add_interface")
        .match_body(Matcher::UrlEncoded("token".into(), "abc123".into()))
        .with_status(200)
        .with_body("emulator linked")
        .expect(1)
        .create_async()
        .await;
    let reply = server
        .mock("POST", "/v3/conversations/conv-1/activities/act-1")
        .match_body(Matcher::PartialJson(
            serde_json::json!({ "text": "emulator linked" }),
        ))
        .with_status(200)
        .create_async()
        .await;

    let app = router(&server.url());
    let (status, _) = send(
        app,
        "POST",
        "/api/messages",
        Some(activity(&server.url(), "Verify abc123")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    wait_for(&reply).await;
    add_interface.assert_async().await;
}

#[tokio::test]
async fn non_message_activity_is_ignored() {
    let mut body = activity("http://127.0.0.1:9", "");
    body["type"] = "typing".into();
    let (status, json) = send(router("http://127.0.0.1:9"), "POST", "/api/messages", Some(body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ignored");
}

#[tokio::test]
async fn message_without_service_url_is_rejected() {
    let mut body = activity("http://127.0.0.1:9", "hi");
    body.as_object_mut().unwrap().remove("serviceUrl");
    let (status, json) = send(router("http://127.0.0.1:9"), "POST", "/api/messages", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("serviceUrl"));
}

#[tokio::test]
async fn query_reply_is_parked_until_polled_once() {
    let mut server = mockito::Server::new_async().await;
    let _infer = server
        .mock("POST", "/infer")
        .match_body(Matcher::UrlEncoded("interface".into(), "web".into()))
        .with_status(200)
        .with_body(r#"{"result":"pong"}"#)
        .create_async()
        .await;

    let app = router(&server.url());
    let (status, json) = send(
        app.clone(),
        "POST",
        "/api/query",
        Some(serde_json::json!({ "request_id": "req-7", "user": "ada", "text": "ping" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["request_id"], "req-7");

    let mut polled = None;
    for _ in 0..100 {
        let (status, json) = send(app.clone(), "GET", "/api/query/req-7", None).await;
        if status == StatusCode::OK {
            polled = Some(json);
            break;
        }
        assert_eq!(status, StatusCode::NOT_FOUND);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let json = polled.expect("reply never became available");
    assert_eq!(json["reply"], "pong");

    let (status, _) = send(app, "GET", "/api/query/req-7", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unreachable_backend_reply_carries_error_code() {
    let mut server = mockito::Server::new_async().await;
    let reply = server
        .mock("POST", "/v3/conversations/conv-1/activities/act-1")
        .match_body(Matcher::Regex("ECONNREFUSED".into()))
        .with_status(200)
        .create_async()
        .await;

    let app = router("http://127.0.0.1:9");
    let (status, _) = send(
        app,
        "POST",
        "/api/messages",
        Some(activity(&server.url(), "hello")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for(&reply).await;
}

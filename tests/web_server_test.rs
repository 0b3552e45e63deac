mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use common::controller;
use counterpoint::web_server::{build_router, AppState};
use serde_json::{json, Value};

fn server(replies: Vec<Result<&str, &str>>) -> (TestServer, AppState) {
    let (controller, _) = controller(replies);
    let state = AppState::new(Arc::new(controller));
    let server = TestServer::new(build_router(state.clone())).unwrap();
    (server, state)
}

fn remote_work() -> Value {
    json!({
        "topic": "Remote work is better than office work",
        "viewpoint": "Remote work offers better work-life balance"
    })
}

#[tokio::test]
async fn test_api_session_lifecycle() {
    let (server, state) = server(vec![
        Ok("Office work fosters collaboration."),
        Ok("Spontaneous hallway conversations can't be replicated virtually."),
    ]);
    let mut events = state.subscribe();

    let empty: Value = server.get("/api/session").await.json();
    assert_eq!(empty["session"], Value::Null);
    assert_eq!(empty["generating"], false);

    let started = server.post("/api/session").json(&remote_work()).await;
    started.assert_status_ok();
    let body: Value = started.json();
    assert_eq!(body["session"]["messages"][0]["role"], "ai");
    assert_eq!(body["notices"][0]["text"], "Exploration started!");
    assert_eq!(events.recv().await.unwrap().message_type, "SessionUpdated");

    let replied = server
        .post("/api/session/messages")
        .json(&json!({ "message": "But video calls work fine for collaboration" }))
        .await;
    replied.assert_status_ok();
    let body: Value = replied.json();
    let roles: Vec<&str> = body["session"]["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["ai", "user", "ai"]);

    server.post("/api/session/reset/confirm").await.assert_status(StatusCode::CONFLICT);
    let pending: Value = server.post("/api/session/reset").await.json();
    assert_eq!(pending["resetPending"], true);
    let confirmed = server.post("/api/session/reset/confirm").await;
    confirmed.assert_status_ok();
    assert_eq!(confirmed.json::<Value>()["notice"]["text"], "Ready for a new exploration!");

    let after: Value = server.get("/api/session").await.json();
    assert_eq!(after["session"], Value::Null);
}

#[tokio::test]
async fn test_api_error_statuses() {
    let (server, _) = server(vec![Err("offline"), Ok("Opening."), Err("offline")]);

    let blank = server
        .post("/api/session")
        .json(&json!({ "topic": "  ", "viewpoint": "x" }))
        .await;
    blank.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        blank.json::<Value>()["error"],
        "Please enter both a topic and your viewpoint"
    );

    server
        .post("/api/session/messages")
        .json(&json!({ "message": "hi" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let failed = server.post("/api/session").json(&remote_work()).await;
    failed.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(
        failed.json::<Value>()["error"],
        "Failed to start exploration. Please try again."
    );

    server.post("/api/session").json(&remote_work()).await.assert_status_ok();
    let failed_reply = server
        .post("/api/session/messages")
        .json(&json!({ "message": "A point" }))
        .await;
    failed_reply.assert_status(StatusCode::BAD_GATEWAY);

    let snapshot: Value = server.get("/api/session").await.json();
    let messages = snapshot["session"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(snapshot["session"]["unanswered"], messages[1]["id"]);
}

#[tokio::test]
async fn test_form_flow_renders_page() {
    let (server, _) = server(vec![Err("offline"), Ok("Office work fosters collaboration.")]);

    let page = server.get("/").await;
    page.assert_status_ok();
    assert!(page.text().contains("Perspective Explorer"));

    let form = vec![
        ("topic", "Remote work is better"),
        ("viewpoint", "Balance matters"),
        ("reference_url", ""),
    ];
    server.post("/explore").form(&form).await.assert_status(StatusCode::SEE_OTHER);
    let page = server.get("/").await;
    assert!(page.text().contains("Failed to start exploration. Please try again."));
    // drafts survive the failure
    assert!(page.text().contains("Remote work is better</textarea>"));

    server.post("/explore").form(&form).await.assert_status(StatusCode::SEE_OTHER);
    let page = server.get("/").await;
    assert!(page.text().contains("Exploration started!"));
    assert!(page.text().contains("Office work fosters collaboration."));
    assert!(page.text().contains("Your view: Balance matters"));

    // notices are shown once
    let again = server.get("/").await.text();
    assert!(!again.contains("Exploration started!"));

    server.post("/reset").await.assert_status(StatusCode::SEE_OTHER);
    assert!(server.get("/").await.text().contains("Explore a new topic?"));
    server.post("/reset/cancel").await;
    assert!(!server.get("/").await.text().contains("Explore a new topic?"));

    server.post("/reset").await;
    server.post("/reset/confirm").await.assert_status(StatusCode::SEE_OTHER);
    let page = server.get("/").await;
    assert!(page.text().contains("Ready for a new exploration!"));
    assert!(page.text().contains("Start Exploring"));
}

#[tokio::test]
async fn test_failed_reply_is_marked_in_page() {
    let (server, _) = server(vec![Ok("Opening."), Err("offline")]);
    server.post("/api/session").json(&remote_work()).await.assert_status_ok();

    server
        .post("/message")
        .form(&vec![("message", "Unanswered point")])
        .await
        .assert_status(StatusCode::SEE_OTHER);

    let page = server.get("/").await;
    assert!(page.text().contains("Unanswered point"));
    assert!(page.text().contains("No reply yet."));
    assert!(page.text().contains("Failed to generate response. Please try again."));
}

#[tokio::test]
async fn test_missing_static_file_is_404() {
    let (server, _) = server(vec![]);
    server.get("/static/nope.js").await.assert_status(StatusCode::NOT_FOUND);
    server.get("/static/style.css").await.assert_status_ok();
}

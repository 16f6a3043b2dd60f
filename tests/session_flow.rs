//! End-to-end session flows over the HTTP surface.

mod common;

use serde_json::{json, Value};

use common::{open_stream, post_message, spawn_gateway};

#[tokio::test]
async fn health_lists_registered_backends() {
    let gateway = spawn_gateway().await;

    let body: Value = gateway
        .client
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], json!("ok"));
    assert_eq!(body["backends"], json!(["echo", "sql"]));
}

#[tokio::test]
async fn echo_round_trip_over_sse() {
    let gateway = spawn_gateway().await;
    let token = gateway.issue_token("user-1").await;

    let mut stream = open_stream(&gateway, &token, "echo", "user-1-session").await;

    let status = post_message(
        &gateway,
        &token,
        "echo",
        "user-1-session",
        &json!({"hello": "world"}),
    )
    .await;
    assert_eq!(status, reqwest::StatusCode::ACCEPTED);

    let (event, data) = stream.next_event().await.unwrap();
    assert_eq!(event, "message");
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["success"], json!(true));
    assert_eq!(reply["subject"], json!("user-1"));
    assert_eq!(reply["echo"]["hello"], json!("world"));
}

#[tokio::test]
async fn messages_arrive_in_submission_order() {
    let gateway = spawn_gateway().await;
    let token = gateway.issue_token("user-1").await;

    let mut stream = open_stream(&gateway, &token, "echo", "ordered").await;

    for name in ["A", "B", "C"] {
        let status =
            post_message(&gateway, &token, "echo", "ordered", &json!({"name": name})).await;
        assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    }

    for (expected_seq, expected_name) in ["A", "B", "C"].iter().enumerate() {
        let (_, data) = stream.next_event().await.unwrap();
        let reply: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(reply["seq"], json!(expected_seq));
        assert_eq!(reply["echo"]["name"], json!(expected_name));
    }
}

#[tokio::test]
async fn concurrent_sessions_do_not_interleave() {
    let gateway = spawn_gateway().await;
    let token = gateway.issue_token("user-1").await;

    let mut first = open_stream(&gateway, &token, "echo", "first").await;
    let mut second = open_stream(&gateway, &token, "echo", "second").await;

    for n in 0..3 {
        post_message(&gateway, &token, "echo", "first", &json!({"s": "first", "n": n})).await;
        post_message(&gateway, &token, "echo", "second", &json!({"s": "second", "n": n})).await;
    }

    for n in 0..3 {
        let (_, data) = first.next_event().await.unwrap();
        let reply: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(reply["echo"]["s"], json!("first"));
        assert_eq!(reply["echo"]["n"], json!(n));
    }
    for n in 0..3 {
        let (_, data) = second.next_event().await.unwrap();
        let reply: Value = serde_json::from_str(&data).unwrap();
        assert_eq!(reply["echo"]["s"], json!("second"));
        assert_eq!(reply["echo"]["n"], json!(n));
    }
}

#[tokio::test]
async fn sql_backend_answers_queries_with_structured_results() {
    let gateway = spawn_gateway().await;
    let token = gateway.issue_token("analyst").await;

    // Session key carries the connection identifier as its suffix.
    let mut stream = open_stream(&gateway, &token, "sql", "analyst:db1").await;

    post_message(
        &gateway,
        &token,
        "sql",
        "analyst:db1",
        &json!({"method": "query", "params": {"sql": "select * from users"}}),
    )
    .await;

    let (_, data) = stream.next_event().await.unwrap();
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["success"], json!(true));
    assert_eq!(reply["data"][0]["name"], json!("alice"));

    // A failing query comes back as a structured failure on the same
    // still-open stream.
    post_message(
        &gateway,
        &token,
        "sql",
        "analyst:db1",
        &json!({"method": "query", "params": {"sql": "select syntax error"}}),
    )
    .await;

    let (_, data) = stream.next_event().await.unwrap();
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["success"], json!(false));

    post_message(
        &gateway,
        &token,
        "sql",
        "analyst:db1",
        &json!({"method": "ping"}),
    )
    .await;
    let (_, data) = stream.next_event().await.unwrap();
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["message"], json!("pong"));
}

#[tokio::test]
async fn unknown_connection_identifier_is_a_session_level_failure() {
    let gateway = spawn_gateway().await;
    let token = gateway.issue_token("analyst").await;

    let mut stream = open_stream(&gateway, &token, "sql", "analyst:missing-db").await;

    post_message(
        &gateway,
        &token,
        "sql",
        "analyst:missing-db",
        &json!({"method": "query", "params": {"sql": "select 1"}}),
    )
    .await;

    let (_, data) = stream.next_event().await.unwrap();
    let reply: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(reply["success"], json!(false));
    assert!(reply["error"]
        .as_str()
        .unwrap()
        .contains("unknown connection identifier"));

    // The session survived the failure.
    assert!(gateway.sessions.contains(&toolgate::session::SessionKey::new(
        "sql",
        "analyst:missing-db",
    )));
}

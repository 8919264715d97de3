mod common;

use common::{
    completed_checkout_event, stripe_signature, stripe_signature_at, TestApp, TestSetup,
    WEBHOOK_SECRET,
};

#[tokio::test]
async fn completed_checkout_grants_credits() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", Some("u1"));

    let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    assert_eq!(response.status().as_u16(), 200);
    let account = app.accounts.snapshot("u1").expect("account created");
    assert_eq!(account.credits, 100);
    assert_eq!(account.credited_sessions, vec!["cs_1".to_string()]);
}

#[tokio::test]
async fn duplicate_delivery_credits_once() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", Some("u1"));

    for _ in 0..2 {
        let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;
        assert_eq!(response.status().as_u16(), 200);
    }

    assert_eq!(app.accounts.snapshot("u1").expect("account").credits, 100);
}

#[tokio::test]
async fn separate_sessions_accumulate_credits() {
    let app = TestApp::spawn().await;

    for session_id in ["cs_1", "cs_2"] {
        let body = completed_checkout_event(session_id, Some("u1"));
        let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;
        assert_eq!(response.status().as_u16(), 200);
    }

    assert_eq!(app.accounts.snapshot("u1").expect("account").credits, 200);
}

#[tokio::test]
async fn credits_preserve_existing_answers() {
    let app = TestApp::spawn().await;
    app.call(
        "generate-completion",
        Some(&common::id_token("u1")),
        serde_json::json!({ "userPrompt": "hello" }),
    )
    .await;

    let body = completed_checkout_event("cs_1", Some("u1"));
    app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    let account = app.accounts.snapshot("u1").expect("account");
    assert_eq!(account.credits, 100);
    assert_eq!(account.answers.len(), 1);
}

#[tokio::test]
async fn wrong_signature_is_rejected() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", Some("u1"));
    let signature = stripe_signature_at(&body, chrono::Utc::now().timestamp(), "whsec_other");

    let response = app.post_webhook(&body, Some(&signature)).await;

    assert_eq!(response.status().as_u16(), 400);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let app = TestApp::spawn().await;
    let signed = completed_checkout_event("cs_1", Some("u1"));
    let tampered = completed_checkout_event("cs_1", Some("attacker"));

    let response = app
        .post_webhook(&tampered, Some(&stripe_signature(&signed)))
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn missing_signature_header_is_rejected() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", Some("u1"));

    let response = app.post_webhook(&body, None).await;

    assert_eq!(response.status().as_u16(), 400);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn stale_signature_is_rejected() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", Some("u1"));
    let old = chrono::Utc::now().timestamp() - 3600;

    let response = app
        .post_webhook(&body, Some(&stripe_signature_at(&body, old, WEBHOOK_SECRET)))
        .await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn signed_malformed_body_is_rejected() {
    let app = TestApp::spawn().await;
    let body = "{\"type\": ";

    let response = app.post_webhook(body, Some(&stripe_signature(body))).await;

    assert_eq!(response.status().as_u16(), 400);
    let error: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert!(error["error"].as_str().is_some());
}

#[tokio::test]
async fn other_event_types_are_acknowledged_without_writes() {
    let app = TestApp::spawn().await;
    let body = serde_json::json!({
        "id": "evt_1",
        "type": "invoice.paid",
        "data": { "object": { "id": "in_1", "metadata": { "uid": "u1" } } }
    })
    .to_string();

    let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn session_without_uid_is_acknowledged_without_writes() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", None);

    let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn unconfigured_webhook_secret_is_a_server_error() {
    let app = TestApp::spawn_with(TestSetup {
        webhook_secret: None,
        ..Default::default()
    })
    .await;
    let body = completed_checkout_event("cs_1", Some("u1"));

    let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    assert_eq!(response.status().as_u16(), 500);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn unpaid_completed_session_is_acknowledged_without_credits() {
    let app = TestApp::spawn().await;
    let mut event: serde_json::Value =
        serde_json::from_str(&completed_checkout_event("cs_1", Some("u1"))).unwrap();
    event["data"]["object"]["payment_status"] = serde_json::json!("unpaid");
    let body = event.to_string();

    let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn null_metadata_is_acknowledged_without_writes() {
    let app = TestApp::spawn().await;
    let mut event: serde_json::Value =
        serde_json::from_str(&completed_checkout_event("cs_1", None)).unwrap();
    event["data"]["object"]["metadata"] = serde_json::Value::Null;
    let body = event.to_string();

    let response = app.post_webhook(&body, Some(&stripe_signature(&body))).await;

    assert_eq!(response.status().as_u16(), 200);
    assert!(app.accounts.is_empty());
}

#[tokio::test]
async fn extreme_signature_timestamp_is_rejected() {
    let app = TestApp::spawn().await;
    let body = completed_checkout_event("cs_1", Some("u1"));

    let response = app
        .post_webhook(&body, Some("t=-9223372036854775808,v1=aa"))
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert!(app.accounts.is_empty());
}

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::MockServer;
use notifybox::dispatch::{
    DispatchExecutor, DispatchOptions, DispatchSet, RetryPolicy, TagExpression,
};
use notifybox::handlers::{
    ErrorKind, HandlerInstance, HandlerOverrides, HandlerRegistry, NotifyFormat, NotifyRequest,
};

fn instance(url: &str) -> HandlerInstance {
    Arc::new(HandlerRegistry::with_builtins().unwrap())
        .instantiate(url, &HandlerOverrides::default())
        .unwrap()
}

#[tokio::test]
async fn test_mattermost_posts_to_webhook() {
    let server = MockServer::start().await;
    let instance = instance(&format!("mmost://{}/abc123", server.authority()));

    let request = NotifyRequest::builder()
        .title("nightly")
        .body("backup finished")
        .build();
    let outcome = instance.notify(&request).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::POST);
    assert_eq!(requests[0].path(), "/hooks/abc123");

    let payload = requests[0].json();
    let text = payload["text"].as_str().unwrap();
    assert!(text.starts_with("nightly"), "{text}");
    assert!(text.ends_with("backup finished"), "{text}");
    assert_eq!(payload["username"], "Notifybox");
    assert!(payload["icon_url"].is_null());
    assert!(payload.get("channel").is_none());
}

#[tokio::test]
async fn test_mattermost_one_post_per_channel() {
    let server = MockServer::start().await;
    let instance = instance(&format!(
        "mmost://bot@{}/team/abc123?channels=ops,dev",
        server.authority()
    ));

    let request = NotifyRequest::builder().body("hello").build();
    let outcome = instance.notify(&request).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.messages, 1);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    let channels: BTreeSet<String> = requests
        .iter()
        .map(|r| {
            assert_eq!(r.path(), "/team/hooks/abc123");
            assert_eq!(r.json()["username"], "bot");
            r.json()["channel"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        channels,
        BTreeSet::from(["ops".to_string(), "dev".to_string()])
    );
}

#[tokio::test]
async fn test_mattermost_long_body_truncated() {
    let server = MockServer::start().await;
    let instance = instance(&format!("mmost://{}/abc123", server.authority()));

    let request = NotifyRequest::builder()
        .title("report")
        .body("x".repeat(5000))
        .build();
    let outcome = instance.notify(&request).await;
    assert!(outcome.success, "{:?}", outcome.error);

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let text = requests[0].json()["text"].as_str().unwrap().to_string();
    assert!(text.len() <= 4000, "{}", text.len());
    assert!(text.starts_with("report"));
    assert!(text.ends_with("..."));
}

#[tokio::test]
async fn test_mattermost_failure_reported() {
    let server = MockServer::start().await;
    server.respond_with(StatusCode::FORBIDDEN);
    let instance = instance(&format!(
        "mmost://{}/abc123?channels=ops,dev",
        server.authority()
    ));

    let request = NotifyRequest::builder().body("hello").build();
    let outcome = instance.notify(&request).await;
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Auth));
    assert!(!outcome.target.contains("abc123"));
    // every channel is still tried
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_mattermost_retry_only_posts_failed_channel() {
    let server = MockServer::start().await;
    server.respond_once_with(StatusCode::SERVICE_UNAVAILABLE);

    let options = DispatchOptions {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            multiplier: 2.0,
        },
        ..Default::default()
    };
    let mut set = DispatchSet::new(Arc::new(HandlerRegistry::with_builtins().unwrap()))
        .with_executor(DispatchExecutor::new(options));
    set.add(
        &format!("mmost://{}/abc123?channels=ops,dev", server.authority()),
        Vec::<String>::new(),
    )
    .unwrap();

    let report = set
        .notify(&NotifyRequest::builder().body("hello").build(), &TagExpression::any())
        .await;
    let outcome = &report.outcomes()[0];
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.attempts, 2);

    let channels: Vec<String> = server
        .requests()
        .iter()
        .map(|r| r.json()["channel"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(channels, vec!["ops", "dev", "ops"]);
}

#[tokio::test]
async fn test_mattermost_degrades_settings_format() {
    let server = MockServer::start().await;
    let overrides = HandlerOverrides {
        format: Some(NotifyFormat::Html),
        ..Default::default()
    };
    let instance = Arc::new(HandlerRegistry::with_builtins().unwrap())
        .instantiate(&format!("mmost://{}/abc123", server.authority()), &overrides)
        .unwrap();
    assert_eq!(instance.options().format, Some(NotifyFormat::Text));

    let request = NotifyRequest::builder()
        .body("<b>done</b>")
        .format(NotifyFormat::Html)
        .build();
    let outcome = instance.notify(&request).await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(server.requests()[0].json()["text"], "done");
}

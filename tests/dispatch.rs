mod common;

use std::fs;
use std::sync::Arc;

use axum::http::StatusCode;
use common::MockServer;
use notifybox::config::Settings;
use notifybox::dispatch::{DispatchExecutor, DispatchSet, SkipReason, TagExpression};
use notifybox::handlers::{self, HandlerRegistry, NotifyRequest, RegistryError};
use tempfile::TempDir;

fn request() -> NotifyRequest {
    NotifyRequest::builder().title("deploy").body("v2 is live").build()
}

#[tokio::test]
async fn test_tagged_fan_out() {
    let ops = MockServer::start().await;
    let dev = MockServer::start().await;
    let broken = MockServer::start().await;
    broken.respond_with(StatusCode::BAD_REQUEST);

    let mut set = DispatchSet::new(Arc::new(HandlerRegistry::with_builtins().unwrap()));
    let content = format!(
        "# team hooks\nops = json://{}/ops\ndev = json://{}/dev\nops, db = json://{}/db\n",
        ops.authority(),
        dev.authority(),
        broken.authority()
    );
    let loaded = set.load_text(&content);
    assert!(loaded.is_ok());
    assert_eq!(set.len(), 3);

    let report = set.notify(&request(), &"ops".parse().unwrap()).await;
    let outcomes = report.outcomes();
    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].success);
    assert_eq!(outcomes[1].skip_reason, Some(SkipReason::TagMismatch));
    assert!(outcomes[2].is_failure());
    assert_eq!(report.attempted(), 2);
    assert_eq!(report.summary(), "1 of 2 failed");

    assert_eq!(ops.requests().len(), 1);
    assert!(dev.requests().is_empty());
    assert_eq!(broken.requests().len(), 1);

    let json = serde_json::to_value(outcomes).unwrap();
    assert_eq!(json[1]["skip_reason"], "tag_mismatch");
    assert_eq!(json[2]["error_kind"], "invalid_payload");
}

#[tokio::test]
async fn test_dry_run_sends_nothing() {
    let server = MockServer::start().await;
    let mut options = Settings::default().dispatch_options();
    options.dry_run = true;

    let mut set = DispatchSet::new(Arc::new(HandlerRegistry::with_builtins().unwrap()))
        .with_executor(DispatchExecutor::new(options));
    set.add(&format!("json://{}/", server.authority()), ["ops"])
        .unwrap();

    let report = set.notify(&request(), &TagExpression::any()).await;
    assert!(report.success());
    assert_eq!(
        report.outcomes()[0].skip_reason,
        Some(SkipReason::DryRun)
    );
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_settings_driven_dispatch() {
    let server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("notifybox.toml");
    let toml_content = format!(
        r#"
urls = ["alerts=json://{}/alerts?:source=settings"]

[dispatch]
concurrency = 0

[retry]
max_attempts = 1

[http]
user_agent = "settings-test"

[app]
id = "Deployer"
        "#,
        server.authority()
    );
    fs::write(&config_path, toml_content).unwrap();

    let settings = Settings::load_from_path(config_path).unwrap();
    let mut set = DispatchSet::new(Arc::new(HandlerRegistry::with_builtins().unwrap()))
        .with_overrides(settings.handler_overrides())
        .with_executor(DispatchExecutor::new(settings.dispatch_options()));
    for entry in settings.url_entries() {
        set.add(&entry.url, entry.tags).unwrap();
    }

    let report = set.notify(&request(), &"alerts".parse().unwrap()).await;
    assert!(report.success(), "{report}");

    let captured = &server.requests()[0];
    assert_eq!(captured.header("user-agent"), Some("settings-test"));
    assert_eq!(captured.json()["source"], "settings");
}

#[test]
fn test_global_registry_installs_once() {
    let registry = handlers::install_builtins().unwrap();
    assert!(registry.lookup("json").is_ok());
    assert!(Arc::ptr_eq(&registry, &handlers::global().unwrap()));

    assert!(matches!(
        handlers::install(HandlerRegistry::new()),
        Err(RegistryError::AlreadyInstalled)
    ));
}

#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! へ移行

mod common;

use assert_cmd::Command;
use common::TestServer;
use predicates::prelude::*;

/// CLIヘルプが正しく表示されることを確認
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("we").unwrap();
    cmd.args(["registry", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("preview"))
        .stdout(predicate::str::contains("promote"))
        .stdout(predicate::str::contains("sync"));
}

/// バージョン表示が正しく動作することを確認
#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("we").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("we "));
}

#[test]
fn test_missing_registry_is_fatal() {
    let server = TestServer::new();
    std::fs::remove_file(server.registry_path()).unwrap();

    server
        .we()
        .args(["registry", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("レジストリを読み込めません"));
}

#[test]
fn test_add_and_list() {
    let server = TestServer::new();

    server
        .we()
        .args(["registry", "add", "myapp", "--type", "nextjs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("myapp-staging.one-q.xyz"))
        .stdout(predicate::str::contains("myapp.one-q.xyz"));

    let registry = server.registry();
    assert_eq!(registry["projects"]["myapp"]["type"], "nextjs");
    assert_eq!(registry["projects"]["myapp"]["environments"]["staging"]["port"], 3100);
    assert_eq!(registry["projects"]["myapp"]["environments"]["production"]["port"], 3000);
    assert_eq!(registry["ports"]["next_available"]["staging"], 3101);
    assert_eq!(registry["version"], 1);

    let output = server
        .we()
        .args(["registry", "list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
    assert_eq!(rows[0]["env"], "staging");
    assert_eq!(rows[0]["status"], "pending");

    // 重複登録はエラーで、レジストリは変わらない
    server
        .we()
        .args(["registry", "add", "myapp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("既に登録されています"));
    assert_eq!(server.registry()["version"], 1);
}

#[test]
fn test_update_status_and_unknown_env() {
    let server = TestServer::new();
    server.we().args(["registry", "add", "myapp"]).assert().success();

    server
        .we()
        .args([
            "registry", "update", "myapp", "--status", "running", "--env", "production",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("production.status"));
    assert_eq!(
        server.registry()["projects"]["myapp"]["environments"]["production"]["status"],
        "running"
    );

    server
        .we()
        .args(["registry", "update", "myapp", "--status", "stopped", "--env", "qa"])
        .assert()
        .success()
        .stdout(predicate::str::contains("qa"));
    assert!(server.registry()["projects"]["myapp"]["environments"]["qa"].is_null());
}

#[test]
fn test_preview_lifecycle() {
    let server = TestServer::new();
    server.we().args(["registry", "add", "myapp"]).assert().success();

    let output = server
        .we()
        .args([
            "registry", "preview", "create", "--project", "myapp", "--pr", "123", "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let created: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(created["key"], "myapp-123");
    assert_eq!(created["preview"]["port"], 3200);
    assert_eq!(created["preview"]["url"], "https://myapp-123.preview.one-q.xyz");

    // CLI の既定 TTL は 72 時間
    let preview = &server.registry()["previews"]["myapp-123"];
    let created_at: chrono::DateTime<chrono::Utc> =
        preview["created_at"].as_str().unwrap().parse().unwrap();
    let expires_at: chrono::DateTime<chrono::Utc> =
        preview["expires_at"].as_str().unwrap().parse().unwrap();
    assert_eq!(expires_at - created_at, chrono::Duration::hours(72));

    server
        .we()
        .args(["registry", "preview", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("myapp-123"));

    server
        .we()
        .args(["registry", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Previews:"))
        .stdout(predicate::str::contains("https://myapp-123.preview.one-q.xyz"));

    server
        .we()
        .args(["registry", "promote", "myapp-123"])
        .assert()
        .success()
        .stdout(predicate::str::contains("we deploy myapp -e staging --image 123"));

    server
        .we()
        .args([
            "registry", "preview", "remove", "--project", "myapp", "--build", "123",
        ])
        .assert()
        .success();
    assert!(server.registry()["previews"]["myapp-123"].is_null());

    server
        .we()
        .args(["registry", "preview", "remove", "--key", "myapp-123"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("myapp-123"));
}

#[test]
fn test_remove_requires_force() {
    let server = TestServer::new();
    server.we().args(["registry", "add", "myapp"]).assert().success();
    server
        .we()
        .args(["registry", "preview", "create", "--project", "myapp", "--build", "b1"])
        .assert()
        .success();

    server
        .we()
        .args(["registry", "remove", "myapp"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
    assert!(server.registry()["projects"]["myapp"].is_object());

    server
        .we()
        .args(["registry", "remove", "myapp", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("myapp-b1"));
    let registry = server.registry();
    assert!(registry["projects"]["myapp"].is_null());
    assert!(registry["previews"]["myapp-b1"].is_null());
}

#[test]
fn test_ports_report() {
    let server = TestServer::new();
    server.we().args(["registry", "add", "myapp"]).assert().success();

    let output = server
        .we()
        .args(["registry", "ports", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let ports: Vec<u64> = report["used"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["port"].as_u64().unwrap())
        .collect();
    assert_eq!(ports, vec![22, 3000, 3100, 5432]);
    assert_eq!(report["used"][0]["slot"]["kind"], "reserved");
}

#[test]
fn test_sync_with_live_containers() {
    let server = TestServer::new();
    server.we().args(["registry", "add", "myapp"]).assert().success();
    let runtime = server.fake_runtime("myapp-production|Up 2 hours\nmyapp-staging|Exited (1) 3 minutes ago");

    let output = server
        .we()
        .env("CODEB_CONTAINER_RUNTIME", &runtime)
        .args(["registry", "sync", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["transitions"].as_array().unwrap().len(), 2);

    let registry = server.registry();
    let envs = &registry["projects"]["myapp"]["environments"];
    assert_eq!(envs["production"]["status"], "running");
    assert_eq!(envs["staging"]["status"], "stopped");
    assert_eq!(registry["version"], 2);

    // 同じ状態での再同期は保存しない
    server
        .we()
        .env("CODEB_CONTAINER_RUNTIME", &runtime)
        .args(["registry", "sync"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 件の変更"));
    assert_eq!(server.registry()["version"], 2);
}

#[test]
fn test_sync_timeout_does_not_save() {
    let server = TestServer::new();
    server.we().args(["registry", "add", "myapp"]).assert().success();
    server
        .we()
        .args(["registry", "update", "myapp", "-e", "production", "--status", "running"])
        .assert()
        .success();
    let before = server.registry();

    let config = server.write_config(&serde_json::json!({
        "server": { "command_timeout_secs": 1 }
    }));
    server
        .we()
        .env("CODEB_CONFIG_PATH", &config)
        .env("CODEB_CONTAINER_RUNTIME", server.slow_runtime())
        .args(["registry", "sync"])
        .assert()
        .failure();

    let after = server.registry();
    assert_eq!(after, before);
    assert_eq!(
        after["projects"]["myapp"]["environments"]["production"]["status"],
        "running"
    );
}

//! 実コンテナの状態との同期

use crate::model::{DeployStatus, Registry};
use chrono::{DateTime, Utc};
use codeb_remote::{RemoteCommand, RemoteError, RemoteExecutor};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// `<runtime> ps` の 1 行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerStatus {
    pub name: String,
    pub running: bool,
}

/// `{{.Names}}|{{.Status}}` 形式の出力を解析する
pub fn parse_container_listing(output: &str) -> Vec<ContainerStatus> {
    output
        .lines()
        .filter_map(|line| {
            let (name, status) = line.split_once('|')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(ContainerStatus {
                name: name.to_string(),
                running: status.to_ascii_lowercase().contains("up"),
            })
        })
        .collect()
}

/// サーバー上で稼働中のコンテナ名を取得する
///
/// ランタイムのコマンドが失敗した場合は警告を出して空集合を返す。
/// 接続エラー・タイムアウトはそのままエラーにする。
pub async fn fetch_live_containers(
    executor: &dyn RemoteExecutor,
    runtime: &str,
    timeout: Duration,
) -> crate::Result<HashSet<String>> {
    let command = RemoteCommand::shell(runtime).args([
        "ps",
        "-a",
        "--format",
        "{{.Names}}|{{.Status}}",
    ]);
    let output = match executor.execute(&command, timeout, false).await {
        Ok(output) => output,
        Err(err) if err.is_transport() => return Err(err.into()),
        Err(RemoteError::CommandFailed { stderr, .. }) => {
            tracing::warn!(
                "{} からコンテナ一覧を取得できませんでした: {}",
                executor.target(),
                stderr.trim()
            );
            return Ok(HashSet::new());
        }
        Err(err) => return Err(err.into()),
    };

    Ok(parse_container_listing(&output.stdout)
        .into_iter()
        .filter(|c| c.running)
        .map(|c| c.name)
        .collect())
}

/// 状態遷移 1 件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusTransition {
    /// `<project>/<env>` または Preview キー
    pub target: String,
    pub container: String,
    pub from: DeployStatus,
    pub to: DeployStatus,
}

/// sync の結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub transitions: Vec<StatusTransition>,
    pub expired_previews: Vec<String>,
}

impl SyncReport {
    /// 変更件数（0 なら保存不要）
    pub fn change_count(&self) -> usize {
        self.transitions.len() + self.expired_previews.len()
    }
}

fn observed(live: &HashSet<String>, container: &str) -> DeployStatus {
    if live.contains(container) {
        DeployStatus::Running
    } else {
        DeployStatus::Stopped
    }
}

impl Registry {
    /// 期限切れ Preview を削除し、残りの status を稼働中コンテナの集合に合わせる
    pub fn sync_with_live_state(&mut self, live: &HashSet<String>, now: DateTime<Utc>) -> SyncReport {
        let mut report = SyncReport {
            expired_previews: self.remove_expired_previews(now),
            ..Default::default()
        };

        for (name, project) in self.projects.iter_mut() {
            for (env, config) in project.environments.iter_mut() {
                let container = config.container_name(name, env);
                let status = observed(live, &container);
                if config.status != status {
                    report.transitions.push(StatusTransition {
                        target: format!("{}/{}", name, env),
                        container,
                        from: config.status,
                        to: status,
                    });
                    config.status = status;
                }
            }
        }

        for (key, preview) in self.previews.iter_mut() {
            let status = observed(live, &preview.container);
            if preview.status != status {
                report.transitions.push(StatusTransition {
                    target: key.clone(),
                    container: preview.container.clone(),
                    from: preview.status,
                    to: status,
                });
                preview.status = status;
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortAllocation;
    use crate::preview::PreviewRequest;
    use crate::project::AddProjectOptions;
    use chrono::TimeZone;
    use codeb_remote::LocalExecutor;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn registry() -> Registry {
        let mut ports = PortAllocation::default();
        ports.next_available.insert("production".to_string(), 3000);
        ports.next_available.insert("staging".to_string(), 3100);
        ports.next_available.insert("preview".to_string(), 3200);
        let mut registry = Registry {
            ports,
            ..Default::default()
        };
        registry
            .add_project("myapp", AddProjectOptions::new("one-q.xyz"))
            .unwrap();
        registry
    }

    fn live(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_parse_container_listing() {
        let output = "myapp-production|Up 3 hours\n\
                      myapp-staging|Exited (0) 2 days ago\n\
                      \n\
                      broken line\n\
                      myapp-42|up 5 minutes (healthy)\n";
        let parsed = parse_container_listing(output);
        assert_eq!(
            parsed,
            vec![
                ContainerStatus {
                    name: "myapp-production".to_string(),
                    running: true
                },
                ContainerStatus {
                    name: "myapp-staging".to_string(),
                    running: false
                },
                ContainerStatus {
                    name: "myapp-42".to_string(),
                    running: true
                },
            ]
        );
    }

    #[test]
    fn test_sync_transitions_and_idempotence() {
        let mut registry = registry();
        let live = live(&["myapp-production"]);

        let report = registry.sync_with_live_state(&live, now());
        assert_eq!(report.change_count(), 2);
        let project = registry.project("myapp").unwrap();
        assert_eq!(project.environments["production"].status, DeployStatus::Running);
        assert_eq!(project.environments["staging"].status, DeployStatus::Stopped);

        let again = registry.sync_with_live_state(&live, now());
        assert_eq!(again.change_count(), 0);
    }

    #[test]
    fn test_sync_uses_container_fallback_name() {
        let mut registry = registry();
        registry.projects["myapp"].environments["staging"].container = None;

        registry.sync_with_live_state(&live(&["myapp-staging"]), now());
        assert_eq!(
            registry.projects["myapp"].environments["staging"].status,
            DeployStatus::Running
        );
    }

    #[test]
    fn test_sync_sweeps_expired_previews() {
        let mut registry = registry();
        let request = PreviewRequest {
            build: Some("7".to_string()),
            ttl_hours: Some(1),
            fallback_domain: "one-q.xyz".to_string(),
            ..Default::default()
        };
        registry.create_preview("myapp", request, now()).unwrap();

        let report = registry.sync_with_live_state(&live(&[]), now() + chrono::Duration::hours(1));
        assert_eq!(report.expired_previews, vec!["myapp-7"]);
        assert!(registry.previews.is_empty());
    }

    #[test]
    fn test_sync_counts_swept_preview_once() {
        let mut registry = registry();
        let request = PreviewRequest {
            build: Some("7".to_string()),
            ttl_hours: Some(1),
            fallback_domain: "one-q.xyz".to_string(),
            ..Default::default()
        };
        registry.create_preview("myapp", request, now()).unwrap();

        // pending のまま期限切れ: 状態遷移ではなく削除としてだけ数える
        let report = registry.sync_with_live_state(
            &live(&["myapp-production", "myapp-staging"]),
            now() + chrono::Duration::hours(2),
        );
        assert_eq!(report.expired_previews, vec!["myapp-7"]);
        assert!(report.transitions.iter().all(|t| t.target != "myapp-7"));
        assert_eq!(report.change_count(), 3);
    }

    #[tokio::test]
    async fn test_fetch_live_containers_timeout_is_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let runtime = dir.path().join("slow-podman");
        std::fs::write(&runtime, "#!/bin/sh\nexec sleep 5\n").unwrap();
        std::fs::set_permissions(&runtime, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = fetch_live_containers(
            &LocalExecutor::new(),
            &runtime.to_string_lossy(),
            Duration::from_millis(300),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            crate::RegistryError::Remote(RemoteError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_live_containers_unreachable_runtime() {
        let executor = LocalExecutor::new();
        let live = fetch_live_containers(
            &executor,
            "codeb-no-such-runtime",
            Duration::from_secs(10),
        )
        .await
        .unwrap();
        assert!(live.is_empty());
    }
}

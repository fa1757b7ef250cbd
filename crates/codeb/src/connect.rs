//! 設定から実行経路（ssh / local）とレジストリストアを組み立てる

use anyhow::Context as _;
use codeb_config::{CodebConfig, Transport};
use codeb_registry::RegistryStore;
use codeb_remote::{HostKeyPolicy, LocalExecutor, RemoteExecutor, SshExecutor, SshTarget};
use std::sync::Arc;
use std::time::Duration;

/// コマンドハンドラに渡す実行コンテキスト
pub struct Context {
    pub config: CodebConfig,
    pub executor: Arc<dyn RemoteExecutor>,
    pub store: RegistryStore,
    pub json: bool,
    pub force: bool,
}

impl Context {
    pub fn from_env(json: bool, force: bool) -> anyhow::Result<Self> {
        let config = CodebConfig::load().context("設定の読み込みに失敗しました")?;
        Self::new(config, json, force)
    }

    pub fn new(config: CodebConfig, json: bool, force: bool) -> anyhow::Result<Self> {
        let executor = build_executor(&config)?;
        let store = RegistryStore::new(executor.clone(), config.registry.path.clone())
            .with_timeouts(
                Duration::from_secs(config.server.read_timeout_secs),
                Duration::from_secs(config.server.command_timeout_secs),
            )
            .with_version_check(config.registry.version_check);

        tracing::debug!(
            "Registry {} on {} (version check: {})",
            store.path(),
            executor.target(),
            config.registry.version_check
        );

        Ok(Self {
            config,
            executor,
            store,
            json,
            force,
        })
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.command_timeout_secs)
    }
}

pub fn build_executor(config: &CodebConfig) -> anyhow::Result<Arc<dyn RemoteExecutor>> {
    let server = &config.server;
    match server.transport {
        Transport::Local => Ok(Arc::new(LocalExecutor::new())),
        Transport::Ssh => {
            let policy: HostKeyPolicy = server
                .host_key_policy
                .parse()
                .map_err(|e: String| anyhow::anyhow!("host_key_policy: {}", e))?;

            let mut target = SshTarget::new(&server.host, &server.user);
            if let Some(port) = server.ssh_port {
                target = target.with_port(port);
            }
            if let Some(identity) = &server.identity_file {
                target = target.with_identity_file(identity);
            }

            Ok(Arc::new(
                SshExecutor::new(target)
                    .with_connect_timeout(Duration::from_secs(server.connect_timeout_secs))
                    .with_host_key_policy(policy),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_executor_targets() {
        let mut config = CodebConfig::default();
        let ssh = build_executor(&config).unwrap();
        assert_eq!(ssh.target(), "root@141.164.60.51");

        config.server.transport = Transport::Local;
        let local = build_executor(&config).unwrap();
        assert_eq!(local.target(), "local");
    }

    #[test]
    fn test_build_executor_rejects_unknown_policy() {
        let mut config = CodebConfig::default();
        config.server.host_key_policy = "maybe".to_string();
        assert!(build_executor(&config).is_err());
    }
}

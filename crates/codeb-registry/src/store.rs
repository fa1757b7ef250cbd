//! サーバー上の registry.json の読み書き
//!
//! 1 コマンド = load → 変更 → save。ロックは取らないため、同時に実行された
//! コマンドは後勝ちになる（`version_check` で検出のみ可能）。

use crate::error::{RegistryError, Result};
use crate::model::Registry;
use chrono::Utc;
use codeb_remote::{DEFAULT_COMMAND_TIMEOUT, RemoteCommand, RemoteError, RemoteExecutor};
use std::sync::Arc;
use std::time::Duration;

/// 読み込みは転送量が大きいので書き込みより長めに待つ
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// registry.json のストア
pub struct RegistryStore {
    executor: Arc<dyn RemoteExecutor>,
    path: String,
    read_timeout: Duration,
    write_timeout: Duration,
    version_check: bool,
}

impl RegistryStore {
    pub fn new(executor: Arc<dyn RemoteExecutor>, path: impl Into<String>) -> Self {
        Self {
            executor,
            path: path.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_COMMAND_TIMEOUT,
            version_check: false,
        }
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    /// 保存前にリモートの version を再確認する
    pub fn with_version_check(mut self, enabled: bool) -> Self {
        self.version_check = enabled;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn target(&self) -> &str {
        self.executor.target()
    }

    fn unavailable(&self, reason: impl Into<String>) -> RegistryError {
        RegistryError::Unavailable {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    async fn read_document(&self) -> Result<String> {
        let command = RemoteCommand::read_file(&self.path);
        let output = match self
            .executor
            .execute(&command, self.read_timeout, false)
            .await
        {
            Ok(output) => output,
            Err(err) if err.is_transport() => return Err(err.into()),
            Err(RemoteError::CommandFailed { stderr, .. }) => {
                return Err(self.unavailable(stderr));
            }
            Err(err) => return Err(err.into()),
        };

        if output.stdout.trim().is_empty() {
            return Err(self.unavailable("ファイルが空です"));
        }
        Ok(output.stdout)
    }

    /// レジストリを読み込む
    ///
    /// 読めない・解析できない場合は空のレジストリで代用せずエラーにする。
    pub async fn load(&self) -> Result<Registry> {
        let content = self.read_document().await?;
        let registry: Registry = serde_json::from_str(&content)
            .map_err(|e| self.unavailable(format!("JSON 解析エラー: {}", e)))?;

        for violation in registry.invariant_violations() {
            tracing::warn!("{}", violation);
        }

        tracing::debug!(
            "Loaded registry v{} from {} ({} projects, {} previews)",
            registry.version,
            self.target(),
            registry.projects.len(),
            registry.previews.len()
        );
        Ok(registry)
    }

    async fn remote_version(&self) -> Result<u64> {
        let content = self.read_document().await?;
        let value: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| self.unavailable(format!("JSON 解析エラー: {}", e)))?;
        Ok(value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0))
    }

    /// レジストリを保存する
    ///
    /// `updated_at` と `version` を更新してから書き込む。書き込みに失敗した場合
    /// `registry` は変更されない。
    pub async fn save(&self, registry: &mut Registry) -> Result<()> {
        if self.version_check {
            let found = self.remote_version().await?;
            if found != registry.version {
                return Err(RegistryError::ConcurrentModification {
                    expected: registry.version,
                    found,
                });
            }
        }

        let mut next = registry.clone();
        next.updated_at = Some(Utc::now());
        next.version += 1;

        let content = encode(&next)?;
        let command = RemoteCommand::write_file(&self.path, content.into_bytes());
        self.executor
            .execute(&command, self.write_timeout, false)
            .await?;

        tracing::debug!("Saved registry v{} to {}", next.version, self.target());
        *registry = next;
        Ok(())
    }

    /// load → `f` → save。`f` が失敗した場合は保存しない。
    pub async fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Registry) -> Result<T>,
    {
        let mut registry = self.load().await?;
        let value = f(&mut registry)?;
        self.save(&mut registry).await?;
        Ok(value)
    }
}

/// 2 スペースインデントの JSON に変換し、解析し直して同じ内容になることを確認する
pub fn encode(registry: &Registry) -> Result<String> {
    let content = serde_json::to_string_pretty(registry)
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    let decoded: Registry = serde_json::from_str(&content)
        .map_err(|e| RegistryError::Serialization(e.to_string()))?;
    if decoded != *registry {
        return Err(RegistryError::Serialization(
            "書き込み内容を読み戻した結果が一致しません".to_string(),
        ));
    }
    Ok(content + "\n")
}

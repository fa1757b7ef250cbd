//! Preview 環境のライフサイクル
//!
//! Preview は `<project>-<build>` をキーとする一時環境で、`expires_at` を過ぎると
//! `sync` で掃除される。

use crate::allocator::{NeverReuse, PREVIEW, PortAllocationPolicy};
use crate::error::{RegistryError, Result};
use crate::model::{DeployStatus, Preview, Registry, Slot};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static BUILD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("valid regex"));

/// DNS ラベルの最大長
const MAX_LABEL_LEN: usize = 63;

/// TTL 未指定時の既定値（時間）
pub const DEFAULT_PREVIEW_TTL_HOURS: u32 = 24;

/// promote 先の既定環境
pub const DEFAULT_PROMOTE_TARGET: &str = "staging";

/// Preview 作成リクエスト
#[derive(Debug, Clone, Default)]
pub struct PreviewRequest {
    pub build: Option<String>,
    pub pr: Option<String>,
    pub branch: Option<String>,
    /// 有効期間（時間）。未指定なら [`DEFAULT_PREVIEW_TTL_HOURS`]
    pub ttl_hours: Option<u32>,
    /// `server.domains` が空のときに使うベースドメイン
    pub fallback_domain: String,
}

/// Preview 一覧の 1 行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewEntry<'a> {
    pub key: &'a str,
    #[serde(flatten)]
    pub preview: &'a Preview,
    pub expired: bool,
}

/// promote の結果（デプロイは行わない）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromotionPlan {
    pub preview_key: String,
    pub build: String,
    pub project: String,
    pub environment: String,
    pub domain: String,
    pub port: u16,
}

impl PromotionPlan {
    /// 実際にデプロイするためのコマンド
    pub fn deploy_command(&self) -> String {
        format!(
            "we deploy {} -e {} --image {}",
            self.project, self.environment, self.build
        )
    }
}

/// Preview キー
pub fn preview_key(project: &str, build: &str) -> String {
    format!("{}-{}", project, build)
}

/// ビルド ID の決定: build → pr → `build-<epoch millis>`
pub fn resolve_build_id(build: Option<&str>, pr: Option<&str>, now: DateTime<Utc>) -> String {
    build
        .filter(|b| !b.is_empty())
        .or(pr.filter(|p| !p.is_empty()))
        .map(ToString::to_string)
        .unwrap_or_else(|| format!("build-{}", now.timestamp_millis()))
}

/// ビルド ID の検証（Preview キーがそのままホスト名のラベルになる）
pub fn validate_build_id(project: &str, build: &str) -> Result<()> {
    if !BUILD_ID.is_match(build) || preview_key(project, build).len() > MAX_LABEL_LEN {
        return Err(RegistryError::InvalidBuildId(build.to_string()));
    }
    Ok(())
}

impl Registry {
    /// Preview を作成する（同じキーがあれば上書き）
    pub fn create_preview(
        &mut self,
        project: &str,
        request: PreviewRequest,
        now: DateTime<Utc>,
    ) -> Result<(String, &Preview)> {
        self.create_preview_with(project, request, now, &NeverReuse)
    }

    pub fn create_preview_with(
        &mut self,
        project: &str,
        request: PreviewRequest,
        now: DateTime<Utc>,
        policy: &dyn PortAllocationPolicy,
    ) -> Result<(String, &Preview)> {
        self.project(project)?;

        let ttl_hours = request.ttl_hours.unwrap_or(DEFAULT_PREVIEW_TTL_HOURS);
        if ttl_hours == 0 {
            return Err(RegistryError::InvalidTtl(ttl_hours));
        }
        let expires_at = now
            .checked_add_signed(Duration::hours(i64::from(ttl_hours)))
            .ok_or(RegistryError::InvalidTtl(ttl_hours))?;

        let build = resolve_build_id(request.build.as_deref(), request.pr.as_deref(), now);
        validate_build_id(project, &build)?;
        let key = preview_key(project, &build);
        let base = self
            .server
            .preview_domain()
            .unwrap_or(&request.fallback_domain)
            .to_string();
        let host = format!("{}.{}", key, base);

        let this = Slot::Preview {
            key: key.clone(),
            project: project.to_string(),
        };
        if let Some(owner) = self.domain_owner(&host, Some(&this)) {
            return Err(RegistryError::DomainInUse {
                domain: host,
                owner: owner.to_string(),
            });
        }

        // 上書きされる Preview のポートは空くものとして扱う
        let mut in_use = self.used_ports();
        if let Some(old) = self.previews.get(&key) {
            tracing::warn!(
                "Preview '{}' は既に存在するため上書きします (旧ポート: {})",
                key,
                old.port
            );
            in_use.remove(&old.port);
        }
        let mut ports = self.ports.clone();
        let port = policy.allocate(&mut ports, PREVIEW, &in_use)?;

        self.ports = ports;
        self.previews.insert(
            key.clone(),
            Preview {
                project: project.to_string(),
                build,
                branch: request.branch,
                pr: request.pr,
                port,
                url: format!("https://{}", host),
                container: key.clone(),
                status: DeployStatus::Pending,
                created_at: now,
                expires_at: Some(expires_at),
            },
        );
        tracing::debug!("Created preview {} on port {}", key, port);

        let preview = self
            .previews
            .get(&key)
            .ok_or_else(|| RegistryError::PreviewNotFound(key.clone()))?;
        Ok((key, preview))
    }

    /// Preview を削除する
    pub fn remove_preview(&mut self, key: &str) -> Result<Preview> {
        self.previews
            .shift_remove(key)
            .ok_or_else(|| RegistryError::PreviewNotFound(key.to_string()))
    }

    /// Preview 一覧（期限切れフラグ付き）
    pub fn list_previews(&self, now: DateTime<Utc>) -> Vec<PreviewEntry<'_>> {
        self.previews
            .iter()
            .map(|(key, preview)| PreviewEntry {
                key,
                preview,
                expired: preview.is_expired(now),
            })
            .collect()
    }

    /// Preview を指定環境へ昇格する計画を作る（レジストリは変更しない）
    pub fn promote_preview(&self, key: &str, target_env: &str) -> Result<PromotionPlan> {
        let preview = self
            .previews
            .get(key)
            .ok_or_else(|| RegistryError::PreviewNotFound(key.to_string()))?;
        let project = self.project(&preview.project)?;
        let env = project.environments.get(target_env).ok_or_else(|| {
            RegistryError::EnvironmentNotFound {
                project: preview.project.clone(),
                env: target_env.to_string(),
            }
        })?;

        Ok(PromotionPlan {
            preview_key: key.to_string(),
            build: preview.build.clone(),
            project: preview.project.clone(),
            environment: target_env.to_string(),
            domain: env.domain.clone(),
            port: env.port,
        })
    }

    /// 期限切れ（expires_at <= now）の Preview を削除し、削除したキーを返す
    pub fn remove_expired_previews(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .previews
            .iter()
            .filter(|(_, preview)| preview.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.previews.shift_remove(key);
            tracing::debug!("Removed expired preview {}", key);
        }
        expired
    }
}

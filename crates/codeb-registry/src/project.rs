//! プロジェクトの登録・更新・削除
//!
//! どの操作も検証を先に済ませてから変更するため、エラー時にはレジストリは
//! 呼び出し前のまま残る。

use crate::allocator::{NeverReuse, PRODUCTION, PortAllocationPolicy, STAGING, build_domain};
use crate::error::{RegistryError, Result};
use crate::model::{DeployStatus, EnvConfig, Preview, Project, ProjectType, Registry, Slot};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static PROJECT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("valid regex"));

static DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9]+([\-.][a-z0-9]+)*\.[a-z]{2,}$").expect("valid regex")
});

/// staging ポートは production ポート + 100（`--port` 指定時）
const STAGING_PORT_OFFSET: u16 = 100;

/// プロジェクト名の検証（ドメインのラベルとして使えること）
pub fn validate_project_name(name: &str) -> Result<()> {
    if name.len() > 63 || !PROJECT_NAME.is_match(name) {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// ドメインの検証
pub fn validate_domain(domain: &str) -> Result<()> {
    if !DOMAIN.is_match(domain) {
        return Err(RegistryError::InvalidDomain(domain.to_string()));
    }
    Ok(())
}

/// `registry add` のオプション
#[derive(Debug, Clone)]
pub struct AddProjectOptions {
    /// production ポートの明示指定（staging は +100）。カウンタを消費しない。
    pub port: Option<u16>,
    pub project_type: Option<ProjectType>,
    pub git_repo: Option<String>,
    pub base_domain: String,
}

impl AddProjectOptions {
    pub fn new(base_domain: impl Into<String>) -> Self {
        Self {
            port: None,
            project_type: None,
            git_repo: None,
            base_domain: base_domain.into(),
        }
    }
}

/// `registry update` の変更内容
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub git_repo: Option<String>,
    pub project_type: Option<ProjectType>,
    /// status / domain の対象環境
    pub env: Option<String>,
    pub status: Option<DeployStatus>,
    pub domain: Option<String>,
}

/// update の結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectUpdate {
    pub changed: Vec<String>,
    /// 存在しない環境が指定されたため無視された環境名
    pub ignored_env: Option<String>,
}

/// remove の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemovedProject {
    pub name: String,
    pub project: Project,
    /// 連鎖削除された Preview のキー
    pub previews: Vec<String>,
}

/// list の 1 行（プロジェクト × 環境）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRow<'a> {
    pub name: &'a str,
    pub env: &'a str,
    #[serde(flatten)]
    pub config: &'a EnvConfig,
}

/// show の結果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDetail<'a> {
    pub name: &'a str,
    #[serde(flatten)]
    pub project: &'a Project,
    pub previews: IndexMap<&'a str, &'a Preview>,
}

/// ports レポートの使用中ポート
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortUsage {
    pub port: u16,
    pub slot: Slot,
}

/// ports レポートのクラスごとの状況
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortClassReport {
    pub class: String,
    pub range: Option<String>,
    pub next_available: u16,
}

/// `registry ports` のレポート
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortReport {
    pub classes: Vec<PortClassReport>,
    /// 予約ポートを含む全使用ポート（ポート順）
    pub used: Vec<PortUsage>,
    /// 複数レコードが使っているポート
    pub conflicts: Vec<u16>,
}

impl Registry {
    /// プロジェクトを登録する
    ///
    /// staging / production の 2 環境をこの時点で割り当てる（status は pending）。
    pub fn add_project(&mut self, name: &str, options: AddProjectOptions) -> Result<&Project> {
        self.add_project_with(name, options, &NeverReuse, Utc::now())
    }

    pub fn add_project_with(
        &mut self,
        name: &str,
        options: AddProjectOptions,
        policy: &dyn PortAllocationPolicy,
        now: DateTime<Utc>,
    ) -> Result<&Project> {
        validate_project_name(name)?;
        validate_domain(&options.base_domain)?;
        if self.projects.contains_key(name) {
            return Err(RegistryError::ProjectExists(name.to_string()));
        }

        // カウンタの消費は作業用コピーで行い、全ての検証が通ってから反映する
        let mut ports = self.ports.clone();
        let (staging_port, production_port) = match options.port {
            Some(port) => {
                let staging = port.checked_add(STAGING_PORT_OFFSET).ok_or_else(|| {
                    RegistryError::InvalidPort(format!(
                        "{} (+{} が範囲外)",
                        port, STAGING_PORT_OFFSET
                    ))
                })?;
                let used = self.used_ports();
                for p in [staging, port] {
                    if used.contains(&p) {
                        tracing::warn!(
                            "明示指定されたポート {} は既に使用されています（重複チェックは行いません）",
                            p
                        );
                    }
                }
                (staging, port)
            }
            None => {
                let mut in_use = self.used_ports();
                let staging = policy.allocate(&mut ports, STAGING, &in_use)?;
                in_use.insert(staging);
                let production = policy.allocate(&mut ports, PRODUCTION, &in_use)?;
                (staging, production)
            }
        };

        let mut environments = IndexMap::new();
        for (env, port) in [(STAGING, staging_port), (PRODUCTION, production_port)] {
            let domain = build_domain(name, env, &options.base_domain);
            if let Some(owner) = self.domain_owner(&domain, None) {
                return Err(RegistryError::DomainInUse {
                    domain,
                    owner: owner.to_string(),
                });
            }
            environments.insert(
                env.to_string(),
                EnvConfig {
                    port,
                    domain,
                    container: Some(format!("{}-{}", name, env)),
                    status: DeployStatus::Pending,
                },
            );
        }

        self.ports = ports;
        self.projects.insert(
            name.to_string(),
            Project {
                created_at: now,
                updated_at: None,
                project_type: options.project_type.unwrap_or_default(),
                git_repo: options.git_repo,
                environments,
            },
        );
        tracing::debug!(
            "Added project {} (staging: {}, production: {})",
            name,
            staging_port,
            production_port
        );

        self.project(name)
    }

    /// プロジェクトを更新する
    ///
    /// status / domain は `env` と組み合わせた場合のみ反映する。存在しない環境名は
    /// エラーにせず無視する（`ProjectUpdate::ignored_env` で通知）。
    pub fn update_project(&mut self, name: &str, patch: ProjectPatch) -> Result<ProjectUpdate> {
        self.update_project_at(name, patch, Utc::now())
    }

    pub fn update_project_at(
        &mut self,
        name: &str,
        patch: ProjectPatch,
        now: DateTime<Utc>,
    ) -> Result<ProjectUpdate> {
        let project = self.project(name)?;

        let env_target = match patch.env.as_deref() {
            Some(env) if project.environments.contains_key(env) => Some(env.to_string()),
            _ => None,
        };

        let mut update = ProjectUpdate::default();
        if let Some(env) = &patch.env
            && env_target.is_none()
            && (patch.status.is_some() || patch.domain.is_some())
        {
            tracing::warn!("プロジェクト '{}' に環境 '{}' はありません（無視します）", name, env);
            update.ignored_env = Some(env.clone());
        }

        if let (Some(env), Some(domain)) = (&env_target, &patch.domain) {
            validate_domain(domain)?;
            let this = Slot::Environment {
                project: name.to_string(),
                env: env.clone(),
            };
            if let Some(owner) = self.domain_owner(domain, Some(&this)) {
                return Err(RegistryError::DomainInUse {
                    domain: domain.clone(),
                    owner: owner.to_string(),
                });
            }
        }

        let project = self
            .projects
            .get_mut(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.to_string()))?;

        if let Some(git_repo) = patch.git_repo {
            project.git_repo = Some(git_repo);
            update.changed.push("git_repo".to_string());
        }
        if let Some(project_type) = patch.project_type {
            project.project_type = project_type;
            update.changed.push("type".to_string());
        }
        if let Some(env) = &env_target
            && let Some(config) = project.environments.get_mut(env)
        {
            if let Some(status) = patch.status {
                config.status = status;
                update.changed.push(format!("{}.status", env));
            }
            if let Some(domain) = patch.domain {
                config.domain = domain;
                update.changed.push(format!("{}.domain", env));
            }
        }

        project.updated_at = Some(now);
        Ok(update)
    }

    /// プロジェクトを削除する（関連する Preview も削除）
    pub fn remove_project(&mut self, name: &str) -> Result<RemovedProject> {
        let project = self
            .projects
            .shift_remove(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.to_string()))?;

        let previews: Vec<String> = self.previews_of(name).map(|(key, _)| key.clone()).collect();
        self.previews.retain(|_, preview| preview.project != name);

        tracing::debug!(
            "Removed project {} with {} preview(s)",
            name,
            previews.len()
        );

        Ok(RemovedProject {
            name: name.to_string(),
            project,
            previews,
        })
    }

    /// プロジェクト × 環境 の一覧（登録順）
    pub fn list_projects(&self) -> Vec<ProjectRow<'_>> {
        self.projects
            .iter()
            .flat_map(|(name, project)| {
                project
                    .environments
                    .iter()
                    .map(move |(env, config)| ProjectRow {
                        name: name.as_str(),
                        env: env.as_str(),
                        config,
                    })
            })
            .collect()
    }

    /// プロジェクトの詳細と関連 Preview
    pub fn show_project<'a>(&'a self, name: &'a str) -> Result<ProjectDetail<'a>> {
        let project = self.project(name)?;
        Ok(ProjectDetail {
            name,
            project,
            previews: self
                .previews_of(name)
                .map(|(key, preview)| (key.as_str(), preview))
                .collect(),
        })
    }

    /// ポート使用状況
    pub fn port_report(&self) -> PortReport {
        let classes = self
            .ports
            .next_available
            .iter()
            .map(|(class, next)| PortClassReport {
                class: class.clone(),
                range: self.ports.range.get(class).map(ToString::to_string),
                next_available: *next,
            })
            .collect();

        let mut used: Vec<PortUsage> = self
            .port_slots()
            .into_iter()
            .map(|(port, slot)| PortUsage { port, slot })
            .collect();
        used.sort_by_key(|usage| usage.port);

        let mut conflicts: Vec<u16> = used
            .windows(2)
            .filter(|pair| pair[0].port == pair[1].port)
            .map(|pair| pair[0].port)
            .collect();
        conflicts.dedup();

        PortReport {
            classes,
            used,
            conflicts,
        }
    }
}

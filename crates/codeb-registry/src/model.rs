//! CodeB Registry データモデル
//!
//! サーバー上の `registry.json` と 1:1 に対応する。マップは JSON オブジェクトの
//! 順序（挿入順）を保持するため `IndexMap` を使う。

use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// CodeB Registry — サーバー上の全プロジェクト・ポート・Preview 環境
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    /// プロジェクト定義（プロジェクト名 → Project）
    #[serde(default)]
    pub projects: IndexMap<String, Project>,

    /// Preview 環境（`<project>-<build>` → Preview）
    #[serde(default)]
    pub previews: IndexMap<String, Preview>,

    /// ポート割り当て状況
    pub ports: PortAllocation,

    /// サーバー情報
    #[serde(default)]
    pub server: ServerInfo,

    /// 最終更新日時（保存時に更新）
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    /// 保存ごとに 1 ずつ増える世代番号
    #[serde(default)]
    pub version: u64,
}

/// プロジェクト定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(rename = "type", default)]
    pub project_type: ProjectType,

    #[serde(default)]
    pub git_repo: Option<String>,

    /// 環境ごとの設定（staging, production, ...）
    #[serde(default)]
    pub environments: IndexMap<String, EnvConfig>,
}

/// 環境ごとの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvConfig {
    pub port: u16,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
    pub status: DeployStatus,
}

impl EnvConfig {
    /// 期待されるコンテナ名（未設定なら `<project>-<env>`）
    pub fn container_name(&self, project: &str, env: &str) -> String {
        match self.container.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}-{}", project, env),
        }
    }
}

/// Preview 環境
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    /// 親プロジェクト名
    pub project: String,
    pub build: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub pr: Option<String>,
    pub port: u16,
    pub url: String,
    pub container: String,
    pub status: DeployStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Preview {
    /// URL のホスト部分（ドメイン一意性の判定に使う）
    pub fn host(&self) -> &str {
        let rest = self
            .url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.url);
        rest.split(['/', ':']).next().unwrap_or(rest)
    }

    /// `now` 時点で期限切れか（expires_at <= now）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

/// プロジェクト種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    #[default]
    Nodejs,
    Nextjs,
    Remix,
    Static,
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectType::Nodejs => write!(f, "nodejs"),
            ProjectType::Nextjs => write!(f, "nextjs"),
            ProjectType::Remix => write!(f, "remix"),
            ProjectType::Static => write!(f, "static"),
        }
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nodejs" | "node" => Ok(ProjectType::Nodejs),
            "nextjs" | "next" => Ok(ProjectType::Nextjs),
            "remix" => Ok(ProjectType::Remix),
            "static" => Ok(ProjectType::Static),
            other => Err(format!(
                "不明なプロジェクト種別: {}（nodejs, nextjs, remix, static）",
                other
            )),
        }
    }
}

/// 環境・Preview のデプロイ状態
///
/// pending → running → stopped の遷移はデプロイ・ヘルスチェック側が駆動し、
/// レジストリ側は sync 時に実コンテナの状態を反映するだけ。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    #[default]
    Pending,
    Running,
    Stopped,
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStatus::Pending => write!(f, "pending"),
            DeployStatus::Running => write!(f, "running"),
            DeployStatus::Stopped => write!(f, "stopped"),
        }
    }
}

impl FromStr for DeployStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(DeployStatus::Pending),
            "running" => Ok(DeployStatus::Running),
            "stopped" => Ok(DeployStatus::Stopped),
            other => Err(format!(
                "不明な状態: {}（pending, running, stopped）",
                other
            )),
        }
    }
}

/// ポート割り当て状況
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAllocation {
    /// 予約済みポート（ポート → サービス名）
    #[serde(default)]
    pub reserved: BTreeMap<u16, String>,

    /// 環境クラスごとのポート範囲（"3000-3099" 形式）
    #[serde(default)]
    pub range: IndexMap<String, PortRange>,

    /// 環境クラスごとの次の割り当て候補
    pub next_available: IndexMap<String, u16>,
}

/// `min-max` 形式のポート範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

impl FromStr for PortRange {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidPortRange(s.to_string());
        let (min, max) = s.trim().split_once('-').ok_or_else(invalid)?;
        let min: u16 = min.trim().parse().map_err(|_| invalid())?;
        let max: u16 = max.trim().parse().map_err(|_| invalid())?;
        if min > max {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }
}

impl TryFrom<String> for PortRange {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PortRange> for String {
    fn from(range: PortRange) -> Self {
        range.to_string()
    }
}

/// サーバー情報
///
/// 形が固定されていないため、未知のフィールドもそのまま保持して書き戻す。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default)]
    pub domains: Vec<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ServerInfo {
    /// Preview URL に使うベースドメイン（domains[1] → domains[0] の順）
    pub fn preview_domain(&self) -> Option<&str> {
        self.domains
            .get(1)
            .or_else(|| self.domains.first())
            .map(String::as_str)
    }
}

/// ポート・ドメインを保持しているレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Slot {
    Environment { project: String, env: String },
    Preview { key: String, project: String },
    Reserved { service: String },
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Environment { project, env } => write!(f, "{} ({})", project, env),
            Slot::Preview { key, project } => write!(f, "{} (preview:{})", project, key),
            Slot::Reserved { service } => write!(f, "{} (reserved)", service),
        }
    }
}

impl Registry {
    /// プロジェクトを取得
    pub fn project(&self, name: &str) -> crate::Result<&Project> {
        self.projects
            .get(name)
            .ok_or_else(|| RegistryError::ProjectNotFound(name.to_string()))
    }

    /// 指定プロジェクトに属する Preview
    pub fn previews_of<'a>(
        &'a self,
        project: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Preview)> + 'a {
        self.previews
            .iter()
            .filter(move |(_, preview)| preview.project == project)
    }

    /// 全レコードが保持しているポート（予約ポートを含む）
    pub fn port_slots(&self) -> Vec<(u16, Slot)> {
        let mut slots: Vec<(u16, Slot)> = self
            .ports
            .reserved
            .iter()
            .map(|(port, service)| {
                (
                    *port,
                    Slot::Reserved {
                        service: service.clone(),
                    },
                )
            })
            .collect();

        for (name, project) in &self.projects {
            for (env, config) in &project.environments {
                slots.push((
                    config.port,
                    Slot::Environment {
                        project: name.clone(),
                        env: env.clone(),
                    },
                ));
            }
        }

        for (key, preview) in &self.previews {
            slots.push((
                preview.port,
                Slot::Preview {
                    key: key.clone(),
                    project: preview.project.clone(),
                },
            ));
        }

        slots
    }

    /// 使用中のポート（予約ポートを含む）
    pub fn used_ports(&self) -> BTreeSet<u16> {
        self.port_slots().into_iter().map(|(port, _)| port).collect()
    }

    /// 全レコードのドメイン（環境ドメインと Preview のホスト）
    pub fn domain_slots(&self) -> Vec<(String, Slot)> {
        let mut slots = Vec::new();
        for (name, project) in &self.projects {
            for (env, config) in &project.environments {
                slots.push((
                    config.domain.to_ascii_lowercase(),
                    Slot::Environment {
                        project: name.clone(),
                        env: env.clone(),
                    },
                ));
            }
        }
        for (key, preview) in &self.previews {
            slots.push((
                preview.host().to_ascii_lowercase(),
                Slot::Preview {
                    key: key.clone(),
                    project: preview.project.clone(),
                },
            ));
        }
        slots
    }

    /// ドメインを使用しているレコード（`except` は除外）
    pub fn domain_owner(&self, domain: &str, except: Option<&Slot>) -> Option<Slot> {
        let domain = domain.to_ascii_lowercase();
        self.domain_slots()
            .into_iter()
            .find(|(d, slot)| *d == domain && Some(slot) != except)
            .map(|(_, slot)| slot)
    }

    /// 不変条件のチェック（違反内容を返す。ロード時に警告として出す）
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for (key, preview) in &self.previews {
            if !self.projects.contains_key(&preview.project) {
                violations.push(format!(
                    "Preview '{}' の親プロジェクト '{}' が存在しません",
                    key, preview.project
                ));
            }
            if let Some(expires_at) = preview.expires_at
                && expires_at <= preview.created_at
            {
                violations.push(format!(
                    "Preview '{}' の expires_at が created_at 以前です",
                    key
                ));
            }
        }

        let mut seen_ports: BTreeMap<u16, Slot> = BTreeMap::new();
        for (port, slot) in self.port_slots() {
            if let Some(first) = seen_ports.get(&port) {
                violations.push(format!(
                    "ポート {} が重複しています: {} / {}",
                    port, first, slot
                ));
            } else {
                seen_ports.insert(port, slot);
            }
        }

        let mut seen_domains: BTreeMap<String, Slot> = BTreeMap::new();
        for (domain, slot) in self.domain_slots() {
            if let Some(first) = seen_domains.get(&domain) {
                violations.push(format!(
                    "ドメイン {} が重複しています: {} / {}",
                    domain, first, slot
                ));
            } else {
                seen_domains.insert(domain, slot);
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
  "projects": {
    "myapp": {
      "created_at": "2025-01-10T09:00:00.000Z",
      "type": "nextjs",
      "git_repo": "https://github.com/codeb/myapp.git",
      "environments": {
        "staging": {
          "port": 3100,
          "domain": "myapp-staging.one-q.xyz",
          "container": "myapp-staging",
          "status": "running"
        },
        "production": {
          "port": 3000,
          "domain": "myapp.one-q.xyz",
          "container": "myapp-production",
          "status": "pending"
        }
      }
    }
  },
  "previews": {
    "myapp-42": {
      "project": "myapp",
      "build": "42",
      "branch": "feature/login",
      "pr": "42",
      "port": 3200,
      "url": "https://myapp-42.preview.one-q.xyz",
      "container": "myapp-42",
      "status": "pending",
      "created_at": "2025-01-11T00:00:00.000Z",
      "expires_at": "2025-01-14T00:00:00.000Z"
    }
  },
  "ports": {
    "reserved": { "22": "ssh", "5432": "postgres" },
    "range": { "production": "3000-3099", "staging": "3100-3199", "preview": "3200-3499" },
    "next_available": { "production": 3001, "staging": 3101, "preview": 3201 }
  },
  "server": {
    "host": "141.164.60.51",
    "domains": ["one-q.xyz", "preview.one-q.xyz"],
    "os": "rocky-linux-9"
  },
  "updated_at": "2025-01-11T00:00:00.000Z"
}"#;

    fn sample() -> Registry {
        serde_json::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let registry = sample();

        let project = registry.project("myapp").unwrap();
        assert_eq!(project.project_type, ProjectType::Nextjs);
        assert_eq!(project.environments["staging"].status, DeployStatus::Running);
        assert_eq!(
            project.environments.keys().collect::<Vec<_>>(),
            vec!["staging", "production"]
        );

        assert_eq!(registry.ports.reserved[&22], "ssh");
        assert_eq!(
            registry.ports.range["preview"],
            PortRange {
                min: 3200,
                max: 3499
            }
        );
        assert_eq!(registry.ports.next_available["preview"], 3201);
        assert_eq!(registry.version, 0);

        // 未知のフィールドは保持される
        assert_eq!(registry.server.extra["os"], "rocky-linux-9");
        assert_eq!(registry.server.preview_domain(), Some("preview.one-q.xyz"));
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let broken = SAMPLE.replace("\"running\"", "\"exploded\"");
        assert!(serde_json::from_str::<Registry>(&broken).is_err());
    }

    #[test]
    fn test_malformed_range_is_rejected() {
        let broken = SAMPLE.replace("3200-3499", "3499-3200");
        assert!(serde_json::from_str::<Registry>(&broken).is_err());
    }

    #[test]
    fn test_missing_ports_is_rejected() {
        let value = serde_json::json!({ "projects": {}, "previews": {} });
        assert!(serde_json::from_value::<Registry>(value).is_err());
    }

    #[test]
    fn test_serialize_keeps_key_order() {
        let json = serde_json::to_string_pretty(&sample()).unwrap();
        let projects = json.find("\"projects\"").unwrap();
        let previews = json.find("\"previews\"").unwrap();
        let ports = json.find("\"ports\"").unwrap();
        let server = json.find("\"server\"").unwrap();
        let updated_at = json.find("\"updated_at\"").unwrap();
        assert!(projects < previews && previews < ports && ports < server && server < updated_at);
        // 2スペースインデント
        assert!(json.contains("\n  \"projects\": {"));
    }

    #[test]
    fn test_preview_host() {
        let registry = sample();
        assert_eq!(registry.previews["myapp-42"].host(), "myapp-42.preview.one-q.xyz");

        let mut preview = registry.previews["myapp-42"].clone();
        preview.url = "myapp-42.example.com:8443/path".to_string();
        assert_eq!(preview.host(), "myapp-42.example.com");
    }

    #[test]
    fn test_container_name_fallback() {
        let mut config = sample().projects["myapp"].environments["staging"].clone();
        assert_eq!(config.container_name("myapp", "staging"), "myapp-staging");
        config.container = None;
        assert_eq!(config.container_name("other", "qa"), "other-qa");
    }

    #[test]
    fn test_domain_owner() {
        let registry = sample();
        let owner = registry.domain_owner("MYAPP.one-q.xyz", None);
        assert_eq!(
            owner,
            Some(Slot::Environment {
                project: "myapp".to_string(),
                env: "production".to_string()
            })
        );
        let except = owner.clone();
        assert_eq!(registry.domain_owner("myapp.one-q.xyz", except.as_ref()), None);
        assert!(registry.domain_owner("myapp-42.preview.one-q.xyz", None).is_some());
    }

    #[test]
    fn test_invariant_violations() {
        let mut registry = sample();
        assert!(registry.invariant_violations().is_empty());

        registry.previews["myapp-42"].project = "ghost".to_string();
        registry.previews["myapp-42"].port = 3000;
        let violations = registry.invariant_violations();
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().any(|v| v.contains("ghost")));
        assert!(violations.iter().any(|v| v.contains("3000")));
    }

    #[test]
    fn test_status_and_type_parse() {
        assert_eq!("Running".parse::<DeployStatus>(), Ok(DeployStatus::Running));
        assert!("unknown".parse::<DeployStatus>().is_err());
        assert_eq!("next".parse::<ProjectType>(), Ok(ProjectType::Nextjs));
        assert_eq!(ProjectType::Static.to_string(), "static");
    }
}

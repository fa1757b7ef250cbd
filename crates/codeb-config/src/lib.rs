//! CodeB CLI の設定
//!
//! 以下の優先順位で設定を解決する（後勝ち）:
//! 1. 組み込みのデフォルト値
//! 2. 設定ファイル (`CODEB_CONFIG_PATH` または `~/.config/codeb/config.json`)
//! 3. 環境変数 (`CODEB_SERVER_HOST` など)

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_SERVER_HOST: &str = "141.164.60.51";
pub const DEFAULT_SERVER_USER: &str = "root";
pub const DEFAULT_REGISTRY_PATH: &str = "/opt/codeb/registry.json";
pub const DEFAULT_BASE_DOMAIN: &str = "one-q.xyz";
pub const DEFAULT_CONTAINER_RUNTIME: &str = "podman";
/// CLI 層での Preview TTL（時間）
pub const DEFAULT_PREVIEW_TTL_HOURS: u32 = 72;

const CONFIG_DIR_NAME: &str = "codeb";
const CONFIG_FILE_NAME: &str = "config.json";

/// リモートコマンドの実行経路
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// ssh 経由でサーバー上で実行
    #[default]
    Ssh,
    /// このマシン上で直接実行（サーバー上での実行・テスト用）
    Local,
}

impl FromStr for Transport {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(Transport::Ssh),
            "local" => Ok(Transport::Local),
            other => Err(other.to_string()),
        }
    }
}

/// 接続先サーバーの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub user: String,
    pub ssh_port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    pub transport: Transport,
    /// strict / accept-new / off
    pub host_key_policy: String,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// レジストリ読み込みなど、長めに待つ読み取り系コマンドのタイムアウト
    pub read_timeout_secs: u64,
    /// podman / docker
    pub container_runtime: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SERVER_HOST.to_string(),
            user: DEFAULT_SERVER_USER.to_string(),
            ssh_port: None,
            identity_file: None,
            transport: Transport::Ssh,
            host_key_policy: "accept-new".to_string(),
            connect_timeout_secs: 10,
            command_timeout_secs: 30,
            read_timeout_secs: 60,
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
        }
    }
}

/// レジストリの設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// サーバー上のレジストリファイル
    pub path: String,
    /// プロジェクトのドメイン生成に使うベースドメイン
    pub base_domain: String,
    pub preview_ttl_hours: u32,
    /// 保存前にリモートの version を再確認する（楽観的排他）
    pub version_check: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_REGISTRY_PATH.to_string(),
            base_domain: DEFAULT_BASE_DOMAIN.to_string(),
            preview_ttl_hours: DEFAULT_PREVIEW_TTL_HOURS,
            version_check: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodebConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
}

impl CodebConfig {
    /// デフォルト → 設定ファイル → 環境変数 の順に解決する
    pub fn load() -> Result<Self> {
        let mut config = match find_config_file()? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// `CODEB_*` 環境変数で上書き
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(host) = env_string("CODEB_SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(user) = env_string("CODEB_SERVER_USER") {
            self.server.user = user;
        }
        if let Some(port) = env_parse::<u16>("CODEB_SSH_PORT")? {
            self.server.ssh_port = Some(port);
        }
        if let Some(key) = env_string("CODEB_SSH_KEY") {
            self.server.identity_file = Some(PathBuf::from(key));
        }
        if let Some(transport) = env_parse::<Transport>("CODEB_TRANSPORT")? {
            self.server.transport = transport;
        }
        if let Some(policy) = env_string("CODEB_HOST_KEY_POLICY") {
            self.server.host_key_policy = policy;
        }
        if let Some(runtime) = env_string("CODEB_CONTAINER_RUNTIME") {
            self.server.container_runtime = runtime;
        }
        if let Some(path) = env_string("CODEB_REGISTRY_PATH") {
            self.registry.path = path;
        }
        if let Some(domain) = env_string("CODEB_BASE_DOMAIN") {
            self.registry.base_domain = domain;
        }
        if let Some(ttl) = env_parse::<u32>("CODEB_PREVIEW_TTL_HOURS")? {
            self.registry.preview_ttl_hours = ttl;
        }
        if let Some(check) = env_parse_bool("CODEB_VERSION_CHECK")? {
            self.registry.version_check = check;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.transport == Transport::Ssh && self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "server.host が空です（CODEB_SERVER_HOST）".to_string(),
            ));
        }
        if self.registry.path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "registry.path が空です（CODEB_REGISTRY_PATH）".to_string(),
            ));
        }
        if self.registry.preview_ttl_hours == 0 {
            return Err(ConfigError::Invalid(
                "registry.preview_ttl_hours は 1 以上を指定してください".to_string(),
            ));
        }
        Ok(())
    }
}

/// 設定ファイルを探す
///
/// 1. 環境変数 CODEB_CONFIG_PATH (直接パス指定、存在しなければエラー)
/// 2. ~/.config/codeb/config.json (存在する場合のみ)
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Some(config_path) = env_string("CODEB_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    Ok(default_config_path().filter(|path| path.exists()))
}

/// `~/.config/codeb/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(var: &str) -> Result<Option<T>> {
    match env_string(var) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

fn env_parse_bool(var: &str) -> Result<Option<bool>> {
    match env_string(var) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
        },
        None => Ok(None),
    }
}

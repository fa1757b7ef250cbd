//! CodeB Registry エラー型

use codeb_remote::RemoteError;

/// CodeB Registry のエラー
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("リモート実行エラー: {0}")]
    Remote(#[from] RemoteError),

    #[error("レジストリを読み込めません ({path}): {reason}")]
    Unavailable { path: String, reason: String },

    #[error("プロジェクト '{0}' が見つかりません")]
    ProjectNotFound(String),

    #[error("プロジェクト '{0}' は既に登録されています。'update' を使用してください")]
    ProjectExists(String),

    #[error("Preview '{0}' が見つかりません")]
    PreviewNotFound(String),

    #[error("プロジェクト '{project}' に環境 '{env}' がありません")]
    EnvironmentNotFound { project: String, env: String },

    #[error("ドメイン '{domain}' は既に {owner} が使用しています")]
    DomainInUse { domain: String, owner: String },

    #[error("ポートクラス '{0}' の next_available が定義されていません")]
    UnknownPortClass(String),

    #[error("ポートクラス '{0}' に割り当て可能なポートがありません")]
    PortsExhausted(String),

    #[error("不正なポート指定: {0}")]
    InvalidPort(String),

    #[error("不正なポート範囲: {0}（例: 3000-3099）")]
    InvalidPortRange(String),

    #[error("不正な TTL: {0} 時間")]
    InvalidTtl(u32),

    #[error("不正なプロジェクト名: '{0}'（英小文字・数字・ハイフンのみ）")]
    InvalidName(String),

    #[error("不正なビルド ID: '{0}'（英小文字・数字・ハイフンのみ）")]
    InvalidBuildId(String),

    #[error("不正なドメイン: '{0}'")]
    InvalidDomain(String),

    #[error("レジストリのシリアライズエラー: {0}")]
    Serialization(String),

    #[error(
        "レジストリが他の操作で更新されています (読み込み時 version {expected}, 現在 {found})。\n\
        コマンドを再実行してください"
    )]
    ConcurrentModification { expected: u64, found: u64 },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

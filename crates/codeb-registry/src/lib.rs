//! CodeB Registry — サーバー上のプロジェクト・ポート・Preview 環境の台帳
//!
//! CodeB サーバーの `registry.json` を唯一の情報源として、以下を管理します。
//!
//! - **プロジェクト**: staging / production 環境ごとのポート・ドメイン・状態
//! - **ポート割り当て**: 環境クラスごとのカウンタ（解放されたポートは再利用しない）
//! - **Preview 環境**: PR / ビルド単位の一時環境と有効期限
//! - **同期**: 実コンテナの稼働状況の反映と期限切れ Preview の掃除
//!
//! レジストリへの操作はすべて `&mut Registry` 上で検証 → 変更の順に行い、
//! 永続化は [`RegistryStore`] が担います。

pub mod allocator;
pub mod error;
pub mod model;
pub mod preview;
pub mod project;
pub mod reconcile;
pub mod store;

pub use allocator::*;
pub use error::*;
pub use model::*;
pub use preview::*;
pub use project::*;
pub use reconcile::*;
pub use store::*;

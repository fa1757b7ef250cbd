mod commands;
mod connect;
mod progress;

use clap::{Parser, Subcommand};
use codeb_registry::{DEFAULT_PROMOTE_TARGET, DeployStatus, ProjectType};

#[derive(Parser)]
#[command(name = "we")]
#[command(about = "CodeB サーバーのプロジェクト・ポート・Preview 環境を管理", long_about = None)]
struct Cli {
    /// 結果を JSON で出力
    #[arg(long, global = true)]
    json: bool,

    /// 確認なしで実行（remove など）
    #[arg(long, global = true)]
    force: bool,

    /// デバッグログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// サーバーレジストリを操作
    #[command(subcommand)]
    Registry(RegistryCommands),
    /// バージョン情報を表示
    Version,
}

/// CodeB Registry のサブコマンド
#[derive(Subcommand)]
enum RegistryCommands {
    /// 全プロジェクト・環境の一覧を表示
    List,
    /// プロジェクトの詳細を表示
    Show {
        /// プロジェクト名
        project: String,
    },
    /// プロジェクトを登録（staging / production のポート・ドメインを割り当て）
    Add {
        /// プロジェクト名
        project: String,
        /// production ポートを明示指定（staging は +100）
        #[arg(short, long)]
        port: Option<u16>,
        /// プロジェクト種別 (nodejs, nextjs, remix, static)
        #[arg(short = 't', long = "type")]
        project_type: Option<ProjectType>,
        /// Git リポジトリ
        #[arg(short, long)]
        git: Option<String>,
        /// ベースドメイン（省略時は設定値）
        #[arg(short, long)]
        domain: Option<String>,
    },
    /// プロジェクトを更新
    Update {
        /// プロジェクト名
        project: String,
        /// Git リポジトリ
        #[arg(short, long)]
        git: Option<String>,
        /// プロジェクト種別
        #[arg(short = 't', long = "type")]
        project_type: Option<ProjectType>,
        /// 状態 (pending, running, stopped)。--env と併用
        #[arg(short, long, requires = "env")]
        status: Option<DeployStatus>,
        /// ドメイン。--env と併用
        #[arg(short, long, requires = "env")]
        domain: Option<String>,
        /// 対象環境 (staging, production)
        #[arg(short, long)]
        env: Option<String>,
    },
    /// プロジェクトを削除（関連する Preview も削除）
    Remove {
        /// プロジェクト名
        project: String,
    },
    /// ポートの使用状況を表示
    Ports,
    /// 実コンテナの状態を反映し、期限切れ Preview を削除
    Sync,
    /// Preview 環境を操作
    #[command(subcommand)]
    Preview(PreviewCommands),
    /// Preview を staging / production へ昇格するためのデプロイ計画を表示
    Promote {
        /// Preview キー (<project>-<build>)
        preview_key: String,
        /// 昇格先の環境
        #[arg(long, default_value = DEFAULT_PROMOTE_TARGET)]
        to: String,
    },
}

/// Preview のサブコマンド
#[derive(Subcommand)]
enum PreviewCommands {
    /// Preview 環境を作成
    Create {
        /// プロジェクト名
        #[arg(short, long)]
        project: String,
        /// ビルド ID
        #[arg(short, long)]
        build: Option<String>,
        /// PR 番号（--build 未指定時のビルド ID）
        #[arg(long)]
        pr: Option<String>,
        /// ブランチ名
        #[arg(long)]
        branch: Option<String>,
        /// 有効期間（時間）。省略時は設定値
        #[arg(long)]
        ttl: Option<u32>,
    },
    /// Preview 環境の一覧を表示
    List,
    /// Preview 環境を削除
    Remove {
        /// Preview キー
        #[arg(short, long, conflicts_with_all = ["project", "build"], required_unless_present = "project")]
        key: Option<String>,
        /// プロジェクト名（--build と併用）
        #[arg(short, long, requires = "build")]
        project: Option<String>,
        /// ビルド ID（--project と併用）
        #[arg(short, long, requires = "project")]
        build: Option<String>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stdout（JSON 出力）を汚さないよう stderr に出す
    init_tracing(cli.verbose);

    // Versionコマンドは設定不要
    let registry_cmd = match cli.command {
        Commands::Version => {
            println!("we {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Registry(cmd) => cmd,
    };

    let ctx = connect::Context::from_env(cli.json, cli.force)?;

    match registry_cmd {
        RegistryCommands::List => commands::registry::handle_list(&ctx).await,
        RegistryCommands::Show { project } => commands::registry::handle_show(&ctx, &project).await,
        RegistryCommands::Add {
            project,
            port,
            project_type,
            git,
            domain,
        } => {
            commands::registry::handle_add(&ctx, &project, port, project_type, git, domain).await
        }
        RegistryCommands::Update {
            project,
            git,
            project_type,
            status,
            domain,
            env,
        } => {
            let patch = codeb_registry::ProjectPatch {
                git_repo: git,
                project_type,
                env,
                status,
                domain,
            };
            commands::registry::handle_update(&ctx, &project, patch).await
        }
        RegistryCommands::Remove { project } => {
            commands::registry::handle_remove(&ctx, &project).await
        }
        RegistryCommands::Ports => commands::registry::handle_ports(&ctx).await,
        RegistryCommands::Sync => commands::registry::handle_sync(&ctx).await,
        RegistryCommands::Preview(preview_cmd) => match preview_cmd {
            PreviewCommands::Create {
                project,
                build,
                pr,
                branch,
                ttl,
            } => {
                let request = codeb_registry::PreviewRequest {
                    build,
                    pr,
                    branch,
                    ttl_hours: Some(ttl.unwrap_or(ctx.config.registry.preview_ttl_hours)),
                    fallback_domain: ctx.config.registry.base_domain.clone(),
                };
                commands::preview::handle_create(&ctx, &project, request).await
            }
            PreviewCommands::List => commands::preview::handle_list(&ctx).await,
            PreviewCommands::Remove {
                key,
                project,
                build,
            } => {
                let key = match (key, project, build) {
                    (Some(key), _, _) => key,
                    (None, Some(project), Some(build)) => {
                        codeb_registry::preview_key(&project, &build)
                    }
                    _ => anyhow::bail!("--key または --project と --build を指定してください"),
                };
                commands::preview::handle_remove(&ctx, &key).await
            }
        },
        RegistryCommands::Promote { preview_key, to } => {
            commands::preview::handle_promote(&ctx, &preview_key, &to).await
        }
    }
}

//! we registry preview / promote コマンドハンドラ

use super::{print_json, print_preview_rows};
use crate::connect::Context;
use crate::progress::Spinner;
use chrono::Utc;
use codeb_registry::PreviewRequest;
use colored::Colorize;

/// we registry preview create
pub async fn handle_create(
    ctx: &Context,
    project: &str,
    request: PreviewRequest,
) -> anyhow::Result<()> {
    let spinner = Spinner::new(&format!("{} の Preview を作成中...", project), !ctx.json);
    let now = Utc::now();
    let (key, preview) = ctx
        .store
        .mutate(|registry| {
            let (key, preview) = registry.create_preview(project, request, now)?;
            Ok((key, preview.clone()))
        })
        .await?;
    spinner.finish();

    if ctx.json {
        return print_json(&serde_json::json!({ "key": key, "preview": preview }));
    }

    println!("{} Preview {} を作成しました", "✓".green().bold(), key.yellow().bold());
    println!("  {:<10} {}", "url:".dimmed(), preview.url);
    println!("  {:<10} {}", "port:".dimmed(), preview.port);
    println!("  {:<10} {}", "container:".dimmed(), preview.container);
    if let Some(expires_at) = preview.expires_at {
        println!("  {:<10} {}", "expires:".dimmed(), expires_at.to_rfc3339());
    }
    Ok(())
}

/// we registry preview list
pub async fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let spinner = Spinner::new("レジストリを読み込み中...", !ctx.json);
    let registry = ctx.store.load().await?;
    spinner.finish();

    let entries = registry.list_previews(Utc::now());
    if ctx.json {
        return print_json(&entries);
    }

    println!("{}", "Previews:".bold());
    if entries.is_empty() {
        println!("  {}", "(なし)".dimmed());
        return Ok(());
    }
    print_preview_rows(&entries);
    Ok(())
}

/// we registry preview remove
pub async fn handle_remove(ctx: &Context, key: &str) -> anyhow::Result<()> {
    let spinner = Spinner::new(&format!("Preview {} を削除中...", key), !ctx.json);
    let removed = ctx
        .store
        .mutate(|registry| registry.remove_preview(key))
        .await?;
    spinner.finish();

    if ctx.json {
        return print_json(&serde_json::json!({ "key": key, "preview": removed }));
    }

    println!("{} Preview {} を削除しました", "✓".green().bold(), key.yellow());
    Ok(())
}

/// we registry promote <previewKey> — デプロイ計画を表示するだけで、実行はしない
pub async fn handle_promote(ctx: &Context, key: &str, target_env: &str) -> anyhow::Result<()> {
    let spinner = Spinner::new("レジストリを読み込み中...", !ctx.json);
    let registry = ctx.store.load().await?;
    spinner.finish();

    let plan = registry.promote_preview(key, target_env)?;
    if ctx.json {
        return print_json(&serde_json::json!({
            "plan": plan,
            "deploy_command": plan.deploy_command(),
        }));
    }

    println!(
        "{}  {} {} {}",
        "Promote:".bold(),
        plan.preview_key.yellow(),
        "→".dimmed(),
        plan.environment.cyan()
    );
    println!("  {:<10} {}", "project:".dimmed(), plan.project);
    println!("  {:<10} {}", "build:".dimmed(), plan.build);
    println!("  {:<10} {}", "domain:".dimmed(), plan.domain);
    println!("  {:<10} {}", "port:".dimmed(), plan.port);
    println!();
    println!("  {}", "→ 以下のコマンドでデプロイしてください".yellow());
    println!("  $ {}", plan.deploy_command());
    Ok(())
}

//! we registry コマンドハンドラ

use super::{print_json, print_preview_rows, status_label};
use crate::connect::Context;
use crate::progress::Spinner;
use chrono::Utc;
use codeb_registry::{AddProjectOptions, ProjectPatch, ProjectType, fetch_live_containers};
use colored::Colorize;

/// we registry list — 全プロジェクト × 環境の一覧
pub async fn handle_list(ctx: &Context) -> anyhow::Result<()> {
    let spinner = Spinner::new("レジストリを読み込み中...", !ctx.json);
    let registry = ctx.store.load().await?;
    spinner.finish();

    let rows = registry.list_projects();
    if ctx.json {
        return print_json(&rows);
    }

    println!("{}  {}", "CodeB Registry:".bold(), ctx.store.target().cyan().bold());
    println!();

    if rows.is_empty() {
        println!("  {}", "(プロジェクトなし)".dimmed());
        return Ok(());
    }

    println!(
        "  {:<20} {:<12} {:<6} {:<36} {}",
        "Project".bold(),
        "Env".bold(),
        "Port".bold(),
        "Domain".bold(),
        "Status".bold()
    );
    println!("  {}", "─".repeat(86).dimmed());
    for row in rows {
        println!(
            "  {:<20} {:<12} {:<6} {:<36} {}",
            row.name.green(),
            row.env,
            row.config.port,
            row.config.domain,
            status_label(row.config.status)
        );
    }

    let previews = registry.list_previews(Utc::now());
    if !previews.is_empty() {
        println!();
        println!("{}", "Previews:".bold());
        print_preview_rows(&previews);
    }

    println!();
    println!(
        "  {} {} projects, {} previews",
        "合計:".dimmed(),
        registry.projects.len(),
        registry.previews.len()
    );
    Ok(())
}

/// we registry show <project>
pub async fn handle_show(ctx: &Context, name: &str) -> anyhow::Result<()> {
    let spinner = Spinner::new("レジストリを読み込み中...", !ctx.json);
    let registry = ctx.store.load().await?;
    spinner.finish();

    let detail = registry.show_project(name)?;
    if ctx.json {
        return print_json(&detail);
    }

    let project = detail.project;
    println!("{}  {}", "Project:".bold(), name.green().bold());
    println!("  {:<12} {}", "type:".dimmed(), project.project_type);
    println!(
        "  {:<12} {}",
        "git:".dimmed(),
        project.git_repo.as_deref().unwrap_or("-")
    );
    println!("  {:<12} {}", "created:".dimmed(), project.created_at.to_rfc3339());
    if let Some(updated_at) = project.updated_at {
        println!("  {:<12} {}", "updated:".dimmed(), updated_at.to_rfc3339());
    }
    println!();

    println!("{}", "Environments:".bold());
    for (env, config) in &project.environments {
        println!(
            "  {:<12} {:<6} {:<36} {:<28} {}",
            env.cyan(),
            config.port,
            config.domain,
            config.container_name(name, env).dimmed(),
            status_label(config.status)
        );
    }
    println!();

    println!("{}", "Previews:".bold());
    if detail.previews.is_empty() {
        println!("  {}", "(なし)".dimmed());
    }
    for (key, preview) in &detail.previews {
        println!(
            "  {:<24} {:<6} {:<44} {}",
            key.yellow(),
            preview.port,
            preview.url,
            status_label(preview.status)
        );
    }
    Ok(())
}

/// we registry add <project>
pub async fn handle_add(
    ctx: &Context,
    name: &str,
    port: Option<u16>,
    project_type: Option<ProjectType>,
    git_repo: Option<String>,
    domain: Option<String>,
) -> anyhow::Result<()> {
    let options = AddProjectOptions {
        port,
        project_type,
        git_repo,
        base_domain: domain.unwrap_or_else(|| ctx.config.registry.base_domain.clone()),
    };

    let spinner = Spinner::new(&format!("{} を登録中...", name), !ctx.json);
    let project = ctx
        .store
        .mutate(|registry| registry.add_project(name, options).cloned())
        .await?;
    spinner.finish();

    if ctx.json {
        return print_json(&project);
    }

    println!("{} {} を登録しました", "✓".green().bold(), name.green().bold());
    for (env, config) in &project.environments {
        println!(
            "  {:<12} port {:<6} {}",
            env.cyan(),
            config.port,
            config.domain
        );
    }
    Ok(())
}

/// we registry update <project>
pub async fn handle_update(ctx: &Context, name: &str, patch: ProjectPatch) -> anyhow::Result<()> {
    let spinner = Spinner::new(&format!("{} を更新中...", name), !ctx.json);
    let update = ctx
        .store
        .mutate(|registry| registry.update_project(name, patch))
        .await?;
    spinner.finish();

    if ctx.json {
        return print_json(&update);
    }

    if let Some(env) = &update.ignored_env {
        println!(
            "  {} 環境 '{}' は存在しないため status / domain は変更していません",
            "⚠".yellow(),
            env
        );
    }
    if update.changed.is_empty() {
        println!("{} {}: 変更なし", "✓".green().bold(), name.green());
    } else {
        println!(
            "{} {} を更新しました: {}",
            "✓".green().bold(),
            name.green().bold(),
            update.changed.join(", ")
        );
    }
    Ok(())
}

/// we registry remove <project> — --force がなければ削除計画の表示のみ
pub async fn handle_remove(ctx: &Context, name: &str) -> anyhow::Result<()> {
    if !ctx.force {
        let registry = ctx.store.load().await?;
        let project = registry.project(name)?;
        let previews: Vec<&String> = registry.previews_of(name).map(|(key, _)| key).collect();

        if ctx.json {
            return print_json(&serde_json::json!({
                "project": name,
                "environments": project.environments.keys().collect::<Vec<_>>(),
                "previews": previews,
                "removed": false,
            }));
        }

        println!("{}  {}", "Remove:".bold(), name.red().bold());
        for (env, config) in &project.environments {
            println!("  {} {:<12} {}", "-".red(), env, config.domain.dimmed());
        }
        for key in &previews {
            println!("  {} preview {}", "-".red(), key);
        }
        println!();
        println!("  {}", "→ 実行するには --force を付けてください".yellow());
        return Ok(());
    }

    let spinner = Spinner::new(&format!("{} を削除中...", name), !ctx.json);
    let removed = ctx
        .store
        .mutate(|registry| registry.remove_project(name))
        .await?;
    spinner.finish();

    if ctx.json {
        return print_json(&removed);
    }

    println!("{} {} を削除しました", "✓".green().bold(), name.green().bold());
    if !removed.previews.is_empty() {
        println!(
            "  {} {}",
            "削除した Preview:".dimmed(),
            removed.previews.join(", ")
        );
    }
    Ok(())
}

/// we registry ports — ポート使用状況
pub async fn handle_ports(ctx: &Context) -> anyhow::Result<()> {
    let spinner = Spinner::new("レジストリを読み込み中...", !ctx.json);
    let registry = ctx.store.load().await?;
    spinner.finish();

    let report = registry.port_report();
    if ctx.json {
        return print_json(&report);
    }

    println!("{}", "Port classes:".bold());
    for class in &report.classes {
        println!(
            "  {:<12} {:<12} next: {}",
            class.class.cyan(),
            class.range.as_deref().unwrap_or("-"),
            class.next_available
        );
    }
    println!();

    println!("{}", "Used ports:".bold());
    for usage in &report.used {
        let port = if report.conflicts.contains(&usage.port) {
            usage.port.to_string().red().bold()
        } else {
            usage.port.to_string().normal()
        };
        println!("  {:<6} {}", port, usage.slot);
    }

    if !report.conflicts.is_empty() {
        println!();
        println!(
            "  {} 重複しているポート: {}",
            "⚠".yellow(),
            report
                .conflicts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    Ok(())
}

/// we registry sync — 実コンテナの状態を反映
pub async fn handle_sync(ctx: &Context) -> anyhow::Result<()> {
    let spinner = Spinner::new("レジストリを読み込み中...", !ctx.json);
    let mut registry = ctx.store.load().await?;

    spinner.set_message("コンテナの状態を取得中...");
    let live = fetch_live_containers(
        ctx.executor.as_ref(),
        &ctx.config.server.container_runtime,
        ctx.command_timeout(),
    )
    .await?;

    let report = registry.sync_with_live_state(&live, Utc::now());
    if report.change_count() > 0 {
        spinner.set_message("レジストリを保存中...");
        ctx.store.save(&mut registry).await?;
    }
    spinner.finish();

    if ctx.json {
        return print_json(&report);
    }

    for transition in &report.transitions {
        println!(
            "  {:<28} {} → {}",
            transition.target,
            status_label(transition.from),
            status_label(transition.to)
        );
    }
    for key in &report.expired_previews {
        println!("  {} 期限切れ Preview を削除: {}", "-".red(), key);
    }
    println!(
        "{} 同期完了 ({} 件の変更)",
        "✓".green().bold(),
        report.change_count()
    );
    Ok(())
}
